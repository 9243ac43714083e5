mod azcli;

use std::path::Path;
use std::time::Duration;

use crate::remote::RemoteFuture;

pub use azcli::{AzStorageClient, StorageAccount};

/// Remote object storage used to hand resource files over to the pool nodes.
pub trait BlobStorage {
    /// Creates the container if it does not exist yet.
    fn create_container(&self, container: &str) -> RemoteFuture<()>;
    /// Generates a read/list shared access signature for the whole container.
    fn container_sas(&self, container: &str, valid_for: Duration) -> RemoteFuture<String>;
    /// Uploads a local file and returns the URL of the blob (without a signature).
    fn upload_blob(&self, container: &str, blob_name: &str, source: &Path)
    -> RemoteFuture<String>;
}
