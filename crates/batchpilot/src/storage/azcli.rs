use std::path::Path;
use std::time::Duration;

use chrono::Utc;

use crate::common::error::BatchError;
use crate::remote::RemoteFuture;
use crate::remote::common::{parse_json_output, run_command};
use crate::storage::BlobStorage;

#[derive(Debug, Clone)]
pub struct StorageAccount {
    pub name: String,
    pub key: String,
}

/// [`BlobStorage`] driving the `az storage` command line.
pub struct AzStorageClient {
    account: StorageAccount,
}

impl AzStorageClient {
    pub fn new(account: StorageAccount) -> Self {
        Self { account }
    }

    fn command(&self, command: &[&str], args: Vec<String>) -> Vec<String> {
        let mut arguments: Vec<String> = vec!["az".to_string(), "storage".to_string()];
        arguments.extend(command.iter().map(|s| s.to_string()));
        arguments.extend(args);
        arguments.extend([
            "--account-name".to_string(),
            self.account.name.clone(),
            "--account-key".to_string(),
            self.account.key.clone(),
            "--output".to_string(),
            "json".to_string(),
        ]);
        arguments
    }

    fn blob_url(&self, container: &str, blob_name: &str) -> String {
        format!(
            "https://{}.blob.core.windows.net/{container}/{blob_name}",
            self.account.name
        )
    }
}

impl BlobStorage for AzStorageClient {
    fn create_container(&self, container: &str) -> RemoteFuture<()> {
        let arguments = self.command(&["container", "create"], vec!["--name".into(), container.into()]);
        Box::pin(async move {
            run_command(arguments).await?;
            Ok(())
        })
    }

    fn container_sas(&self, container: &str, valid_for: Duration) -> RemoteFuture<String> {
        let expiry = Utc::now()
            + chrono::Duration::from_std(valid_for)
                .unwrap_or_else(|_| chrono::Duration::days(365));
        let arguments = self.command(
            &["container", "generate-sas"],
            vec![
                "--name".into(),
                container.into(),
                "--permissions".into(),
                "rl".into(),
                "--https-only".into(),
                "--expiry".into(),
                expiry.format("%Y-%m-%dT%H:%MZ").to_string(),
            ],
        );
        Box::pin(async move {
            let output = run_command(arguments).await?;
            let sas: String = parse_json_output(&output)?;
            if sas.is_empty() {
                return Err(BatchError::GenericError(
                    "Storage returned an empty container signature".to_string(),
                ));
            }
            Ok(sas)
        })
    }

    fn upload_blob(&self, container: &str, blob_name: &str, source: &Path) -> RemoteFuture<String> {
        let arguments = self.command(
            &["blob", "upload"],
            vec![
                "--container-name".into(),
                container.into(),
                "--name".into(),
                blob_name.into(),
                "--file".into(),
                source.to_string_lossy().into_owned(),
                "--overwrite".into(),
            ],
        );
        let url = self.blob_url(container, blob_name);
        Box::pin(async move {
            run_command(arguments).await?;
            Ok(url)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{AzStorageClient, StorageAccount};

    #[test]
    fn blob_url() {
        let client = AzStorageClient::new(StorageAccount {
            name: "store".to_string(),
            key: "key".to_string(),
        });
        assert_eq!(
            client.blob_url("job-1", "tools/run.sh"),
            "https://store.blob.core.windows.net/job-1/tools/run.sh"
        );
    }
}
