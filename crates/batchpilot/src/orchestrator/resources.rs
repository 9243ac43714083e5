//! Upload of local resources into a storage container readable by the pool nodes.
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::error::BatchError;
use crate::common::utils::str::pluralize;
use crate::project::ResourceConfig;
use crate::remote::model::ResourceFile;
use crate::storage::BlobStorage;

/// Maximum length of a storage container name.
const MAX_CONTAINER_NAME_LENGTH: usize = 63;

/// Derives a valid container name (lowercase alphanumerics and single dashes) from a job id.
pub fn container_name(job_id: &str) -> String {
    let mut name = String::with_capacity(job_id.len());
    for c in job_id.chars() {
        let c = if c.is_ascii_alphanumeric() {
            c.to_ascii_lowercase()
        } else {
            '-'
        };
        if c == '-' && (name.is_empty() || name.ends_with('-')) {
            continue;
        }
        name.push(c);
    }
    name.truncate(MAX_CONTAINER_NAME_LENGTH);
    name.trim_end_matches('-').to_string()
}

/// A single file to upload, together with its path on the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub source: PathBuf,
    pub target: String,
}

fn join_target(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{name}", prefix.trim_end_matches('/'))
    }
}

fn walk_directory(directory: &Path, target: &str, files: &mut Vec<StagedFile>) -> crate::Result<()> {
    let mut entries = std::fs::read_dir(directory)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let target = join_target(target, &name);
        if path.is_dir() {
            walk_directory(&path, &target, files)?;
        } else {
            files.push(StagedFile {
                source: path,
                target,
            });
        }
    }
    Ok(())
}

/// Expands the configured resources into individual files. Directories are walked recursively.
pub fn collect_files(resources: &[ResourceConfig]) -> crate::Result<Vec<StagedFile>> {
    let mut files = Vec::new();
    for resource in resources {
        let target = match &resource.target {
            Some(target) => target.clone(),
            None => resource
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    BatchError::ConfigurationError(format!(
                        "Resource {} needs an explicit target",
                        resource.path.display()
                    ))
                })?,
        };
        if resource.path.is_dir() {
            walk_directory(&resource.path, &target, &mut files)?;
        } else if resource.path.is_file() {
            files.push(StagedFile {
                source: resource.path.clone(),
                target,
            });
        } else {
            return Err(BatchError::ConfigurationError(format!(
                "Resource {} does not exist",
                resource.path.display()
            )));
        }
    }
    Ok(files)
}

/// Uploads the resources and returns references to them that the nodes can download.
pub async fn stage_resources(
    storage: &dyn BlobStorage,
    container: &str,
    resources: &[ResourceConfig],
    sas_validity: Duration,
) -> crate::Result<Vec<ResourceFile>> {
    let files = collect_files(resources)?;
    if files.is_empty() {
        return Ok(vec![]);
    }

    log::info!("Creating storage container {container}");
    storage.create_container(container).await?;
    let sas = storage.container_sas(container, sas_validity).await?;
    let sas = sas.trim_start_matches('?');

    let mut resource_files = Vec::with_capacity(files.len());
    for file in &files {
        log::debug!("Uploading {} as {}", file.source.display(), file.target);
        let url = storage
            .upload_blob(container, &file.target, &file.source)
            .await?;
        resource_files.push(ResourceFile {
            http_url: format!("{url}?{sas}"),
            file_path: file.target.clone(),
        });
    }
    log::info!(
        "Uploaded {} resource {} into container {container}",
        files.len(),
        pluralize("file", files.len())
    );
    Ok(resource_files)
}
