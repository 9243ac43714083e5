//! [`ComputeClient`] driving the `az batch` command line.
use std::path::Path;

use serde_json::json;

use crate::common::utils::time::format_iso8601_minutes;
use crate::remote::common::{parse_json_output, run_command, write_json_payload};
use crate::remote::model::{
    ComputeNode, JobAddParameter, JobConstraints, JobInfo, ListOptions, PoolInfo,
    PreparationTaskStatus, ResizePoolRequest, TaskAddParameter, TaskInfo,
};
use crate::remote::{ComputeClient, RemoteFuture};

const AZ_PROGRAM: &str = "az";

#[derive(Debug, Clone)]
pub struct BatchAccount {
    pub name: String,
    pub key: String,
    pub endpoint: String,
}

pub struct AzBatchClient {
    account: BatchAccount,
}

impl AzBatchClient {
    pub fn new(account: BatchAccount) -> Self {
        Self { account }
    }

    /// Builds `az batch <command> <args> <account options>`.
    fn command(&self, command: &[&str], args: Vec<String>) -> Vec<String> {
        let mut arguments: Vec<String> = vec![AZ_PROGRAM.to_string(), "batch".to_string()];
        arguments.extend(command.iter().map(|s| s.to_string()));
        arguments.extend(args);
        arguments.extend([
            "--account-name".to_string(),
            self.account.name.clone(),
            "--account-key".to_string(),
            self.account.key.clone(),
            "--account-endpoint".to_string(),
            self.account.endpoint.clone(),
            "--output".to_string(),
            "json".to_string(),
        ]);
        arguments
    }
}

fn list_arguments(mut args: Vec<String>, options: &ListOptions) -> Vec<String> {
    if let Some(select) = &options.select {
        args.extend(["--select".to_string(), select.clone()]);
    }
    if let Some(filter) = &options.filter {
        args.extend(["--filter".to_string(), filter.clone()]);
    }
    args
}

fn path_argument(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl ComputeClient for AzBatchClient {
    fn create_job(&self, job: JobAddParameter) -> RemoteFuture<()> {
        let arguments = self.command(&["job", "create"], vec![]);
        Box::pin(async move {
            let payload = write_json_payload(&job)?;
            let mut arguments = arguments;
            arguments.extend(["--json-file".to_string(), path_argument(payload.path())]);
            run_command(arguments).await?;
            Ok(())
        })
    }

    fn get_job(&self, job_id: &str) -> RemoteFuture<JobInfo> {
        let arguments = self.command(&["job", "show"], vec!["--job-id".into(), job_id.into()]);
        Box::pin(async move {
            let output = run_command(arguments).await?;
            parse_json_output(&output)
        })
    }

    fn patch_job_constraints(
        &self,
        job_id: &str,
        constraints: JobConstraints,
    ) -> RemoteFuture<()> {
        let arguments = self.command(&["job", "set"], vec!["--job-id".into(), job_id.into()]);
        Box::pin(async move {
            let payload = write_json_payload(&json!({ "constraints": constraints }))?;
            let mut arguments = arguments;
            arguments.extend(["--json-file".to_string(), path_argument(payload.path())]);
            run_command(arguments).await?;
            Ok(())
        })
    }

    fn delete_job(&self, job_id: &str) -> RemoteFuture<()> {
        let arguments = self.command(
            &["job", "delete"],
            vec!["--job-id".into(), job_id.into(), "--yes".into()],
        );
        Box::pin(async move {
            run_command(arguments).await?;
            Ok(())
        })
    }

    fn add_tasks(&self, job_id: &str, tasks: Vec<TaskAddParameter>) -> RemoteFuture<()> {
        let arguments = self.command(&["task", "create"], vec!["--job-id".into(), job_id.into()]);
        Box::pin(async move {
            let payload = write_json_payload(&tasks)?;
            let mut arguments = arguments;
            arguments.extend(["--json-file".to_string(), path_argument(payload.path())]);
            run_command(arguments).await?;
            Ok(())
        })
    }

    fn get_pool(&self, pool_id: &str) -> RemoteFuture<PoolInfo> {
        let arguments = self.command(&["pool", "show"], vec!["--pool-id".into(), pool_id.into()]);
        Box::pin(async move {
            let output = run_command(arguments).await?;
            parse_json_output(&output)
        })
    }

    fn pool_exists(&self, pool_id: &str) -> RemoteFuture<bool> {
        let arguments = self.command(
            &["pool", "show"],
            vec![
                "--pool-id".into(),
                pool_id.into(),
                "--select".into(),
                "id".into(),
            ],
        );
        Box::pin(async move {
            match run_command(arguments).await {
                Ok(_) => Ok(true),
                Err(error) if error.is_not_found() => Ok(false),
                Err(error) => Err(error),
            }
        })
    }

    fn resize_pool(&self, pool_id: &str, request: ResizePoolRequest) -> RemoteFuture<()> {
        let mut args: Vec<String> = vec![
            "--pool-id".into(),
            pool_id.into(),
            "--target-dedicated-nodes".into(),
            request.target_dedicated_nodes.to_string(),
        ];
        if let Some(timeout) = request.resize_timeout {
            args.extend(["--resize-timeout".into(), format_iso8601_minutes(timeout)]);
        }
        if let Some(option) = request.deallocation_option {
            args.extend([
                "--node-deallocation-option".into(),
                option.as_str().to_string(),
            ]);
        }
        let arguments = self.command(&["pool", "resize"], args);
        Box::pin(async move {
            run_command(arguments).await?;
            Ok(())
        })
    }

    fn list_compute_nodes(
        &self,
        pool_id: &str,
        options: ListOptions,
    ) -> RemoteFuture<Vec<ComputeNode>> {
        let arguments = self.command(
            &["node", "list"],
            list_arguments(vec!["--pool-id".into(), pool_id.into()], &options),
        );
        Box::pin(async move {
            let output = run_command(arguments).await?;
            parse_json_output(&output)
        })
    }

    fn get_compute_node(&self, pool_id: &str, node_id: &str) -> RemoteFuture<ComputeNode> {
        let arguments = self.command(
            &["node", "show"],
            vec![
                "--pool-id".into(),
                pool_id.into(),
                "--node-id".into(),
                node_id.into(),
            ],
        );
        Box::pin(async move {
            let output = run_command(arguments).await?;
            parse_json_output(&output)
        })
    }

    fn list_tasks(&self, job_id: &str, options: ListOptions) -> RemoteFuture<Vec<TaskInfo>> {
        let arguments = self.command(
            &["task", "list"],
            list_arguments(vec!["--job-id".into(), job_id.into()], &options),
        );
        Box::pin(async move {
            let output = run_command(arguments).await?;
            parse_json_output(&output)
        })
    }

    fn get_task(&self, job_id: &str, task_id: &str) -> RemoteFuture<TaskInfo> {
        let arguments = self.command(
            &["task", "show"],
            vec![
                "--job-id".into(),
                job_id.into(),
                "--task-id".into(),
                task_id.into(),
            ],
        );
        Box::pin(async move {
            let output = run_command(arguments).await?;
            parse_json_output(&output)
        })
    }

    fn list_preparation_status(&self, job_id: &str) -> RemoteFuture<Vec<PreparationTaskStatus>> {
        let arguments = self.command(
            &["job", "prep-release-status", "list"],
            vec!["--job-id".into(), job_id.into()],
        );
        Box::pin(async move {
            let output = run_command(arguments).await?;
            parse_json_output(&output)
        })
    }

    fn get_file_from_task(
        &self,
        job_id: &str,
        task_id: &str,
        file_path: &str,
        destination: &Path,
    ) -> RemoteFuture<()> {
        let arguments = self.command(
            &["task", "file", "download"],
            vec![
                "--job-id".into(),
                job_id.into(),
                "--task-id".into(),
                task_id.into(),
                "--file-path".into(),
                file_path.into(),
                "--destination".into(),
                path_argument(destination),
            ],
        );
        Box::pin(async move {
            run_command(arguments).await?;
            Ok(())
        })
    }

    fn get_file_from_compute_node(
        &self,
        pool_id: &str,
        node_id: &str,
        file_path: &str,
        destination: &Path,
    ) -> RemoteFuture<()> {
        let arguments = self.command(
            &["node", "file", "download"],
            vec![
                "--pool-id".into(),
                pool_id.into(),
                "--node-id".into(),
                node_id.into(),
                "--file-path".into(),
                file_path.into(),
                "--destination".into(),
                path_argument(destination),
            ],
        );
        Box::pin(async move {
            run_command(arguments).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::remote::azcli::{AzBatchClient, BatchAccount, list_arguments};
    use crate::remote::model::ListOptions;

    fn client() -> AzBatchClient {
        AzBatchClient::new(BatchAccount {
            name: "account".to_string(),
            key: "key".to_string(),
            endpoint: "https://account.westeurope.batch.azure.com".to_string(),
        })
    }

    #[test]
    fn command_contains_account() {
        let arguments = client().command(&["pool", "show"], vec!["--pool-id".into(), "p1".into()]);
        assert_eq!(
            arguments,
            vec![
                "az",
                "batch",
                "pool",
                "show",
                "--pool-id",
                "p1",
                "--account-name",
                "account",
                "--account-key",
                "key",
                "--account-endpoint",
                "https://account.westeurope.batch.azure.com",
                "--output",
                "json"
            ]
        );
    }

    #[test]
    fn list_projection_and_filter() {
        let options = ListOptions::default()
            .select("state")
            .filter("state eq 'idle' or state eq 'running'");
        assert_eq!(
            list_arguments(vec![], &options),
            vec![
                "--select",
                "state",
                "--filter",
                "state eq 'idle' or state eq 'running'"
            ]
        );
        assert!(list_arguments(vec![], &ListOptions::default()).is_empty());
    }
}
