//! Download of task and job preparation logs into the local output directory.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::common::utils::fs::read_nonempty;
use crate::common::utils::str::pluralize;
use crate::orchestrator::config::{JOB_PREPARATION_TAG, STDERR_FILE_NAME, STDOUT_FILE_NAME};
use crate::orchestrator::state::{RunState, job_preparation_key};
use crate::remote::ComputeClient;
use crate::remote::model::{
    ListOptions, OsFamily, PreparationTaskStatus, TaskFailureInfo, TaskInfo, TaskState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    Running,
    Killed,
    Failed(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskLogAction {
    Skip,
    /// The task never started; only its scheduling error is logged.
    SchedulingFailed,
    Fetch(FetchReason),
}

/// Decides whether the logs of a task are worth downloading.
pub fn classify_task(task: &TaskInfo, os_family: OsFamily) -> TaskLogAction {
    let Some(info) = task.execution_info.as_ref() else {
        return TaskLogAction::Skip;
    };
    match task.state {
        TaskState::Running => TaskLogAction::Fetch(FetchReason::Running),
        TaskState::Completed => {
            if info.scheduling_error().is_some() {
                return TaskLogAction::SchedulingFailed;
            }
            match info.exit_code {
                Some(0) | None => TaskLogAction::Skip,
                Some(code) if code == os_family.kill_exit_code() => {
                    TaskLogAction::Fetch(FetchReason::Killed)
                }
                Some(code) => TaskLogAction::Fetch(FetchReason::Failed(code)),
            }
        }
        TaskState::Active | TaskState::Preparing | TaskState::Other => TaskLogAction::Skip,
    }
}

fn log_scheduling_error(task: &TaskInfo, error: &TaskFailureInfo) {
    log::error!(
        "Task {} ({}) could not be scheduled: category {}, code {}, message: {}",
        task.id,
        task.display_name(),
        error.category,
        error.code,
        error.message
    );
}

/// Logs the content of a non-empty stderr file.
fn echo_stderr(path: &Path) {
    if let Some(content) = read_nonempty(path) {
        log::info!("Stderr output of {}:", path.display());
        log::info!("{}", content.trim_end());
        log::info!("End of stderr output of {}", path.display());
    }
}

/// Failed downloads are only reported, except for cancellation which aborts the retrieval.
fn handle_fetch_result(result: crate::Result<()>, what: &str) -> crate::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(error) if error.is_cancellation() => Err(error),
        Err(error) => {
            log::warn!("Failed to retrieve {what}: {error}");
            Ok(false)
        }
    }
}

pub fn task_log_path(output_dir: &Path, task_id: &str, file_name: &str) -> PathBuf {
    output_dir.join(format!("{task_id}_{file_name}"))
}

/// Downloads stdout and stderr of a task according to [`classify_task`].
pub async fn retrieve_task_logs(
    client: &dyn ComputeClient,
    state: &RunState,
    task: &TaskInfo,
) -> crate::Result<()> {
    let reason = match classify_task(task, state.os_family) {
        TaskLogAction::Skip => return Ok(()),
        TaskLogAction::SchedulingFailed => {
            if let Some(error) = task
                .execution_info
                .as_ref()
                .and_then(|info| info.scheduling_error())
            {
                log_scheduling_error(task, error);
            }
            return Ok(());
        }
        TaskLogAction::Fetch(reason) => reason,
    };
    match reason {
        FetchReason::Running => log::info!("Task {} is still running", task.id),
        FetchReason::Killed => log::error!(
            "Task {} ({}) was killed because it exceeded its time limit",
            task.id,
            task.display_name()
        ),
        FetchReason::Failed(code) => log::error!(
            "Task {} ({}) failed with exit code {code}",
            task.id,
            task.display_name()
        ),
    }

    for file_name in [STDOUT_FILE_NAME, STDERR_FILE_NAME] {
        let destination = task_log_path(&state.output_dir, &task.id, file_name);
        let result = client
            .get_file_from_task(&state.job_id, &task.id, file_name, &destination)
            .await;
        let fetched = handle_fetch_result(result, &format!("{file_name} of task {}", task.id))?;
        if fetched && file_name == STDERR_FILE_NAME {
            echo_stderr(&destination);
        }
    }
    log::info!(
        "Logs of task {} were saved to {}",
        task.id,
        state.output_dir.display()
    );
    Ok(())
}

/// Re-reads a task whose listing does not carry execution details and retrieves its logs.
pub async fn retrieve_listed_task(
    client: &dyn ComputeClient,
    state: &RunState,
    task: &TaskInfo,
) -> crate::Result<()> {
    if task.execution_info.is_some() {
        return retrieve_task_logs(client, state, task).await;
    }
    let task = client.get_task(&state.job_id, &task.id).await?;
    retrieve_task_logs(client, state, &task).await
}

pub fn preparation_log_path(
    output_dir: &Path,
    pool_id: &str,
    node_id: &str,
    file_name: &str,
) -> PathBuf {
    output_dir.join(format!(
        "{pool_id}_{node_id}_{JOB_PREPARATION_TAG}_{file_name}"
    ))
}

/// Downloads stdout and stderr of the job preparation task of a node.
///
/// The node is looked up first so that failed downloads can report its state.
pub async fn retrieve_preparation_logs(
    client: &dyn ComputeClient,
    state: &RunState,
    pool_id: &str,
    node_id: &str,
) -> crate::Result<()> {
    let node_state = match client.get_compute_node(pool_id, node_id).await {
        Ok(node) => format!("{:?}", node.state),
        Err(error) if error.is_cancellation() => return Err(error),
        Err(error) => {
            log::warn!("Cannot read state of node {node_id} in pool {pool_id}: {error}");
            "unknown".to_string()
        }
    };
    for file_name in [STDOUT_FILE_NAME, STDERR_FILE_NAME] {
        let remote_path = format!(
            "workitems/{}/job-1/{JOB_PREPARATION_TAG}/{file_name}",
            state.job_id
        );
        let destination = preparation_log_path(&state.output_dir, pool_id, node_id, file_name);
        let result = client
            .get_file_from_compute_node(pool_id, node_id, &remote_path, &destination)
            .await;
        let fetched = handle_fetch_result(
            result,
            &format!(
                "{remote_path} from node {node_id} (state: {node_state}) in pool {pool_id}"
            ),
        )?;
        if fetched && file_name == STDERR_FILE_NAME {
            echo_stderr(&destination);
        }
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PreparationSweep {
    /// Distinct nodes whose job preparation task has completed (successfully or not).
    pub completed_nodes: usize,
    /// Nodes whose job preparation task was running at the time of the sweep.
    pub running_nodes: usize,
    /// Failed nodes whose logs were retrieved by this sweep.
    pub retrieved_failures: usize,
}

/// Returns true if the node failed and its logs were retrieved now.
async fn retrieve_failed_preparation(
    client: &dyn ComputeClient,
    state: &mut RunState,
    status: &PreparationTaskStatus,
) -> crate::Result<bool> {
    let key = job_preparation_key(&status.pool_id, &status.node_id);
    if state.retrieved.contains(&key) {
        return Ok(false);
    }
    let failed = match status.exit_code().filter(|code| *code != 0) {
        Some(code) => {
            log::error!(
                "Job preparation task failed on node {} with exit code {code}",
                status.node_id
            );
            retrieve_preparation_logs(client, state, &status.pool_id, &status.node_id).await?;
            true
        }
        None => false,
    };
    state.retrieved.mark(key);
    Ok(failed)
}

/// Looks at the job preparation task of every node and retrieves logs of new failures.
pub async fn sweep_job_preparation(
    client: &dyn ComputeClient,
    state: &mut RunState,
) -> crate::Result<PreparationSweep> {
    let statuses = client.list_preparation_status(&state.job_id).await?;
    let mut completed = HashSet::new();
    let mut sweep = PreparationSweep::default();
    for status in &statuses {
        if !status.is_completed() {
            sweep.running_nodes += 1;
            continue;
        }
        completed.insert(status.node_id.as_str());
        if retrieve_failed_preparation(client, state, status).await? {
            sweep.retrieved_failures += 1;
        }
    }
    sweep.completed_nodes = completed.len();
    if sweep.retrieved_failures > 0 {
        log::info!(
            "Retrieved logs of {} failed job preparation {}",
            sweep.retrieved_failures,
            pluralize("task", sweep.retrieved_failures)
        );
    }
    Ok(sweep)
}

/// Final sweep over everything that was not retrieved during monitoring.
pub async fn retrieve_job_outputs(
    client: &dyn ComputeClient,
    state: &mut RunState,
) -> crate::Result<()> {
    if let Err(error) = client.get_job(&state.job_id).await {
        if error.is_not_found() {
            log::info!(
                "Job {} does not exist, there are no outputs to retrieve",
                state.job_id
            );
            return Ok(());
        }
        return Err(error);
    }

    sweep_job_preparation(client, state).await?;

    let tasks = client
        .list_tasks(&state.job_id, ListOptions::default())
        .await?;
    let mut count = 0;
    for task in &tasks {
        if state.retrieved.contains(&task.id) {
            continue;
        }
        retrieve_listed_task(client, state, task).await?;
        if task.state == TaskState::Completed {
            state.retrieved.mark(task.id.clone());
        }
        count += 1;
    }
    if count > 0 {
        log::info!(
            "Checked outputs of {count} remaining {}",
            pluralize("task", count)
        );
    }
    Ok(())
}
