//! Resources of the remote Batch service, as returned by its JSON API (read side) and
//! as submitted to it (write side).
use std::fmt::{Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::ACCOUNT_CORE_QUOTA_REACHED;
use crate::common::utils::time::format_iso8601_minutes;

pub type JobId = String;
pub type PoolId = String;
pub type NodeId = String;
pub type TaskId = String;

/// Operating system of the pool nodes. Decides the shell used for commands and the exit
/// code reported for killed tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Linux,
}

impl OsFamily {
    /// Exit code reported for a task that was killed after exceeding its wall-clock time.
    pub fn kill_exit_code(&self) -> i32 {
        match self {
            OsFamily::Windows => -1073741510,
            OsFamily::Linux => 137,
        }
    }

    /// Wraps a sequence of commands into a single command line executed by the node's shell.
    pub fn shell_command(&self, commands: &[String]) -> String {
        match self {
            OsFamily::Windows => {
                if commands.is_empty() {
                    "cmd /c exit 0".to_string()
                } else {
                    format!("cmd /c \"{}\"", commands.join(" && "))
                }
            }
            OsFamily::Linux => {
                if commands.is_empty() {
                    "/bin/bash -c true".to_string()
                } else {
                    format!(
                        "/bin/bash -c {}",
                        crate::common::utils::str::shell_quote(&commands.join(" && "))
                    )
                }
            }
        }
    }
}

impl Display for OsFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Windows => f.write_str("Windows"),
            OsFamily::Linux => f.write_str("Linux"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub id: JobId,
    pub creation_time: DateTime<Utc>,
    #[serde(default)]
    pub execution_info: Option<JobExecutionInfo>,
}

impl JobInfo {
    /// Id of the pool the job runs on. For auto pools it is filled in by the remote side
    /// some time after the job was created.
    pub fn pool_id(&self) -> Option<&str> {
        self.execution_info
            .as_ref()
            .and_then(|info| info.pool_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecutionInfo {
    #[serde(default)]
    pub pool_id: Option<PoolId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AllocationState {
    Steady,
    Resizing,
    Stopping,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResizeError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInfo {
    pub id: PoolId,
    pub allocation_state: AllocationState,
    #[serde(default)]
    pub current_dedicated_nodes: u32,
    #[serde(default)]
    pub target_dedicated_nodes: u32,
    #[serde(default)]
    pub resize_errors: Option<Vec<ResizeError>>,
}

impl PoolInfo {
    pub fn is_steady(&self) -> bool {
        self.allocation_state == AllocationState::Steady
    }

    pub fn is_under_allocated(&self) -> bool {
        self.current_dedicated_nodes < self.target_dedicated_nodes
    }

    pub fn resize_errors(&self) -> &[ResizeError] {
        self.resize_errors.as_deref().unwrap_or_default()
    }

    pub fn is_core_quota_reached(&self) -> bool {
        self.resize_errors()
            .iter()
            .any(|error| error.code == ACCOUNT_CORE_QUOTA_REACHED)
    }

    /// Human readable summary of the resize errors, if there are any.
    pub fn resize_error_summary(&self) -> Option<String> {
        let errors = self.resize_errors();
        if errors.is_empty() {
            return None;
        }
        Some(
            errors
                .iter()
                .map(|error| format!("{}: {}", error.code, error.message))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeNodeState {
    Idle,
    Running,
    Rebooting,
    Reimaging,
    Creating,
    Starting,
    WaitingForStartTask,
    StartTaskFailed,
    LeavingPool,
    Offline,
    Preempted,
    Unusable,
    Unknown,
    #[serde(other)]
    Other,
}

impl ComputeNodeState {
    /// The node can receive tasks.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Idle | Self::Running)
    }

    /// The node is on its way to become ready.
    pub fn is_preparing(&self) -> bool {
        matches!(
            self,
            Self::Creating
                | Self::Starting
                | Self::WaitingForStartTask
                | Self::Rebooting
                | Self::Reimaging
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComputeNode {
    /// Missing when the listing was projected to the `state` field only.
    #[serde(default)]
    pub id: NodeId,
    pub state: ComputeNodeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    Active,
    Preparing,
    Running,
    Completed,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskFailureInfo {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionInfo {
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Set both for tasks that never started and for tasks that exited with a non-zero code.
    #[serde(default, alias = "schedulingError")]
    pub failure_info: Option<TaskFailureInfo>,
}

impl TaskExecutionInfo {
    /// Failure of a task that did not produce an exit code, i.e. it was never started.
    pub fn scheduling_error(&self) -> Option<&TaskFailureInfo> {
        match self.exit_code {
            Some(_) => None,
            None => self.failure_info.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub id: TaskId,
    #[serde(default)]
    pub display_name: Option<String>,
    pub state: TaskState,
    #[serde(default)]
    pub execution_info: Option<TaskExecutionInfo>,
}

impl TaskInfo {
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreparationTaskState {
    Running,
    Completed,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparationTaskExecutionInfo {
    pub state: PreparationTaskState,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

/// Status of the job preparation task on a single node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparationTaskStatus {
    pub pool_id: PoolId,
    pub node_id: NodeId,
    #[serde(default)]
    pub job_preparation_task_execution_info: Option<PreparationTaskExecutionInfo>,
}

impl PreparationTaskStatus {
    pub fn is_completed(&self) -> bool {
        self.job_preparation_task_execution_info
            .as_ref()
            .is_some_and(|info| info.state == PreparationTaskState::Completed)
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.job_preparation_task_execution_info
            .as_ref()
            .and_then(|info| info.exit_code)
    }
}

// Write side

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAddParameter {
    pub id: JobId,
    pub pool_info: PoolInformation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<JobConstraints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_preparation_task: Option<JobPreparationTask>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<PoolId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_pool_specification: Option<AutoPoolSpecification>,
}

impl PoolInformation {
    pub fn existing(pool_id: impl Into<PoolId>) -> Self {
        Self {
            pool_id: Some(pool_id.into()),
            auto_pool_specification: None,
        }
    }

    pub fn auto(specification: AutoPoolSpecification) -> Self {
        Self {
            pool_id: None,
            auto_pool_specification: Some(specification),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PoolLifetimeOption {
    Job,
    JobSchedule,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPoolSpecification {
    pub auto_pool_id_prefix: String,
    pub pool_lifetime_option: PoolLifetimeOption,
    pub keep_alive: bool,
    pub pool: PoolSpecification,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpecification {
    pub vm_size: String,
    pub target_dedicated_nodes: u32,
    pub task_slots_per_node: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_service_configuration: Option<CloudServiceConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_machine_configuration: Option<VirtualMachineConfiguration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudServiceConfiguration {
    pub os_family: String,
    pub os_version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineConfiguration {
    pub image_reference: ImageReference,
    #[serde(rename = "nodeAgentSKUId")]
    pub node_agent_sku_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConstraints {
    pub max_wall_clock_time: String,
}

impl JobConstraints {
    pub fn with_max_wall_clock_time(duration: Duration) -> Self {
        Self {
            max_wall_clock_time: format_iso8601_minutes(duration),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPreparationTask {
    pub id: String,
    pub command_line: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource_files: Vec<ResourceFile>,
    pub wait_for_success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFile {
    pub http_url: String,
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAddParameter {
    pub id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub command_line: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource_files: Vec<ResourceFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<JobConstraints>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeDeallocationOption {
    Requeue,
    Terminate,
    TaskCompletion,
    RetainedData,
}

impl NodeDeallocationOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requeue => "requeue",
            Self::Terminate => "terminate",
            Self::TaskCompletion => "taskcompletion",
            Self::RetainedData => "retaineddata",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizePoolRequest {
    pub target_dedicated_nodes: u32,
    pub resize_timeout: Option<Duration>,
    pub deallocation_option: Option<NodeDeallocationOption>,
}

impl ResizePoolRequest {
    pub fn to_target(target_dedicated_nodes: u32) -> Self {
        Self {
            target_dedicated_nodes,
            resize_timeout: None,
            deallocation_option: None,
        }
    }

    /// Removes all nodes once they have finished their running tasks.
    pub fn shrink_to_zero(resize_timeout: Duration) -> Self {
        Self {
            target_dedicated_nodes: 0,
            resize_timeout: Some(resize_timeout),
            deallocation_option: Some(NodeDeallocationOption::TaskCompletion),
        }
    }
}

/// Server-side projection and filter of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub select: Option<String>,
    pub filter: Option<String>,
}

impl ListOptions {
    pub fn select(mut self, select: &str) -> Self {
        self.select = Some(select.to_string());
        self
    }

    pub fn filter(mut self, filter: &str) -> Self {
        self.filter = Some(filter.to_string());
        self
    }
}
