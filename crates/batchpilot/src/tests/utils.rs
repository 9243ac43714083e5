use std::path::Path;
use std::rc::Rc;

use derive_builder::Builder;
use log::LevelFilter;
use tempfile::TempDir;

use crate::orchestrator::state::RunState;
use crate::project::{JobConfig, ProjectConfig, TaskConfig, VmConfig, VmImage};
use crate::remote::ComputeClient;
use crate::remote::model::{
    AllocationState, ComputeNode, ComputeNodeState, JobInfo, OsFamily, PoolInfo,
    PreparationTaskExecutionInfo, PreparationTaskState, PreparationTaskStatus, ResizeError,
    TaskExecutionInfo, TaskFailureInfo, TaskInfo, TaskState,
};
use crate::tests::client::TestClient;

pub const POOL_JOB_ID: &str = "pool-job";
pub const JOB_ID: &str = "job";
pub const POOL_ID: &str = "pool-1";

pub fn init_logging() {
    let _ = env_logger::Builder::default()
        .filter(None, LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

#[derive(Builder)]
#[builder(pattern = "owned", build_fn(name = "finish"))]
pub struct Pool {
    #[builder(default = "AllocationState::Steady")]
    state: AllocationState,
    #[builder(default = "1")]
    current: u32,
    #[builder(default = "1")]
    target: u32,
    #[builder(default, setter(into, strip_option))]
    resize_error: Option<String>,
}

impl PoolBuilder {
    pub fn build(self) -> PoolInfo {
        let Pool {
            state,
            current,
            target,
            resize_error,
        } = self.finish().unwrap();
        PoolInfo {
            id: POOL_ID.to_string(),
            allocation_state: state,
            current_dedicated_nodes: current,
            target_dedicated_nodes: target,
            resize_errors: resize_error.map(|code| {
                vec![ResizeError {
                    message: format!("{code} happened"),
                    code,
                }]
            }),
        }
    }
}

pub fn pool() -> PoolBuilder {
    PoolBuilder::default()
}

pub fn node(id: &str, state: ComputeNodeState) -> ComputeNode {
    ComputeNode {
        id: id.to_string(),
        state,
    }
}

/// Task as returned by an `id,state` projection.
pub fn task(id: &str, state: TaskState) -> TaskInfo {
    TaskInfo {
        id: id.to_string(),
        display_name: None,
        state,
        execution_info: None,
    }
}

pub fn finished_task(id: &str, exit_code: i32) -> TaskInfo {
    TaskInfo {
        id: id.to_string(),
        display_name: Some(format!("{id} name")),
        state: TaskState::Completed,
        execution_info: Some(TaskExecutionInfo {
            exit_code: Some(exit_code),
            failure_info: (exit_code != 0).then(|| TaskFailureInfo {
                category: "usererror".to_string(),
                code: "FailureExitCode".to_string(),
                message: "The task exited with an exit code representing a failure".to_string(),
            }),
        }),
    }
}

pub fn unschedulable_task(id: &str) -> TaskInfo {
    TaskInfo {
        id: id.to_string(),
        display_name: None,
        state: TaskState::Completed,
        execution_info: Some(TaskExecutionInfo {
            exit_code: None,
            failure_info: Some(TaskFailureInfo {
                category: "userError".to_string(),
                code: "BlobNotFound".to_string(),
                message: "resource file is missing".to_string(),
            }),
        }),
    }
}

pub fn preparation(node_id: &str, exit_code: Option<i32>) -> PreparationTaskStatus {
    PreparationTaskStatus {
        pool_id: POOL_ID.to_string(),
        node_id: node_id.to_string(),
        job_preparation_task_execution_info: Some(PreparationTaskExecutionInfo {
            state: match exit_code {
                Some(_) => PreparationTaskState::Completed,
                None => PreparationTaskState::Running,
            },
            exit_code,
        }),
    }
}

/// Client in which both jobs of a run already exist.
pub fn client_with_jobs() -> TestClient {
    let client = TestClient::new();
    {
        let mut state = client.get_mut();
        for id in [POOL_JOB_ID, JOB_ID] {
            state.jobs.insert(
                id.to_string(),
                JobInfo {
                    id: id.to_string(),
                    creation_time: chrono::Utc::now(),
                    execution_info: None,
                },
            );
        }
    }
    client
}

pub fn run_state(dir: &Path, os_family: OsFamily) -> RunState {
    let mut state = RunState::new(
        POOL_JOB_ID.to_string(),
        JOB_ID.to_string(),
        dir.to_path_buf(),
    );
    state.os_family = os_family;
    state
}

pub fn output_dir() -> TempDir {
    TempDir::with_prefix("batchpilot").unwrap()
}

pub fn as_client(client: &TestClient) -> Rc<dyn ComputeClient> {
    Rc::new(client.clone())
}

pub fn linux_vm(count: u32) -> VmConfig {
    VmConfig {
        image: VmImage::VirtualMachine {
            publisher: "canonical".to_string(),
            offer: "ubuntuserver".to_string(),
            sku: "22_04-lts".to_string(),
            version: "latest".to_string(),
            node_agent_sku_id: "batch.node.ubuntu 22.04".to_string(),
        },
        size: "STANDARD_D2_V2".to_string(),
        count,
        max_tasks_per_node: 1,
        keep_alive: false,
    }
}

pub fn project(task_ids: &[&str]) -> ProjectConfig {
    ProjectConfig {
        vm: linux_vm(2),
        job: JobConfig {
            timeout: std::time::Duration::from_secs(60 * 60),
            setup: vec!["./install.sh".to_string()],
            tasks: task_ids
                .iter()
                .map(|id| TaskConfig {
                    id: id.to_string(),
                    name: None,
                    command: format!("./run.sh {id}"),
                    timeout: None,
                })
                .collect(),
        },
        resources: vec![],
    }
}
