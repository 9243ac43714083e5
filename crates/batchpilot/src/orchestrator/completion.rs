use std::time::Duration;

use crate::common::utils::str::pluralize;
use crate::orchestrator::poll::PollLoop;
use crate::orchestrator::retrieval::{retrieve_listed_task, sweep_job_preparation};
use crate::orchestrator::state::RunState;
use crate::remote::ComputeClient;
use crate::remote::model::{
    ComputeNode, ComputeNodeState, ListOptions, ResizePoolRequest, TaskInfo, TaskState,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskCounts {
    pub active: usize,
    pub preparing: usize,
    pub running: usize,
    pub completed: usize,
    pub other: usize,
}

impl TaskCounts {
    pub fn from_tasks(tasks: &[TaskInfo]) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            match task.state {
                TaskState::Active => counts.active += 1,
                TaskState::Preparing => counts.preparing += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Other => counts.other += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.active + self.preparing + self.running + self.completed + self.other
    }

    pub fn is_finished(&self) -> bool {
        self.completed == self.total()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct NodeCounts {
    total: usize,
    /// Nodes that are not leaving the pool.
    active: usize,
    ready: usize,
}

impl NodeCounts {
    fn from_nodes(nodes: &[ComputeNode]) -> Self {
        Self {
            total: nodes.len(),
            active: nodes
                .iter()
                .filter(|node| node.state != ComputeNodeState::LeavingPool)
                .count(),
            ready: nodes.iter().filter(|node| node.state.is_ready()).count(),
        }
    }
}

fn node_listing() -> ListOptions {
    ListOptions::default().select("state")
}

/// Waits until at least one node has finished its job preparation task, so that the job
/// has somewhere to run. Failed preparation tasks have their logs retrieved on the way.
pub async fn wait_for_job_preparation(
    client: &dyn ComputeClient,
    state: &mut RunState,
    pool_id: &str,
    timeout: Duration,
) -> crate::Result<()> {
    log::info!(
        "Waiting for the job preparation task of job {} to finish on a node",
        state.job_id
    );
    let mut poll = PollLoop::new(
        "job preparation",
        format!("job {}", state.job_id),
        timeout,
    );
    let mut last_counts = None;
    loop {
        let sweep = sweep_job_preparation(client, state).await?;
        if sweep.completed_nodes > 0 {
            log::info!(
                "Job preparation task finished on {} {}",
                sweep.completed_nodes,
                pluralize("node", sweep.completed_nodes)
            );
            return Ok(());
        }
        let nodes = NodeCounts::from_nodes(&client.list_compute_nodes(pool_id, node_listing()).await?);
        let counts = (nodes, sweep.running_nodes);
        if last_counts != Some(counts) {
            log::info!(
                "Job preparation is running on {} of {} ready {}",
                sweep.running_nodes,
                nodes.ready,
                pluralize("node", nodes.ready)
            );
            last_counts = Some(counts);
        }
        poll.next_tick().await?;
    }
}

/// Resizes the pool to zero once no task waits for a node. Nodes are removed after they
/// finish their running tasks.
async fn try_shrink_pool(
    client: &dyn ComputeClient,
    pool_id: &str,
    tasks: &[TaskInfo],
    resize_timeout: Duration,
) -> crate::Result<bool> {
    if tasks.iter().any(|task| task.state == TaskState::Active) {
        return Ok(false);
    }
    let pool = client.get_pool(pool_id).await?;
    if !pool.is_steady() {
        return Ok(false);
    }
    if pool.current_dedicated_nodes == 0 && pool.target_dedicated_nodes == 0 {
        return Ok(false);
    }
    log::info!("No task is waiting for a node, shrinking pool {pool_id}");
    client
        .resize_pool(pool_id, ResizePoolRequest::shrink_to_zero(resize_timeout))
        .await?;
    Ok(true)
}

/// Monitors the job until all of its tasks are completed, retrieving logs of finished tasks
/// as they appear.
pub async fn wait_for_all_tasks(
    client: &dyn ComputeClient,
    state: &mut RunState,
    pool_id: &str,
    timeout: Duration,
) -> crate::Result<()> {
    log::info!(
        "Waiting for all tasks of job {} to complete, timeout {} minutes",
        state.job_id,
        timeout.as_secs() / 60
    );
    let mut poll = PollLoop::new("completion of all tasks", format!("job {}", state.job_id), timeout);
    let mut preparation_done = false;
    let mut last_nodes = None;

    loop {
        if !preparation_done {
            let sweep = sweep_job_preparation(client, state).await?;
            let pool = client.get_pool(pool_id).await?;
            preparation_done = sweep.completed_nodes >= pool.current_dedicated_nodes as usize;
        }

        let tasks = client
            .list_tasks(&state.job_id, ListOptions::default().select("id,state"))
            .await?;
        try_shrink_pool(client, pool_id, &tasks, timeout).await?;

        let counts = TaskCounts::from_tasks(&tasks);
        for task in &tasks {
            if task.state != TaskState::Completed || state.retrieved.contains(&task.id) {
                continue;
            }
            retrieve_listed_task(client, state, task).await?;
            state.retrieved.mark(task.id.clone());
        }

        if counts.is_finished() {
            log::info!(
                "All {} {} of job {} are completed",
                counts.total(),
                pluralize("task", counts.total()),
                state.job_id
            );
            return Ok(());
        }

        let nodes = NodeCounts::from_nodes(&client.list_compute_nodes(pool_id, node_listing()).await?);
        if last_nodes.is_none_or(|last: NodeCounts| {
            last.active != nodes.active || last.total != nodes.total
        }) {
            log::info!(
                "{} active of {} {}; tasks: {} active, {} preparing, {} running, {} completed",
                nodes.active,
                nodes.total,
                pluralize("node", nodes.total),
                counts.active,
                counts.preparing,
                counts.running,
                counts.completed
            );
            last_nodes = Some(nodes);
        }
        poll.next_tick().await?;
    }
}
