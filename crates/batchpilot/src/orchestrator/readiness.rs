use crate::common::error::BatchError;
use crate::common::utils::str::pluralize;
use crate::orchestrator::config::{NODE_READY_TIMEOUT, POOL_STEADY_TIMEOUT};
use crate::orchestrator::poll::PollLoop;
use crate::remote::ComputeClient;
use crate::remote::model::{ListOptions, PoolInfo, ResizePoolRequest};

const READY_NODE_FILTER: &str = "state eq 'idle' or state eq 'running'";

/// Waits until the pool has at least one node able to run tasks.
pub async fn wait_for_pool_ready(client: &dyn ComputeClient, pool_id: &str) -> crate::Result<()> {
    let pool = wait_for_pool_steady(client, pool_id).await?;
    check_allocation_and_resize(client, pool).await?;
    wait_for_node_ready(client, pool_id).await
}

/// Waits until the pool is not resizing and returns its state at that moment.
pub async fn wait_for_pool_steady(
    client: &dyn ComputeClient,
    pool_id: &str,
) -> crate::Result<PoolInfo> {
    log::info!("Waiting for pool {pool_id} to reach steady state");
    let mut poll = PollLoop::new("steady state", format!("pool {pool_id}"), POOL_STEADY_TIMEOUT);
    loop {
        let pool = client.get_pool(pool_id).await?;
        if pool.is_steady() {
            log::info!(
                "Pool {pool_id} is steady with {}/{} {}",
                pool.current_dedicated_nodes,
                pool.target_dedicated_nodes,
                pluralize("node", pool.target_dedicated_nodes as usize)
            );
            return Ok(pool);
        }
        poll.next_tick().await?;
    }
}

fn warn_degraded(pool: &PoolInfo) {
    log::warn!(
        "Pool {} has only {} of {} requested nodes{}, continuing with reduced capacity",
        pool.id,
        pool.current_dedicated_nodes,
        pool.target_dedicated_nodes,
        pool.resize_error_summary()
            .map(|summary| format!(" ({summary})"))
            .unwrap_or_default()
    );
}

fn no_nodes_error(pool: &PoolInfo) -> BatchError {
    BatchError::AllocationError(format!(
        "Pool {} has no nodes allocated: {}",
        pool.id,
        pool.resize_error_summary()
            .unwrap_or_else(|| "no resize error reported".to_string())
    ))
}

/// Handles a steady pool with fewer nodes than requested: fails if it has no nodes at all,
/// retries the resize once if the account quota allows it and otherwise carries on with
/// the nodes it has.
pub async fn check_allocation_and_resize(
    client: &dyn ComputeClient,
    pool: PoolInfo,
) -> crate::Result<()> {
    if !pool.is_under_allocated() {
        return Ok(());
    }
    if pool.is_core_quota_reached() {
        if pool.current_dedicated_nodes == 0 {
            return Err(BatchError::AllocationError(format!(
                "Pool {} has no nodes allocated because the account core quota was reached, \
                 request a higher core quota for the Batch account",
                pool.id
            )));
        }
        warn_degraded(&pool);
        return Ok(());
    }

    log::info!(
        "Pool {} has {} of {} nodes, resizing it once more",
        pool.id,
        pool.current_dedicated_nodes,
        pool.target_dedicated_nodes
    );
    client
        .resize_pool(
            &pool.id,
            ResizePoolRequest::to_target(pool.target_dedicated_nodes),
        )
        .await?;

    let pool = wait_for_pool_steady(client, &pool.id).await?;
    if pool.current_dedicated_nodes == 0 {
        return Err(no_nodes_error(&pool));
    }
    if pool.is_under_allocated() {
        warn_degraded(&pool);
    }
    Ok(())
}

/// Waits until at least one node of the pool is idle or running.
pub async fn wait_for_node_ready(client: &dyn ComputeClient, pool_id: &str) -> crate::Result<()> {
    log::info!("Waiting for a node of pool {pool_id} to become ready");
    let mut poll = PollLoop::new("a ready node", format!("pool {pool_id}"), NODE_READY_TIMEOUT);
    let options = ListOptions::default()
        .select("state")
        .filter(READY_NODE_FILTER);
    loop {
        let nodes = client.list_compute_nodes(pool_id, options.clone()).await?;
        if !nodes.is_empty() {
            log::info!(
                "Pool {pool_id} has {} ready {}",
                nodes.len(),
                pluralize("node", nodes.len())
            );
            return Ok(());
        }
        poll.next_tick().await?;
    }
}
