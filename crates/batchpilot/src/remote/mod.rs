pub mod azcli;
pub(crate) mod common;
pub mod model;

use std::path::Path;

use futures::future::LocalBoxFuture;

use crate::remote::model::{
    ComputeNode, JobAddParameter, JobConstraints, JobInfo, ListOptions, PoolInfo,
    PreparationTaskStatus, ResizePoolRequest, TaskAddParameter, TaskInfo,
};

/// Future returned by remote operations. Remote clients live on the single control thread,
/// so the futures do not have to be `Send`.
pub type RemoteFuture<T> = LocalBoxFuture<'static, crate::Result<T>>;

/// Client of the remote Batch service.
///
/// A job or pool that does not exist is reported as [`crate::Error::RemoteError`] with a
/// `*NotFound` code (see [`crate::Error::is_not_found`]).
pub trait ComputeClient {
    fn create_job(&self, job: JobAddParameter) -> RemoteFuture<()>;
    fn get_job(&self, job_id: &str) -> RemoteFuture<JobInfo>;
    /// Replaces the wall-clock constraint of an existing job.
    fn patch_job_constraints(&self, job_id: &str, constraints: JobConstraints)
    -> RemoteFuture<()>;
    fn delete_job(&self, job_id: &str) -> RemoteFuture<()>;
    fn add_tasks(&self, job_id: &str, tasks: Vec<TaskAddParameter>) -> RemoteFuture<()>;

    fn get_pool(&self, pool_id: &str) -> RemoteFuture<PoolInfo>;
    fn pool_exists(&self, pool_id: &str) -> RemoteFuture<bool>;
    fn resize_pool(&self, pool_id: &str, request: ResizePoolRequest) -> RemoteFuture<()>;

    fn list_compute_nodes(
        &self,
        pool_id: &str,
        options: ListOptions,
    ) -> RemoteFuture<Vec<ComputeNode>>;
    fn get_compute_node(&self, pool_id: &str, node_id: &str) -> RemoteFuture<ComputeNode>;

    fn list_tasks(&self, job_id: &str, options: ListOptions) -> RemoteFuture<Vec<TaskInfo>>;
    fn get_task(&self, job_id: &str, task_id: &str) -> RemoteFuture<TaskInfo>;
    /// Status of the job preparation task on every node that has run it.
    fn list_preparation_status(&self, job_id: &str) -> RemoteFuture<Vec<PreparationTaskStatus>>;

    /// Downloads a file from the working directory of a task into `destination`.
    fn get_file_from_task(
        &self,
        job_id: &str,
        task_id: &str,
        file_path: &str,
        destination: &Path,
    ) -> RemoteFuture<()>;
    /// Downloads a file from a compute node. `file_path` is relative to the node's root
    /// directory.
    fn get_file_from_compute_node(
        &self,
        pool_id: &str,
        node_id: &str,
        file_path: &str,
        destination: &Path,
    ) -> RemoteFuture<()>;
}
