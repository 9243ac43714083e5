use std::time::Duration;

use crate::common::utils::time::minutes;

/// Time between two successive checks of the remote state in all waiting phases.
pub fn get_poll_interval() -> Duration {
    get_duration_from_env("BATCHPILOT_POLL_INTERVAL_MS").unwrap_or_else(|| Duration::from_secs(15))
}

/// Time between two utilization samples of the pool nodes.
pub fn get_sampler_interval() -> Duration {
    get_duration_from_env("BATCHPILOT_SAMPLER_INTERVAL_MS")
        .unwrap_or_else(|| Duration::from_secs(60))
}

fn get_duration_from_env(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_millis)
}

/// How long to wait until the remote side assigns a pool to the pool job.
pub const POOL_ID_TIMEOUT: Duration = minutes(15);
pub const POOL_STEADY_TIMEOUT: Duration = minutes(15);
pub const NODE_READY_TIMEOUT: Duration = minutes(20);
/// How long to wait for the first node that finished its job preparation task.
pub const JOB_PREPARATION_TIMEOUT: Duration = minutes(15);

pub const DEFAULT_POOL_LIFETIME: Duration = minutes(3 * 60);
/// Added on top of every extended job wall-clock constraint.
pub const JOB_TIMEOUT_SAFETY_MARGIN: Duration = minutes(15);
/// Added on top of the pool lifetime and job timeout for the validity of the resource
/// container signature.
pub const CONTAINER_SAS_EXTRA_VALIDITY: Duration = minutes(60);

pub const AUTO_POOL_ID_PREFIX: &str = "batchpilotpool";
pub const JOB_ID_PREFIX: &str = "batchpilot";

pub const STDOUT_FILE_NAME: &str = "stdout.txt";
pub const STDERR_FILE_NAME: &str = "stderr.txt";
/// Tag of the job preparation task, both in its remote directory and in local file names.
pub const JOB_PREPARATION_TAG: &str = "jobpreparation";

pub const UTILIZATION_FILE_NAME: &str = "vm-utilization.csv";

/// Pool looked up to check that the account credentials work. It does not have to exist.
pub const VALIDATION_POOL_ID: &str = "batchpilot-account-validation";
