//! Creation of the pool job, which owns an automatically created pool.
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::common::utils::time::{minutes, minutes_between};
use crate::orchestrator::config::{AUTO_POOL_ID_PREFIX, JOB_TIMEOUT_SAFETY_MARGIN, POOL_ID_TIMEOUT};
use crate::orchestrator::poll::PollLoop;
use crate::project::{VmConfig, VmImage};
use crate::remote::ComputeClient;
use crate::remote::model::{
    AutoPoolSpecification, CloudServiceConfiguration, ImageReference, JobAddParameter,
    JobConstraints, OsFamily, PoolId, PoolInformation, PoolLifetimeOption, PoolSpecification,
    VirtualMachineConfiguration,
};

pub fn build_pool_specification(vm: &VmConfig) -> PoolSpecification {
    let (cloud_service_configuration, virtual_machine_configuration) = match &vm.image {
        VmImage::CloudService {
            os_family,
            os_version,
        } => (
            Some(CloudServiceConfiguration {
                os_family: os_family.clone(),
                os_version: os_version.clone(),
            }),
            None,
        ),
        VmImage::VirtualMachine {
            publisher,
            offer,
            sku,
            version,
            node_agent_sku_id,
        } => (
            None,
            Some(VirtualMachineConfiguration {
                image_reference: ImageReference {
                    publisher: publisher.clone(),
                    offer: offer.clone(),
                    sku: sku.clone(),
                    version: version.clone(),
                },
                node_agent_sku_id: node_agent_sku_id.clone(),
            }),
        ),
    };
    PoolSpecification {
        vm_size: vm.size.clone(),
        target_dedicated_nodes: vm.count,
        task_slots_per_node: vm.max_tasks_per_node,
        cloud_service_configuration,
        virtual_machine_configuration,
    }
}

/// Job whose only purpose is to own an auto pool that lives as long as the job.
pub fn build_pool_job(pool_job_id: &str, vm: &VmConfig, lifetime: Duration) -> JobAddParameter {
    JobAddParameter {
        id: pool_job_id.to_string(),
        pool_info: PoolInformation::auto(AutoPoolSpecification {
            auto_pool_id_prefix: AUTO_POOL_ID_PREFIX.to_string(),
            pool_lifetime_option: PoolLifetimeOption::Job,
            keep_alive: vm.keep_alive,
            pool: build_pool_specification(vm),
        }),
        constraints: Some(JobConstraints::with_max_wall_clock_time(lifetime)),
        job_preparation_task: None,
    }
}

/// Creates the pool job and returns the OS family of the nodes of its pool.
pub async fn create_pool_job(
    client: &dyn ComputeClient,
    pool_job_id: &str,
    vm: &VmConfig,
    lifetime: Duration,
) -> crate::Result<OsFamily> {
    let os_family = vm.image.os_family();
    match &vm.image {
        VmImage::CloudService {
            os_family: family, ..
        } => log::info!("Using cloud service configuration with OS family {family}"),
        VmImage::VirtualMachine {
            publisher,
            offer,
            sku,
            ..
        } => log::info!("Using virtual machine configuration with image {publisher}:{offer}:{sku}"),
    }
    log::info!(
        "Creating pool job {pool_job_id} with {} {} node(s) of size {}, pool lifetime {} minutes",
        vm.count,
        os_family,
        vm.size,
        lifetime.as_secs() / 60
    );
    client
        .create_job(build_pool_job(pool_job_id, vm, lifetime))
        .await?;
    log::info!("Pool job {pool_job_id} is created");
    Ok(os_family)
}

/// Waits until the remote side assigns the auto pool to the pool job.
pub async fn resolve_pool_id(client: &dyn ComputeClient, pool_job_id: &str) -> crate::Result<PoolId> {
    let mut poll = PollLoop::new("pool assignment", format!("job {pool_job_id}"), POOL_ID_TIMEOUT);
    loop {
        let job = client.get_job(pool_job_id).await?;
        if let Some(pool_id) = job.pool_id() {
            log::info!("Pool job {pool_job_id} runs on pool {pool_id}");
            return Ok(pool_id.to_string());
        }
        poll.next_tick().await?;
    }
}

/// Wall-clock constraint covering the time elapsed since `since`, `extra` and a safety margin.
pub fn extended_timeout(since: DateTime<Utc>, now: DateTime<Utc>, extra: Duration) -> Duration {
    minutes(minutes_between(since, now)) + extra + JOB_TIMEOUT_SAFETY_MARGIN
}

/// Extends the wall-clock constraint of a job so that it covers the time elapsed since `since`
/// and `extra` more.
pub async fn extend_job_timeout(
    client: &dyn ComputeClient,
    job_id: &str,
    since: DateTime<Utc>,
    extra: Duration,
) -> crate::Result<Duration> {
    let timeout = extended_timeout(since, Utc::now(), extra);
    log::info!(
        "Setting timeout of job {job_id} to {} minutes",
        timeout.as_secs() / 60
    );
    client
        .patch_job_constraints(job_id, JobConstraints::with_max_wall_clock_time(timeout))
        .await?;
    Ok(timeout)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use crate::common::utils::time::minutes;
    use crate::orchestrator::provision::{
        build_pool_job, create_pool_job, extend_job_timeout, extended_timeout, resolve_pool_id,
    };
    use crate::project::VmImage;
    use crate::remote::model::{JobConstraints, OsFamily};
    use crate::tests::client::TestClient;
    use crate::tests::utils::{client_with_jobs, init_logging, linux_vm, JOB_ID};

    #[test]
    fn pool_job_payload() {
        let job = build_pool_job("pj", &linux_vm(3), minutes(180));
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["id"], "pj");
        assert_eq!(value["constraints"]["maxWallClockTime"], "PT180M");
        let auto = &value["poolInfo"]["autoPoolSpecification"];
        assert_eq!(auto["autoPoolIdPrefix"], "batchpilotpool");
        assert_eq!(auto["poolLifetimeOption"], "job");
        assert_eq!(auto["keepAlive"], false);
        assert_eq!(auto["pool"]["targetDedicatedNodes"], 3);
        assert_eq!(auto["pool"]["vmSize"], "STANDARD_D2_V2");
        assert_eq!(
            auto["pool"]["virtualMachineConfiguration"]["nodeAgentSKUId"],
            "batch.node.ubuntu 22.04"
        );
        assert!(auto["pool"].get("cloudServiceConfiguration").is_none());
        assert!(value["poolInfo"].get("poolId").is_none());
    }

    #[tokio::test]
    async fn create_reports_os_family() {
        init_logging();
        let client = TestClient::new();
        let os_family = create_pool_job(&client, "pj", &linux_vm(1), minutes(180))
            .await
            .unwrap();
        assert_eq!(os_family, OsFamily::Linux);
        assert_eq!(client.get().created_jobs.len(), 1);

        let mut vm = linux_vm(1);
        vm.image = VmImage::CloudService {
            os_family: "5".to_string(),
            os_version: "*".to_string(),
        };
        let os_family = create_pool_job(&client, "pj2", &vm, minutes(180))
            .await
            .unwrap();
        assert_eq!(os_family, OsFamily::Windows);
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_waits_for_assignment() {
        let client = TestClient::new();
        client.get_mut().pool_assignment_delay = 3;
        create_pool_job(&client, "pj", &linux_vm(1), minutes(180))
            .await
            .unwrap();
        let start = tokio::time::Instant::now();
        let pool_id = resolve_pool_id(&client, "pj").await.unwrap();
        assert_eq!(pool_id, "pool-1");
        assert_eq!(client.get().get_job_calls, 4);
        assert_eq!(start.elapsed(), Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_times_out() {
        let client = TestClient::new();
        client.get_mut().pool_assignment_delay = usize::MAX;
        create_pool_job(&client, "pj", &linux_vm(1), minutes(180))
            .await
            .unwrap();
        let error = resolve_pool_id(&client, "pj").await.unwrap_err();
        assert!(error.to_string().contains("job pj"));
    }

    #[test]
    fn extended_timeout_adds_margin() {
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 25, 30).unwrap();
        assert_eq!(extended_timeout(since, now, minutes(60)), minutes(25 + 60 + 15));
    }

    #[tokio::test]
    async fn extend_patches_job() {
        let client = client_with_jobs();
        let timeout = extend_job_timeout(&client, JOB_ID, Utc::now(), minutes(30))
            .await
            .unwrap();
        assert_eq!(timeout, minutes(45));
        assert_eq!(
            client.get().patched_jobs,
            vec![(
                JOB_ID.to_string(),
                JobConstraints {
                    max_wall_clock_time: "PT45M".to_string()
                }
            )]
        );
    }
}
