use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;

use crate::common::error::BatchError;
use crate::orchestrator::cleanup::delete_job;
use crate::orchestrator::completion::{wait_for_all_tasks, wait_for_job_preparation};
use crate::orchestrator::config::{
    CONTAINER_SAS_EXTRA_VALIDITY, JOB_ID_PREFIX, JOB_PREPARATION_TIMEOUT, UTILIZATION_FILE_NAME,
};
use crate::orchestrator::jobgen::{JobGenerator, JobSubmission};
use crate::orchestrator::provision::{create_pool_job, extend_job_timeout, resolve_pool_id};
use crate::orchestrator::readiness::wait_for_pool_ready;
use crate::orchestrator::resources::{container_name, stage_resources};
use crate::orchestrator::retrieval::retrieve_job_outputs;
use crate::orchestrator::sampler::UtilizationSampler;
use crate::orchestrator::state::RunState;
use crate::project::ProjectConfig;
use crate::remote::ComputeClient;
use crate::remote::model::ResourceFile;
use crate::storage::BlobStorage;

/// Creates a unique job id in the form `batchpilot-<tag>-<timestamp>-<random hex>`.
pub fn create_job_id(tag: &str) -> String {
    let suffix: [u8; 16] = rand::random();
    format!(
        "{JOB_ID_PREFIX}-{tag}-{}-{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        hex::encode(suffix)
    )
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory where the output directory and the utilization file are created.
    pub work_dir: PathBuf,
    /// Distinguishes jobs of different projects, part of the job ids.
    pub tag: String,
    pub pool_lifetime: Duration,
    pub sample_utilization: bool,
}

/// Drives a single run: provisions the pool, runs the job on it and cleans up afterwards.
///
/// [`Orchestrator::finish`] has to be called after [`Orchestrator::run`], regardless of
/// whether it succeeded, failed or was cancelled.
pub struct Orchestrator {
    client: Rc<dyn ComputeClient>,
    storage: Option<Rc<dyn BlobStorage>>,
    generator: Box<dyn JobGenerator>,
    project: ProjectConfig,
    options: RunOptions,
    state: RunState,
    sampler: Option<UtilizationSampler>,
}

impl Orchestrator {
    pub fn new(
        client: Rc<dyn ComputeClient>,
        storage: Option<Rc<dyn BlobStorage>>,
        generator: Box<dyn JobGenerator>,
        project: ProjectConfig,
        options: RunOptions,
    ) -> crate::Result<Self> {
        if !project.resources.is_empty() && storage.is_none() {
            return Err(BatchError::ConfigurationError(
                "The project uploads resources, but no storage account was configured".to_string(),
            ));
        }
        let pool_job_id = create_job_id(&format!("{}-pool", options.tag));
        let job_id = create_job_id(&options.tag);
        let output_dir = options.work_dir.join(format!("{job_id}-output"));
        std::fs::create_dir_all(&output_dir)?;
        log::info!("Outputs of the run are stored in {}", output_dir.display());

        Ok(Self {
            client,
            storage,
            generator,
            project,
            options,
            state: RunState::new(pool_job_id, job_id, output_dir),
            sampler: None,
        })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub async fn run(&mut self) -> crate::Result<()> {
        let client = self.client.clone();
        let client = client.as_ref();
        let job_timeout = self.project.job.timeout;
        let pool_job_id = self.state.pool_job_id.clone();

        self.state.os_family = create_pool_job(
            client,
            &pool_job_id,
            &self.project.vm,
            self.options.pool_lifetime,
        )
        .await?;
        let pool_id = resolve_pool_id(client, &pool_job_id).await?;

        if self.options.sample_utilization {
            self.sampler = Some(UtilizationSampler::start(
                self.client.clone(),
                pool_id.clone(),
                self.options.work_dir.join(UTILIZATION_FILE_NAME),
            )?);
        }

        wait_for_pool_ready(client, &pool_id).await?;

        let resource_files = self
            .stage_resources(self.options.pool_lifetime + job_timeout + CONTAINER_SAS_EXTRA_VALIDITY)
            .await?;

        let pool_job = client.get_job(&pool_job_id).await?;
        extend_job_timeout(client, &pool_job_id, pool_job.creation_time, job_timeout).await?;

        let submission = JobSubmission {
            job_id: self.state.job_id.clone(),
            pool_id: pool_id.clone(),
            timeout: job_timeout,
            os_family: self.state.os_family,
            resource_files,
        };
        let count = self
            .generator
            .create_job_with_tasks(self.client.clone(), submission)
            .await?;
        log::info!("Job {} was submitted with {count} tasks", self.state.job_id);
        // Pool warm-up counts against the job timeout as well
        extend_job_timeout(
            client,
            &self.state.job_id,
            pool_job.creation_time,
            job_timeout,
        )
        .await?;

        wait_for_job_preparation(client, &mut self.state, &pool_id, JOB_PREPARATION_TIMEOUT)
            .await?;
        wait_for_all_tasks(client, &mut self.state, &pool_id, job_timeout).await
    }

    async fn stage_resources(&self, sas_validity: Duration) -> crate::Result<Vec<ResourceFile>> {
        match &self.storage {
            Some(storage) if !self.project.resources.is_empty() => {
                stage_resources(
                    storage.as_ref(),
                    &container_name(&self.state.job_id),
                    &self.project.resources,
                    sas_validity,
                )
                .await
            }
            _ => Ok(vec![]),
        }
    }

    /// Retrieves remaining outputs, stops the sampler and deletes both jobs. All steps are
    /// attempted, the first error is returned.
    pub async fn finish(&mut self) -> crate::Result<()> {
        let client = self.client.clone();
        let client = client.as_ref();
        let mut first_error = None;

        if let Err(error) = retrieve_job_outputs(client, &mut self.state).await {
            log::error!("Cannot retrieve outputs of job {}: {error}", self.state.job_id);
            first_error.get_or_insert(error);
        }
        if let Some(sampler) = self.sampler.take() {
            sampler.stop().await;
        }
        for job_id in [&self.state.job_id, &self.state.pool_job_id] {
            if let Err(error) = delete_job(client, job_id).await {
                log::error!("Cannot delete job {job_id}: {error}");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
