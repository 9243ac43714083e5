use std::rc::Rc;
use std::time::Duration;

use crate::orchestrator::config::JOB_PREPARATION_TAG;
use crate::project::JobConfig;
use crate::remote::model::{
    JobAddParameter, JobConstraints, JobPreparationTask, OsFamily, PoolInformation,
    ResourceFile, TaskAddParameter,
};
use crate::remote::{ComputeClient, RemoteFuture};

/// Everything the generator needs to know about the environment of the task job.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub job_id: String,
    pub pool_id: String,
    pub timeout: Duration,
    pub os_family: OsFamily,
    pub resource_files: Vec<ResourceFile>,
}

/// Creates the task job on an existing pool and fills it with tasks.
pub trait JobGenerator {
    /// Returns the number of submitted tasks.
    fn create_job_with_tasks(
        &self,
        client: Rc<dyn ComputeClient>,
        submission: JobSubmission,
    ) -> RemoteFuture<usize>;
}

/// Generates the task job from the `[job]` section of a project file.
pub struct ProjectJobGenerator {
    job: JobConfig,
}

impl ProjectJobGenerator {
    pub fn new(job: JobConfig) -> Self {
        Self { job }
    }

    pub fn build_job(&self, submission: &JobSubmission) -> JobAddParameter {
        JobAddParameter {
            id: submission.job_id.clone(),
            pool_info: PoolInformation::existing(submission.pool_id.clone()),
            constraints: Some(JobConstraints::with_max_wall_clock_time(submission.timeout)),
            // A no-op task is used even without setup commands, its completion marks
            // a node as ready for tasks
            job_preparation_task: Some(JobPreparationTask {
                id: JOB_PREPARATION_TAG.to_string(),
                command_line: submission.os_family.shell_command(&self.job.setup),
                resource_files: submission.resource_files.clone(),
                wait_for_success: true,
            }),
        }
    }

    pub fn build_tasks(&self, submission: &JobSubmission) -> Vec<TaskAddParameter> {
        self.job
            .tasks
            .iter()
            .map(|task| TaskAddParameter {
                id: task.id.clone(),
                display_name: task.name.clone(),
                command_line: submission
                    .os_family
                    .shell_command(std::slice::from_ref(&task.command)),
                resource_files: vec![],
                constraints: task.timeout.map(JobConstraints::with_max_wall_clock_time),
            })
            .collect()
    }
}

impl JobGenerator for ProjectJobGenerator {
    fn create_job_with_tasks(
        &self,
        client: Rc<dyn ComputeClient>,
        submission: JobSubmission,
    ) -> RemoteFuture<usize> {
        let job = self.build_job(&submission);
        let tasks = self.build_tasks(&submission);
        Box::pin(async move {
            log::info!(
                "Creating job {} on pool {}",
                submission.job_id,
                submission.pool_id
            );
            client.create_job(job).await?;
            let count = tasks.len();
            client.add_tasks(&submission.job_id, tasks).await?;
            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::orchestrator::jobgen::{JobGenerator, JobSubmission, ProjectJobGenerator};
    use crate::remote::model::{OsFamily, ResourceFile};
    use crate::tests::client::TestClient;
    use crate::tests::utils::{JOB_ID, POOL_ID, as_client, project};

    fn submission(os_family: OsFamily) -> JobSubmission {
        JobSubmission {
            job_id: JOB_ID.to_string(),
            pool_id: POOL_ID.to_string(),
            timeout: Duration::from_secs(3600),
            os_family,
            resource_files: vec![ResourceFile {
                http_url: "https://store/job/tests?sig".to_string(),
                file_path: "tests".to_string(),
            }],
        }
    }

    #[test]
    fn job_payload() {
        let generator = ProjectJobGenerator::new(project(&["t1"]).job);
        let job = generator.build_job(&submission(OsFamily::Linux));
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["poolInfo"]["poolId"], POOL_ID);
        assert!(value["poolInfo"].get("autoPoolSpecification").is_none());
        assert_eq!(value["constraints"]["maxWallClockTime"], "PT60M");
        let preparation = &value["jobPreparationTask"];
        assert_eq!(preparation["commandLine"], "/bin/bash -c './install.sh'");
        assert_eq!(preparation["resourceFiles"][0]["filePath"], "tests");
        assert_eq!(preparation["waitForSuccess"], true);
    }

    #[test]
    fn windows_tasks() {
        let mut job = project(&["t1", "t2"]).job;
        job.tasks[1].timeout = Some(Duration::from_secs(600));
        let generator = ProjectJobGenerator::new(job);
        let tasks = generator.build_tasks(&submission(OsFamily::Windows));
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].command_line, "cmd /c \"./run.sh t1\"");
        assert!(tasks[0].constraints.is_none());
        assert_eq!(
            tasks[1].constraints.as_ref().unwrap().max_wall_clock_time,
            "PT10M"
        );
    }

    #[tokio::test]
    async fn submit_job() {
        let client = TestClient::new();
        let generator = ProjectJobGenerator::new(project(&["t1", "t2", "t3"]).job);
        let count = generator
            .create_job_with_tasks(as_client(&client), submission(OsFamily::Linux))
            .await
            .unwrap();
        assert_eq!(count, 3);
        let state = client.get();
        assert_eq!(state.created_jobs[0].id, JOB_ID);
        assert_eq!(state.added_tasks[0].0, JOB_ID);
        assert_eq!(state.added_tasks[0].1.len(), 3);
    }
}
