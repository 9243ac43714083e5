use std::rc::Rc;

use anyhow::Context;
use clap::Parser;
use tokio::task::LocalSet;

use batchpilot::common::cli::{CleanupOpts, RootOptions, RunOpts, SubCommand, ValidateOpts};
use batchpilot::common::error::BatchError;
use batchpilot::common::setup::setup_logging;
use batchpilot::common::utils::fs::absolute_path;
use batchpilot::orchestrator::cleanup::delete_job;
use batchpilot::orchestrator::config::VALIDATION_POOL_ID;
use batchpilot::orchestrator::jobgen::ProjectJobGenerator;
use batchpilot::orchestrator::{Orchestrator, RunOptions};
use batchpilot::project::ProjectConfig;
use batchpilot::remote::ComputeClient;
use batchpilot::remote::azcli::AzBatchClient;
use batchpilot::storage::{AzStorageClient, BlobStorage};

async fn command_run(opts: RunOpts) -> anyhow::Result<()> {
    let project = ProjectConfig::load(&opts.project)
        .with_context(|| format!("Cannot load project {}", opts.project.display()))?;
    let work_dir = absolute_path(opts.work_dir.unwrap_or_else(|| ".".into()))?;

    let client: Rc<dyn ComputeClient> = Rc::new(AzBatchClient::new(opts.batch.into_account()));
    let storage = opts
        .storage
        .into_account()?
        .map(|account| Rc::new(AzStorageClient::new(account)) as Rc<dyn BlobStorage>);
    let generator = Box::new(ProjectJobGenerator::new(project.job.clone()));

    let mut orchestrator = Orchestrator::new(
        client,
        storage,
        generator,
        project,
        RunOptions {
            work_dir,
            tag: opts.tag,
            pool_lifetime: opts.pool_lifetime,
            sample_utilization: opts.sample_utilization,
        },
    )?;

    let result = tokio::select! {
        result = orchestrator.run() => result,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted, cleaning up");
            Err(BatchError::Cancelled("interrupted by the user".to_string()))
        }
    };
    if let Err(error) = &result {
        log::error!("Run has failed: {error}");
    }
    let cleanup = orchestrator.finish().await;
    result?;
    cleanup?;
    log::info!("Run has finished successfully");
    Ok(())
}

async fn command_validate(opts: ValidateOpts) -> anyhow::Result<()> {
    let account = opts.batch.into_account();
    let name = account.name.clone();
    let client = AzBatchClient::new(account);
    client
        .pool_exists(VALIDATION_POOL_ID)
        .await
        .with_context(|| format!("Batch account {name} cannot be accessed"))?;
    log::info!("Batch account {name} is valid");
    Ok(())
}

async fn command_cleanup(opts: CleanupOpts) -> anyhow::Result<()> {
    let client = AzBatchClient::new(opts.batch.into_account());
    for job_id in &opts.job_ids {
        delete_job(&client, job_id).await?;
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> batchpilot::Result<()> {
    let top_opts = RootOptions::parse();
    setup_logging(top_opts.common.debug);

    let local_set = LocalSet::new();
    let result = local_set
        .run_until(async move {
            match top_opts.subcmd {
                SubCommand::Run(opts) => command_run(opts).await,
                SubCommand::Validate(opts) => command_validate(opts).await,
                SubCommand::Cleanup(opts) => command_cleanup(opts).await,
            }
        })
        .await;

    if let Err(e) = result {
        log::error!("{e:?}");
        std::process::exit(1);
    }

    Ok(())
}
