use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::common::error::BatchError;
use crate::common::utils::time::parse_human_time;
use crate::remote::azcli::BatchAccount;
use crate::storage::StorageAccount;

// Common CLI options
#[derive(Parser)]
pub struct CommonOpts {
    /// Enables more detailed log output
    #[arg(
        long,
        env = "BATCHPILOT_DEBUG",
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub debug: bool,
}

// Root CLI options
#[derive(Parser)]
#[command(
    author,
    about,
    version(crate::BATCHPILOT_VERSION),
    disable_help_subcommand(true),
    help_expected(true)
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[allow(clippy::large_enum_variant)]
#[derive(Parser)]
pub enum SubCommand {
    /// Provision a pool, run the tasks of a project on it and clean up afterwards
    Run(RunOpts),
    /// Check that the Batch account can be accessed with the given credentials
    Validate(ValidateOpts),
    /// Delete jobs (and their pools) left behind by an interrupted run
    Cleanup(CleanupOpts),
}

#[derive(Parser)]
pub struct BatchAccountOpts {
    /// Name of the Batch account
    #[arg(long, env = "BATCH_ACCOUNT_NAME")]
    pub batch_account: String,

    /// Access key of the Batch account
    #[arg(long, env = "BATCH_ACCOUNT_KEY", hide_env_values = true)]
    pub batch_account_key: String,

    /// Endpoint of the Batch account (e.g. `https://<account>.<region>.batch.azure.com`)
    #[arg(long, env = "BATCH_ACCOUNT_ENDPOINT")]
    pub batch_endpoint: String,
}

impl BatchAccountOpts {
    pub fn into_account(self) -> BatchAccount {
        BatchAccount {
            name: self.batch_account,
            key: self.batch_account_key,
            endpoint: self.batch_endpoint,
        }
    }
}

#[derive(Parser)]
pub struct StorageAccountOpts {
    /// Name of the storage account used for uploading resources
    #[arg(long, env = "STORAGE_ACCOUNT_NAME")]
    pub storage_account: Option<String>,

    /// Access key of the storage account
    #[arg(long, env = "STORAGE_ACCOUNT_KEY", hide_env_values = true)]
    pub storage_account_key: Option<String>,
}

impl StorageAccountOpts {
    pub fn into_account(self) -> crate::Result<Option<StorageAccount>> {
        match (self.storage_account, self.storage_account_key) {
            (Some(name), Some(key)) => Ok(Some(StorageAccount { name, key })),
            (None, None) => Ok(None),
            _ => Err(BatchError::ConfigurationError(
                "Both the storage account name and key have to be provided".to_string(),
            )),
        }
    }
}

#[derive(Parser)]
pub struct RunOpts {
    /// Path to the project file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub project: PathBuf,

    /// Directory where outputs of the run are stored [default: current directory]
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    pub work_dir: Option<PathBuf>,

    /// Tag included in the names of the created jobs
    #[arg(long, default_value = "run")]
    pub tag: String,

    /// Maximum lifetime of the pool (e.g. `3h`)
    #[arg(long, default_value = "3h", value_parser = parse_human_time)]
    pub pool_lifetime: Duration,

    /// Periodically record node states of the pool into `vm-utilization.csv`
    #[arg(long)]
    pub sample_utilization: bool,

    #[clap(flatten)]
    pub batch: BatchAccountOpts,

    #[clap(flatten)]
    pub storage: StorageAccountOpts,
}

#[derive(Parser)]
pub struct ValidateOpts {
    #[clap(flatten)]
    pub batch: BatchAccountOpts,
}

#[derive(Parser)]
pub struct CleanupOpts {
    /// Ids of the jobs to delete
    #[arg(required = true)]
    pub job_ids: Vec<String>,

    #[clap(flatten)]
    pub batch: BatchAccountOpts,
}
