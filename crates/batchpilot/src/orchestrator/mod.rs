pub mod cleanup;
pub mod completion;
pub mod config;
pub mod jobgen;
pub mod poll;
pub mod provision;
pub mod readiness;
pub mod resources;
pub mod retrieval;
pub mod run;
pub mod sampler;
pub mod state;

pub use run::{Orchestrator, RunOptions, create_job_id};
