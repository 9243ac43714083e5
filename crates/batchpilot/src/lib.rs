#![deny(clippy::await_holding_refcell_ref)]

pub mod common;
pub mod orchestrator;
pub mod project;
pub mod remote;
pub mod storage;

#[cfg(test)]
pub(crate) mod tests;

pub type Error = crate::common::error::BatchError;
pub type Result<T> = std::result::Result<T, Error>;

pub const BATCHPILOT_VERSION: &str = env!("CARGO_PKG_VERSION");
