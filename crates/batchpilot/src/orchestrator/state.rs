use std::collections::HashSet;
use std::path::PathBuf;

use crate::orchestrator::config::JOB_PREPARATION_TAG;
use crate::remote::model::{JobId, OsFamily};

/// Identifiers (task ids and job preparation keys) whose logs have already been looked at.
/// Only grows during a run.
#[derive(Debug, Default)]
pub struct RetrievedSet {
    ids: HashSet<String>,
}

impl RetrievedSet {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns true if the id was not present before.
    pub fn mark(&mut self, id: String) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Key of the job preparation task of a node. Cannot collide with task ids, because
/// those cannot contain `/`.
pub fn job_preparation_key(pool_id: &str, node_id: &str) -> String {
    format!("{pool_id}/{node_id}/{JOB_PREPARATION_TAG}")
}

/// State of a single orchestration run.
#[derive(Debug)]
pub struct RunState {
    pub pool_job_id: JobId,
    pub job_id: JobId,
    pub output_dir: PathBuf,
    /// Known once the pool job has been created.
    pub os_family: OsFamily,
    pub retrieved: RetrievedSet,
}

impl RunState {
    pub fn new(pool_job_id: JobId, job_id: JobId, output_dir: PathBuf) -> Self {
        Self {
            pool_job_id,
            job_id,
            output_dir,
            os_family: OsFamily::Windows,
            retrieved: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::orchestrator::state::{RetrievedSet, job_preparation_key};

    #[test]
    fn mark_once() {
        let mut set = RetrievedSet::default();
        assert!(set.is_empty());
        assert!(set.mark("t1".to_string()));
        assert!(!set.mark("t1".to_string()));
        assert!(set.contains("t1"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn preparation_key_is_distinct_from_task() {
        let mut set = RetrievedSet::default();
        set.mark("tvm-1".to_string());
        let key = job_preparation_key("p1", "tvm-1");
        assert_eq!(key, "p1/tvm-1/jobpreparation");
        assert!(!set.contains(&key));
    }
}
