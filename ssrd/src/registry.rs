//! In-memory scan job table.
//!
//! The registry owns every job for the lifetime of the process; there
//! is no eviction. Readers only ever receive copied snapshots, and
//! writers mutate in place under a short-lived exclusive lock that is
//! never held across an await or a process read.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use thiserror::Error;

use ssr_common::util::{project_key_from_repo, sanitize_component};
use ssr_common::{ScanId, ScanSnapshot, ScanState};

/// One tracked scan attempt.
///
/// Mutated exclusively by the executor task that owns the scan;
/// everything else sees snapshots.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub id: ScanId,
    pub repository: String,
    pub branch: String,
    pub version: String,
    pub state: ScanState,
    pub output: Vec<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub exit_code: Option<i32>,
}

impl ScanJob {
    /// A freshly submitted job, not yet picked up by its task.
    pub fn new(id: ScanId, repository: String, branch: String, version: String) -> Self {
        Self {
            id,
            repository,
            branch,
            version,
            state: ScanState::Queued,
            output: Vec::new(),
            start_time: None,
            end_time: None,
            exit_code: None,
        }
    }

    fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            id: self.id.clone(),
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            version: self.version.clone(),
            state: self.state,
            output: self.output.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
            exit_code: self.exit_code,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// An id was registered twice. Ids carry a monotonic counter, so
    /// this indicates a bug; it is rejected rather than overwritten.
    #[error("scan id already registered: {0}")]
    DuplicateId(ScanId),
}

/// Thread-safe mapping from scan id to job, shared by all requests.
pub struct ScanRegistry {
    jobs: RwLock<HashMap<ScanId, ScanJob>>,
    seq: AtomicU64,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(1),
        }
    }

    /// Generate the id for a new submission.
    ///
    /// `<repo-base>_<branch>_<millis>_<seq>`: the wall-clock stamp keeps
    /// ids readable, the process-wide counter makes concurrent
    /// submissions for the same repository and branch collision-free.
    pub fn allocate_id(&self, repository: &str, branch: &str) -> ScanId {
        let repo = sanitize_component(&project_key_from_repo(repository));
        let branch = sanitize_component(branch);
        let millis = Utc::now().timestamp_millis();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        ScanId::new(format!("{repo}_{branch}_{millis}_{seq}"))
    }

    /// Insert a new job, rejecting duplicates instead of overwriting.
    pub fn register(&self, job: ScanJob) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        match jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateId(job.id)),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    /// Apply `f` to the job under exclusive access.
    ///
    /// Returns false when the id is unknown.
    pub fn update(&self, id: &ScanId, f: impl FnOnce(&mut ScanJob)) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        match jobs.get_mut(id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    /// Append one line to the job's output log.
    pub fn append_output(&self, id: &ScanId, line: impl Into<String>) -> bool {
        self.update(id, |job| job.output.push(line.into()))
    }

    /// Flip the job to running and stamp its start time.
    pub fn mark_running(&self, id: &ScanId) -> bool {
        self.update(id, |job| {
            job.state = ScanState::Running;
            job.start_time = Some(Utc::now().to_rfc3339());
        })
    }

    /// Transition into a terminal state. The end time is stamped here
    /// and nowhere else.
    pub fn finish(&self, id: &ScanId, state: ScanState, exit_code: Option<i32>) -> bool {
        debug_assert!(state.is_terminal());
        self.update(id, |job| {
            job.state = state;
            job.exit_code = exit_code;
            job.end_time = Some(Utc::now().to_rfc3339());
        })
    }

    /// Copy-out view of one job, consistent even mid-run.
    pub fn snapshot(&self, id: &ScanId) -> Option<ScanSnapshot> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(id).map(ScanJob::snapshot)
    }

    /// Number of tracked jobs, in any state.
    pub fn count(&self) -> usize {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.len()
    }
}

impl Default for ScanRegistry {
    fn default() -> Self {
        Self::new()
    }
}
