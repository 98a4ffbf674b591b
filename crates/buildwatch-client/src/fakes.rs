//! In-memory fake tracker (testing only)
//!
//! `MemoryTracker` serves canned builds, reports and console logs and records
//! every call so tests can assert how many round trips an operation made.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::TrackerError;
use crate::model::{BuildRecord, JobSummary, TestReport};
use crate::tracker::{check_job_name, BuildRef, BuildTracker};
use crate::Result;

/// One recorded call against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    ListJobs,
    Status { job: String, build: BuildRef },
    TestReport { job: String, build: BuildRef },
    ConsoleSize { job: String, build: BuildRef },
    ConsoleFrom { job: String, build: BuildRef, offset: u64 },
    Trigger { job: String },
}

type Key = (String, String);

fn key(job: &str, build: &BuildRef) -> Key {
    (job.to_string(), build.to_string())
}

/// In-memory tracker backed by `HashMap`s keyed by `(job, build)`.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    jobs: Mutex<Vec<JobSummary>>,
    builds: Mutex<HashMap<Key, BuildRecord>>,
    aliases: Mutex<HashMap<Key, u64>>,
    status_errors: Mutex<HashMap<Key, TrackerError>>,
    reports: Mutex<HashMap<Key, TestReport>>,
    logs: Mutex<HashMap<Key, Vec<u8>>>,
    console_size_error: Mutex<Option<TrackerError>>,
    console_fetch_error: Mutex<Option<TrackerError>>,
    trigger_error: Mutex<Option<TrackerError>>,
    calls: Mutex<Vec<TrackerCall>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&self, name: &str, color: &str) {
        self.jobs.lock().unwrap().push(JobSummary {
            name: name.to_string(),
            color: color.to_string(),
        });
    }

    /// Store a build under its own job and id.
    pub fn insert_build(&self, record: BuildRecord) {
        let k = (record.job.clone(), record.id.clone());
        self.builds.lock().unwrap().insert(k, record);
    }

    /// Point an alias (`Latest`, `LatestCompleted`, ...) at a build number.
    pub fn set_alias(&self, job: &str, alias: BuildRef, number: u64) {
        self.aliases
            .lock()
            .unwrap()
            .insert(key(job, &alias), number);
    }

    /// Make status fetches of one build fail with `err`.
    pub fn fail_status(&self, job: &str, build: impl Into<BuildRef>, err: TrackerError) {
        self.status_errors
            .lock()
            .unwrap()
            .insert(key(job, &build.into()), err);
    }

    pub fn insert_test_report(&self, job: &str, build: impl Into<BuildRef>, report: TestReport) {
        self.reports
            .lock()
            .unwrap()
            .insert(key(job, &build.into()), report);
    }

    pub fn insert_log(&self, job: &str, build: impl Into<BuildRef>, text: impl AsRef<[u8]>) {
        self.logs
            .lock()
            .unwrap()
            .insert(key(job, &build.into()), text.as_ref().to_vec());
    }

    pub fn fail_console_size(&self, err: TrackerError) {
        *self.console_size_error.lock().unwrap() = Some(err);
    }

    pub fn fail_console_fetch(&self, err: TrackerError) {
        *self.console_fetch_error.lock().unwrap() = Some(err);
    }

    pub fn fail_trigger(&self, err: TrackerError) {
        *self.trigger_error.lock().unwrap() = Some(err);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<TrackerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of status fetches for `job`.
    pub fn status_fetches(&self, job: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, TrackerCall::Status { job: j, .. } if j == job))
            .count()
    }

    /// Number of status fetches across all jobs.
    pub fn total_status_fetches(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, TrackerCall::Status { .. }))
            .count()
    }

    /// Offsets requested by console content fetches.
    pub fn console_offsets(&self) -> Vec<u64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                TrackerCall::ConsoleFrom { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TrackerCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn resolve(&self, job: &str, build: &BuildRef) -> Key {
        match self.aliases.lock().unwrap().get(&key(job, build)) {
            Some(n) => (job.to_string(), n.to_string()),
            None => key(job, build),
        }
    }

    fn not_found(job: &str, build: &BuildRef) -> TrackerError {
        TrackerError::NotFound {
            job: job.to_string(),
            build: build.to_string(),
        }
    }
}

#[async_trait]
impl BuildTracker for MemoryTracker {
    async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        self.record(TrackerCall::ListJobs);
        Ok(self.jobs.lock().unwrap().clone())
    }

    async fn build_status(&self, job: &str, build: &BuildRef) -> Result<BuildRecord> {
        check_job_name(job)?;
        self.record(TrackerCall::Status {
            job: job.to_string(),
            build: build.clone(),
        });
        if let Some(err) = self.status_errors.lock().unwrap().get(&key(job, build)) {
            return Err(err.clone());
        }
        let k = self.resolve(job, build);
        self.builds
            .lock()
            .unwrap()
            .get(&k)
            .cloned()
            .ok_or_else(|| Self::not_found(job, build))
    }

    async fn test_report(&self, job: &str, build: &BuildRef) -> Result<TestReport> {
        self.record(TrackerCall::TestReport {
            job: job.to_string(),
            build: build.clone(),
        });
        let k = self.resolve(job, build);
        self.reports
            .lock()
            .unwrap()
            .get(&k)
            .cloned()
            .ok_or_else(|| TrackerError::NoTestReport {
                job: job.to_string(),
                build: build.to_string(),
            })
    }

    async fn console_size(&self, job: &str, build: &BuildRef) -> Result<u64> {
        self.record(TrackerCall::ConsoleSize {
            job: job.to_string(),
            build: build.clone(),
        });
        if let Some(err) = self.console_size_error.lock().unwrap().clone() {
            return Err(err);
        }
        let k = self.resolve(job, build);
        self.logs
            .lock()
            .unwrap()
            .get(&k)
            .map(|log| log.len() as u64)
            .ok_or_else(|| TrackerError::LogSizeUnavailable("status 404".to_string()))
    }

    async fn console_from(&self, job: &str, build: &BuildRef, offset: u64) -> Result<Vec<u8>> {
        self.record(TrackerCall::ConsoleFrom {
            job: job.to_string(),
            build: build.clone(),
            offset,
        });
        if let Some(err) = self.console_fetch_error.lock().unwrap().clone() {
            return Err(err);
        }
        let k = self.resolve(job, build);
        let logs = self.logs.lock().unwrap();
        let log = logs
            .get(&k)
            .ok_or(TrackerError::LogFetchFailed { status: 404 })?;
        let start = (offset as usize).min(log.len());
        Ok(log[start..].to_vec())
    }

    async fn trigger_build(&self, job: &str) -> Result<()> {
        check_job_name(job)?;
        self.record(TrackerCall::Trigger {
            job: job.to_string(),
        });
        match self.trigger_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
