//! Randomised [`Monitor`] for exercising a dashboard without a tracker.
//!
//! Results have the right shapes (including empty culprit and cause lists)
//! but carry no causal meaning.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use buildwatch_client::{
    BuildRecord, BuildRef, BuildResult, Cause, Contributor, JobSummary, Result, TestCase,
    TestStatus,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::monitor::Monitor;

const MOCK_JOBS: usize = 12;
const MOCK_PEOPLE: &[&str] = &["milan", "fred", "johnny", "unknown"];
const MOCK_TESTS: &[&str] = &["test1", "test2", "test3", "test4"];
const MOCK_COLORS: &[&str] = &["blue", "red", "aborted"];
const MOCK_LOG: &[&str] = &["line1", "line2", "line3"];

pub struct RandomMonitor {
    rng: Mutex<StdRng>,
}

impl Default for RandomMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomMonitor {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pick<'a>(rng: &mut StdRng, from: &[&'a str]) -> &'a str {
        from.choose(rng).copied().unwrap_or_default()
    }

    fn random_jobs(&self) -> Vec<JobSummary> {
        let mut rng = self.rng();
        (0..MOCK_JOBS)
            .map(|i| JobSummary {
                name: format!("a_test_job_long_name{}", i),
                color: Self::pick(&mut rng, MOCK_COLORS).to_string(),
            })
            .collect()
    }

    fn random_record(&self, job: &str, build: &BuildRef) -> BuildRecord {
        let mut rng = self.rng();
        let building = rng.gen_bool(0.5);
        let result = if building {
            BuildResult::Running
        } else {
            *[BuildResult::Success, BuildResult::Failure, BuildResult::Aborted]
                .choose(&mut *rng)
                .unwrap_or(&BuildResult::Unknown)
        };
        let id = build
            .number()
            .unwrap_or_else(|| rng.gen_range(1..1000))
            .to_string();

        let mut record = BuildRecord::new(job, id, result);
        record.building = building;
        record.estimated_duration = rng.gen_range(0..300_000);
        record.timestamp = Utc::now().timestamp_millis() - rng.gen_range(0..300_000);
        for _ in 0..rng.gen_range(0..5) {
            record = record.with_culprit(Self::pick(&mut rng, MOCK_PEOPLE));
        }
        for _ in 0..rng.gen_range(0..5) {
            record = record.with_cause(Cause::User {
                user_id: Self::pick(&mut rng, MOCK_PEOPLE).to_string(),
            });
        }
        record
    }

    fn random_people(&self) -> BTreeSet<Contributor> {
        let mut rng = self.rng();
        (0..rng.gen_range(0..5))
            .map(|_| Contributor::new(Self::pick(&mut rng, MOCK_PEOPLE)))
            .collect()
    }

    fn random_failures(&self) -> Vec<TestCase> {
        let mut rng = self.rng();
        (0..rng.gen_range(0..5))
            .map(|_| TestCase {
                class_name: Self::pick(&mut rng, MOCK_TESTS).to_string(),
                name: Self::pick(&mut rng, MOCK_TESTS).to_string(),
                status: TestStatus::Failed,
                error_trace: String::new(),
            })
            .collect()
    }
}

#[async_trait]
impl Monitor for RandomMonitor {
    async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        Ok(self.random_jobs())
    }

    async fn status(&self, job: &str, build: &BuildRef) -> Result<Arc<BuildRecord>> {
        Ok(Arc::new(self.random_record(job, build)))
    }

    async fn compute_causes(&self, _job: &str, _build: &BuildRef) -> BTreeSet<Contributor> {
        self.random_people()
    }

    async fn tail_lines(&self, _job: &str, _build: &BuildRef, lines: usize) -> Result<Vec<String>> {
        let skip = MOCK_LOG.len().saturating_sub(lines);
        Ok(MOCK_LOG[skip..].iter().map(|l| l.to_string()).collect())
    }

    async fn failed_tests(&self, _job: &str, _build: &BuildRef) -> Result<Vec<TestCase>> {
        Ok(self.random_failures())
    }

    async fn trigger_build(&self, _job: &str) -> Result<()> {
        Ok(())
    }
}
