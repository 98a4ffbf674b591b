//! The request/response surface a dashboard talks to.
//!
//! [`TrackerMonitor`] wires the resolver, walker and log/test inspection over
//! one [`BuildTracker`]. [`crate::mock::RandomMonitor`] serves synthetic data
//! through the same trait.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use buildwatch_client::{
    BuildRecord, BuildRef, BuildTracker, Contributor, JobSummary, Result, TestCase,
};
use tracing::info;

use crate::causes::CausalWalker;
use crate::failed_tests::failed_tests;
use crate::log_tail::tail_lines;
use crate::resolver::StatusResolver;

/// Everything the dashboard asks of a build tracker.
#[async_trait]
pub trait Monitor: Send + Sync {
    async fn list_jobs(&self) -> Result<Vec<JobSummary>>;

    async fn status(&self, job: &str, build: &BuildRef) -> Result<Arc<BuildRecord>>;

    /// Contributors behind the failing streak ending at `build`. Best effort:
    /// never fails, may be empty.
    async fn compute_causes(&self, job: &str, build: &BuildRef) -> BTreeSet<Contributor>;

    async fn tail_lines(&self, job: &str, build: &BuildRef, lines: usize) -> Result<Vec<String>>;

    async fn failed_tests(&self, job: &str, build: &BuildRef) -> Result<Vec<TestCase>>;

    async fn trigger_build(&self, job: &str) -> Result<()>;
}

/// [`Monitor`] backed by a real (or fake) tracker.
pub struct TrackerMonitor {
    tracker: Arc<dyn BuildTracker>,
    resolver: Arc<StatusResolver>,
    walker: CausalWalker,
}

impl TrackerMonitor {
    pub fn new(tracker: Arc<dyn BuildTracker>) -> Self {
        let resolver = Arc::new(StatusResolver::new(tracker.clone()));
        let walker = CausalWalker::new(resolver.clone());
        Self {
            tracker,
            resolver,
            walker,
        }
    }

    pub fn resolver(&self) -> &Arc<StatusResolver> {
        &self.resolver
    }

    pub fn walker(&self) -> &CausalWalker {
        &self.walker
    }
}

#[async_trait]
impl Monitor for TrackerMonitor {
    async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        self.tracker.list_jobs().await
    }

    async fn status(&self, job: &str, build: &BuildRef) -> Result<Arc<BuildRecord>> {
        self.resolver.get(job, build).await
    }

    async fn compute_causes(&self, job: &str, build: &BuildRef) -> BTreeSet<Contributor> {
        self.walker.compute_causes(job, build).await
    }

    async fn tail_lines(&self, job: &str, build: &BuildRef, lines: usize) -> Result<Vec<String>> {
        tail_lines(self.tracker.as_ref(), job, build, lines).await
    }

    async fn failed_tests(&self, job: &str, build: &BuildRef) -> Result<Vec<TestCase>> {
        failed_tests(self.tracker.as_ref(), job, build).await
    }

    async fn trigger_build(&self, job: &str) -> Result<()> {
        self.tracker.trigger_build(job).await?;
        info!(event = "build.triggered", job = %job);
        Ok(())
    }
}
