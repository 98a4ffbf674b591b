//! Transport seam between buildwatch and a build tracker.
//!
//! `BuildTracker` models only the endpoints buildwatch needs: the job
//! catalog, build status, test reports, the console log and triggering.
//! `HttpTracker` talks to a real server; `fakes::MemoryTracker` serves
//! canned data for tests.

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::error::TrackerError;
use crate::model::{BuildRecord, JobSummary, TestReport};
use crate::Result;

/// Tracker permalink for the most recent build, finished or not.
pub const LAST_BUILD: &str = "lastBuild";
/// Tracker permalink for the most recent finished build.
pub const LAST_COMPLETED_BUILD: &str = "lastCompletedBuild";
/// Tracker permalink for the most recent failed build.
pub const LAST_FAILED_BUILD: &str = "lastFailedBuild";

/// Reference to one build of a job: a concrete number or a moving alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuildRef {
    Number(u64),
    Latest,
    LatestCompleted,
    LastFailed,
    /// Anything else; passed through to the tracker verbatim.
    Other(String),
}

impl BuildRef {
    /// Parse user or tracker text. Never fails; unknown text becomes `Other`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Ok(n) = s.parse::<u64>() {
            return BuildRef::Number(n);
        }
        match s {
            "latest" | LAST_BUILD => BuildRef::Latest,
            "latest-completed" | LAST_COMPLETED_BUILD => BuildRef::LatestCompleted,
            "last-failed" | LAST_FAILED_BUILD => BuildRef::LastFailed,
            other => BuildRef::Other(other.to_string()),
        }
    }

    pub fn number(&self) -> Option<u64> {
        match self {
            BuildRef::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Aliases track whichever build currently matches them.
    pub fn is_alias(&self) -> bool {
        matches!(
            self,
            BuildRef::Latest | BuildRef::LatestCompleted | BuildRef::LastFailed
        )
    }

    /// Path segment used in tracker URLs.
    pub fn path_segment(&self) -> Cow<'_, str> {
        match self {
            BuildRef::Number(n) => Cow::Owned(n.to_string()),
            BuildRef::Latest => Cow::Borrowed(LAST_BUILD),
            BuildRef::LatestCompleted => Cow::Borrowed(LAST_COMPLETED_BUILD),
            BuildRef::LastFailed => Cow::Borrowed(LAST_FAILED_BUILD),
            BuildRef::Other(s) => Cow::Borrowed(s),
        }
    }
}

impl fmt::Display for BuildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_segment())
    }
}

impl FromStr for BuildRef {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(BuildRef::parse(s))
    }
}

impl From<u64> for BuildRef {
    fn from(n: u64) -> Self {
        BuildRef::Number(n)
    }
}

impl From<&str> for BuildRef {
    fn from(s: &str) -> Self {
        BuildRef::parse(s)
    }
}

/// Reject folder-style job names (`team/project`).
pub fn check_job_name(job: &str) -> Result<()> {
    if job.contains('/') || job.contains('\\') {
        return Err(TrackerError::NotSupported {
            job: job.to_string(),
        });
    }
    Ok(())
}

/// The build tracker endpoints buildwatch relies on.
///
/// Implementations do not cache and do not retry.
#[async_trait]
pub trait BuildTracker: Send + Sync {
    /// All jobs known to the tracker with their catalog color.
    async fn list_jobs(&self) -> Result<Vec<JobSummary>>;

    /// Status record of one build. A missing build is `TrackerError::NotFound`.
    async fn build_status(&self, job: &str, build: &BuildRef) -> Result<BuildRecord>;

    /// Test report of one build. A missing report is `TrackerError::NoTestReport`.
    async fn test_report(&self, job: &str, build: &BuildRef) -> Result<TestReport>;

    /// Total console log length in bytes.
    async fn console_size(&self, job: &str, build: &BuildRef) -> Result<u64>;

    /// Raw console log bytes from `offset` to the end.
    async fn console_from(&self, job: &str, build: &BuildRef, offset: u64) -> Result<Vec<u8>>;

    /// Start a parameterless build of `job`.
    async fn trigger_build(&self, job: &str) -> Result<()>;
}
