//! Build tracker data model.
//!
//! The public types are what the rest of buildwatch works with. The tracker's
//! JSON payloads are decoded through the private `wire` structs, which accept
//! missing, `null` or partially populated fields and collapse them into
//! zero values instead of failing the whole record.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

// ---------------------------------------------------------------------------
// Contributors
// ---------------------------------------------------------------------------

/// A person associated with a build, identified by display name.
///
/// Equality is exact string match on the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Contributor(String);

impl Contributor {
    pub fn new(name: impl Into<String>) -> Self {
        Contributor(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the tracker gave no usable name.
    pub fn is_anonymous(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Contributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Contributor {
    fn from(name: &str) -> Self {
        Contributor::new(name)
    }
}

// ---------------------------------------------------------------------------
// Build records
// ---------------------------------------------------------------------------

/// Outcome of a build as reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Failure,
    Unstable,
    Aborted,
    Fixed,
    Unknown,
    Running,
}

impl BuildResult {
    fn from_wire(result: Option<&str>, building: bool) -> Self {
        match result {
            Some("SUCCESS") => BuildResult::Success,
            Some("FAILURE") => BuildResult::Failure,
            Some("UNSTABLE") => BuildResult::Unstable,
            Some("ABORTED") => BuildResult::Aborted,
            Some("FIXED") => BuildResult::Fixed,
            None | Some("") if building => BuildResult::Running,
            _ => BuildResult::Unknown,
        }
    }

    /// A passing build ends a failure streak.
    pub fn closes_streak(self) -> bool {
        matches!(self, BuildResult::Success | BuildResult::Fixed)
    }

    /// Once a build is no longer running its record never changes.
    pub fn is_final(self) -> bool {
        self != BuildResult::Running
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Failure => "FAILURE",
            BuildResult::Unstable => "UNSTABLE",
            BuildResult::Aborted => "ABORTED",
            BuildResult::Fixed => "FIXED",
            BuildResult::Unknown => "UNKNOWN",
            BuildResult::Running => "RUNNING",
        };
        f.write_str(s)
    }
}

/// Why a build was started.
///
/// Classification from the wire record is first-match-wins in declaration
/// order: user, upstream, SCM change, commit notification, anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    User { user_id: String },
    Upstream { project: String, build: u64 },
    ScmChange,
    CommitNotification,
    Unclassified { description: String },
}

const SCM_CHANGE_DESCRIPTION: &str = "Started by an SCM change";
const COMMIT_NOTIFICATION_PREFIX: &str = "commit notification";

impl Cause {
    fn classify(raw: wire::Cause) -> Self {
        let user_id = raw.user_id.unwrap_or_default();
        let project = raw.upstream_project.unwrap_or_default();
        let upstream_build = raw.upstream_build.unwrap_or_default();
        let description = raw.short_description.unwrap_or_default();

        if !user_id.is_empty() {
            Cause::User { user_id }
        } else if upstream_build != 0 && !project.is_empty() {
            Cause::Upstream {
                project,
                build: upstream_build,
            }
        } else if description == SCM_CHANGE_DESCRIPTION {
            Cause::ScmChange
        } else if description.starts_with(COMMIT_NOTIFICATION_PREFIX) {
            Cause::CommitNotification
        } else {
            Cause::Unclassified { description }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Action {
    pub causes: Vec<Cause>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSetItem {
    pub author: Contributor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub items: Vec<ChangeSetItem>,
}

/// Status record of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub job: String,
    /// Build id as reported by the tracker (numeric for real builds)
    pub id: String,
    pub result: BuildResult,
    /// Start time, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Estimated duration in milliseconds
    pub estimated_duration: i64,
    pub building: bool,
    pub culprits: Vec<Contributor>,
    pub actions: Vec<Action>,
    pub change_sets: Vec<ChangeSet>,
}

impl BuildRecord {
    /// An otherwise empty record, for fakes and synthetic data.
    pub fn new(job: impl Into<String>, id: impl Into<String>, result: BuildResult) -> Self {
        BuildRecord {
            job: job.into(),
            id: id.into(),
            result,
            timestamp: 0,
            estimated_duration: 0,
            building: result == BuildResult::Running,
            culprits: Vec::new(),
            actions: Vec::new(),
            change_sets: Vec::new(),
        }
    }

    pub fn with_culprit(mut self, name: impl Into<String>) -> Self {
        self.culprits.push(Contributor::new(name));
        self
    }

    pub fn with_change_author(mut self, name: impl Into<String>) -> Self {
        self.change_sets.push(ChangeSet {
            items: vec![ChangeSetItem {
                author: Contributor::new(name),
            }],
        });
        self
    }

    /// Append `cause` as its own action.
    pub fn with_cause(mut self, cause: Cause) -> Self {
        self.actions.push(Action {
            causes: vec![cause],
        });
        self
    }

    /// Decode a status payload for `job`.
    pub fn from_json(job: &str, body: &[u8]) -> Result<Self> {
        let raw: wire::BuildRecord = serde_json::from_slice(body)?;
        Ok(Self::from_wire(job, raw))
    }

    fn from_wire(job: &str, raw: wire::BuildRecord) -> Self {
        let result = BuildResult::from_wire(raw.result.as_deref(), raw.building);
        BuildRecord {
            job: job.to_string(),
            id: raw.id,
            result,
            timestamp: raw.timestamp,
            estimated_duration: raw.estimated_duration,
            building: raw.building,
            culprits: raw.culprits.into_iter().map(Contributor::from).collect(),
            actions: raw
                .actions
                .into_iter()
                .map(|a| Action {
                    causes: a.causes.into_iter().map(Cause::classify).collect(),
                })
                .collect(),
            change_sets: raw
                .change_sets
                .into_iter()
                .map(|cs| ChangeSet {
                    items: cs
                        .items
                        .into_iter()
                        .map(|item| ChangeSetItem {
                            author: item.author.into(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Numeric build id, if the tracker reported one.
    pub fn number(&self) -> Option<u64> {
        self.id.parse().ok()
    }

    /// Authors of every change set item, in record order.
    pub fn change_set_authors(&self) -> impl Iterator<Item = &Contributor> {
        self.change_sets
            .iter()
            .flat_map(|cs| cs.items.iter().map(|item| &item.author))
    }

    /// All causes of all actions, in record order.
    pub fn causes(&self) -> impl Iterator<Item = &Cause> {
        self.actions.iter().flat_map(|a| a.causes.iter())
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    pub fn estimated_end(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .checked_add(self.estimated_duration)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

// ---------------------------------------------------------------------------
// Test reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Fixed,
    Regression,
    Other(String),
}

impl TestStatus {
    fn from_wire(status: &str) -> Self {
        match status {
            "PASSED" => TestStatus::Passed,
            "FAILED" => TestStatus::Failed,
            "SKIPPED" => TestStatus::Skipped,
            "FIXED" => TestStatus::Fixed,
            "REGRESSION" => TestStatus::Regression,
            other => TestStatus::Other(other.to_string()),
        }
    }

    /// Everything except passed, skipped and fixed counts as failing.
    pub fn is_failing(&self) -> bool {
        !matches!(
            self,
            TestStatus::Passed | TestStatus::Skipped | TestStatus::Fixed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub class_name: String,
    pub name: String,
    pub status: TestStatus,
    pub error_trace: String,
}

/// Test cases of one build, flattened across suites in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    pub cases: Vec<TestCase>,
}

impl TestReport {
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let raw: wire::TestReport = serde_json::from_slice(body)?;
        let cases = raw
            .suites
            .into_iter()
            .flat_map(|suite| suite.cases)
            .map(|c| TestCase {
                class_name: c.class_name,
                name: c.name,
                status: TestStatus::from_wire(&c.status),
                error_trace: c.error_stack_trace,
            })
            .collect();
        Ok(TestReport { cases })
    }
}

// ---------------------------------------------------------------------------
// Job catalog
// ---------------------------------------------------------------------------

/// Health derived from a job's catalog color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobHealth {
    Healthy,
    Failing,
    Unstable,
    Aborted,
    Building,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub name: String,
    #[serde(default)]
    pub color: String,
}

impl JobSummary {
    pub fn health(&self) -> JobHealth {
        if self.color.ends_with("_anime") {
            return JobHealth::Building;
        }
        match self.color.as_str() {
            "blue" | "green" => JobHealth::Healthy,
            "red" => JobHealth::Failing,
            "yellow" => JobHealth::Unstable,
            "aborted" => JobHealth::Aborted,
            _ => JobHealth::Unknown,
        }
    }
}

/// Decode the job catalog payload (`{"jobs": [{name, color}, ...]}`).
pub fn decode_job_catalog(body: &[u8]) -> Result<Vec<JobSummary>> {
    let catalog: wire::JobCatalog = serde_json::from_slice(body)?;
    Ok(catalog.jobs)
}

impl From<wire::Person> for Contributor {
    fn from(p: wire::Person) -> Self {
        Contributor(p.full_name)
    }
}

mod wire {
    use serde::{Deserialize, Deserializer};

    use super::JobSummary;

    /// `null` decodes like a missing field.
    fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Person {
        #[serde(rename = "fullName", default, deserialize_with = "null_default")]
        pub full_name: String,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Cause {
        #[serde(default)]
        pub user_id: Option<String>,
        #[serde(default)]
        pub upstream_build: Option<u64>,
        #[serde(default)]
        pub upstream_project: Option<String>,
        #[serde(default)]
        pub short_description: Option<String>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Action {
        #[serde(default, deserialize_with = "null_default")]
        pub causes: Vec<Cause>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct ChangeSetItem {
        #[serde(default, deserialize_with = "null_default")]
        pub author: Person,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct ChangeSet {
        #[serde(default, deserialize_with = "null_default")]
        pub items: Vec<ChangeSetItem>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BuildRecord {
        #[serde(default, deserialize_with = "null_default")]
        pub id: String,
        #[serde(default)]
        pub result: Option<String>,
        #[serde(default, deserialize_with = "null_default")]
        pub timestamp: i64,
        #[serde(default, deserialize_with = "null_default")]
        pub estimated_duration: i64,
        #[serde(default, deserialize_with = "null_default")]
        pub building: bool,
        #[serde(default, deserialize_with = "null_default")]
        pub culprits: Vec<Person>,
        #[serde(default, deserialize_with = "null_default")]
        pub actions: Vec<Action>,
        #[serde(default, deserialize_with = "null_default")]
        pub change_sets: Vec<ChangeSet>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TestCase {
        #[serde(default, deserialize_with = "null_default")]
        pub class_name: String,
        #[serde(default, deserialize_with = "null_default")]
        pub name: String,
        #[serde(default, deserialize_with = "null_default")]
        pub status: String,
        #[serde(default, deserialize_with = "null_default")]
        pub error_stack_trace: String,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct TestSuite {
        #[serde(default, deserialize_with = "null_default")]
        pub cases: Vec<TestCase>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct TestReport {
        #[serde(default, deserialize_with = "null_default")]
        pub suites: Vec<TestSuite>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct JobCatalog {
        #[serde(default, deserialize_with = "null_default")]
        pub jobs: Vec<JobSummary>,
    }
}
