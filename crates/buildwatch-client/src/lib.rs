//! buildwatch-client: Build Tracker Transport for buildwatch
//!
//! This crate handles all I/O with the build tracker (a Jenkins-compatible
//! server) and decodes its payloads into buildwatch's data model.
//!
//! ## Layer 0 - Transport
//!
//! Focus: faithful decoding, explicit error kinds, no hidden caching.
//!
//! ## Key Components
//!
//! - `BuildTracker`: the endpoint seam (status, test report, console log, trigger)
//! - `HttpTracker`: `reqwest`-backed implementation
//! - `BuildRecord` / `Cause`: decoded status records with classified causes
//! - `fakes::MemoryTracker`: in-memory tracker for tests

pub mod config;
mod error;
pub mod fakes;
mod http;
pub mod model;
pub mod tracker;

pub use config::TrackerConfig;
pub use error::TrackerError;
pub use http::{HttpTracker, TEXT_SIZE_HEADER};
pub use model::{
    Action, BuildRecord, BuildResult, Cause, ChangeSet, ChangeSetItem, Contributor, JobHealth,
    JobSummary, TestCase, TestReport, TestStatus,
};
pub use tracker::{check_job_name, BuildRef, BuildTracker};

/// Result type for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;
