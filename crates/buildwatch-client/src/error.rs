//! Error types for buildwatch-client

use thiserror::Error;

/// Errors that can occur while talking to the build tracker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The tracker has no such build (purged, or never existed)
    #[error("Build not found: {job}#{build}")]
    NotFound { job: String, build: String },

    /// Folder-style job hierarchies are not supported
    #[error("Job name not supported (folder-style jobs are not handled): {job}")]
    NotSupported { job: String },

    /// Connectivity or HTTP status failure below service semantics
    #[error("Transport error: {0}")]
    Transport(String),

    /// Payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The console log size probe failed
    #[error("Could not determine console log size: {0}")]
    LogSizeUnavailable(String),

    /// The console log content fetch returned a non-success status
    #[error("Console log fetch failed with status {status}")]
    LogFetchFailed { status: u16 },

    /// The build has no test report
    #[error("No test report found for {job}#{build}")]
    NoTestReport { job: String, build: String },

    /// Triggering a build was refused
    #[error("Could not run job {job}: status {status}")]
    RunFailed { job: String, status: u16 },

    /// Tracker configuration is unusable
    #[error("Invalid tracker configuration: {0}")]
    InvalidConfig(String),
}

impl TrackerError {
    /// True for "no such build", the only error the history walk recovers from.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::NotFound { .. })
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TrackerError::Decode(err.to_string())
        } else {
            TrackerError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Decode(err.to_string())
    }
}
