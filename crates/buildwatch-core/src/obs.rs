//! Structured observability hooks for attribution walks and log inspection.
//!
//! Events carry an `event = "..."` field so they can be filtered in JSON
//! output (`buildwatch --json`).

use buildwatch_client::{BuildRef, TrackerError};
use tracing::{info, warn};

use crate::causes::WalkReport;

/// Span covering one attribution walk.
///
/// Attach it with `tracing::Instrument::instrument` so it stays correct
/// across `.await` points.
pub fn walk_span(job: &str, start: &BuildRef) -> tracing::Span {
    tracing::info_span!("buildwatch.walk", job = %job, start = %start)
}

pub fn emit_walk_started(job: &str, start: &BuildRef, budget: u32) {
    info!(event = "walk.started", job = %job, start = %start, budget = budget);
}

/// Emit event: walk finished, with its stop reason and cost.
pub fn emit_walk_finished(job: &str, report: &WalkReport) {
    info!(
        event = "walk.finished",
        job = %job,
        contributors = report.contributors.len(),
        builds_visited = report.builds_visited,
        gaps_skipped = report.gaps_skipped,
        stop = ?report.stop,
    );
}

/// Emit event: the walk hit an error it does not recover from (warning level).
pub fn emit_walk_aborted(job: &str, build: u64, error: &TrackerError) {
    warn!(event = "walk.aborted", job = %job, build = build, error = %error);
}

/// Emit event: an upstream build could not be resolved and was ignored.
pub fn emit_upstream_skipped(project: &str, build: u64, error: &TrackerError) {
    warn!(event = "upstream.skipped", project = %project, build = build, error = %error);
}

pub fn emit_log_tail_fetched(job: &str, build: &BuildRef, total_bytes: u64, lines: usize) {
    info!(
        event = "log.tail_fetched",
        job = %job,
        build = %build,
        total_bytes = total_bytes,
        lines = lines,
    );
}
