//! buildwatch Core Library
//!
//! Status resolution, failure attribution and build inspection on top of
//! `buildwatch-client`.
//!
//! - `StatusResolver`: status records with a process-wide cache of finished builds
//! - `CausalWalker`: who is behind a failing streak, across upstream triggers
//! - `tail_lines`: last lines of a console log within a fixed byte window
//! - `failed_tests`: failing cases of a build's test report
//! - `Monitor`: the request/response surface used by the CLI dashboard

pub mod causes;
pub mod failed_tests;
pub mod log_tail;
pub mod metrics;
pub mod mock;
pub mod monitor;
pub mod obs;
pub mod resolver;
pub mod telemetry;

pub use causes::{CausalWalker, StopReason, WalkReport, STEP_BUDGET};
pub use failed_tests::{failed_tests, filter_failed};
pub use log_tail::{clean_line, parse_tail, tail_lines, LOG_WINDOW_BYTES};
pub use mock::RandomMonitor;
pub use monitor::{Monitor, TrackerMonitor};
pub use resolver::StatusResolver;

pub use metrics::METRICS;
pub use obs::{
    emit_log_tail_fetched, emit_upstream_skipped, emit_walk_aborted, emit_walk_finished,
    emit_walk_started, walk_span,
};
pub use telemetry::init_tracing;

/// buildwatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
