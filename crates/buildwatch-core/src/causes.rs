//! Causal attribution: who broke the build.
//!
//! Starting from a failing build, the walker steps backward through the job's
//! history until it meets a passing build, collecting everyone attached to the
//! failing streak: culprits, change set authors, the users who started the
//! builds, and (transitively) the people behind upstream builds that
//! triggered them.
//!
//! Two limits bound the cost of a walk:
//!
//! - a step budget on the backward scan of the job's own history, spent once
//!   per build the walk moves past, including builds that turn out to be
//!   purged;
//! - a visited set on upstream resolution, which is otherwise unbounded and
//!   may follow cyclic trigger configurations.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use buildwatch_client::{BuildRecord, BuildRef, Cause, Contributor};
use serde::Serialize;
use tracing::{debug, Instrument};

use crate::metrics::METRICS;
use crate::obs::{
    emit_upstream_skipped, emit_walk_aborted, emit_walk_finished, emit_walk_started, walk_span,
};
use crate::resolver::StatusResolver;

/// Steps a walk may spend moving back through history.
pub const STEP_BUDGET: u32 = 20;

/// Why a walk stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// A SUCCESS or FIXED build closed the failing streak.
    StreakClosed { build: u64 },
    BudgetExhausted,
    /// The start reference is not a build number or a known alias.
    Unparseable(String),
    /// The start alias did not point at a numbered build.
    AliasUnresolved,
    /// Walked past build #1.
    HistoryExhausted,
    /// A tracker error other than "not found"; the result is partial.
    Error(String),
}

/// Outcome of one walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkReport {
    pub contributors: BTreeSet<Contributor>,
    /// History fetches made, including the one that closed the streak.
    pub builds_visited: u32,
    /// Builds the tracker no longer has.
    pub gaps_skipped: u32,
    /// Failing builds whose people were merged.
    pub builds_attributed: u32,
    /// Steps left; gap skips and attributed builds each cost one.
    pub budget_remaining: u32,
    pub stop: StopReason,
}

/// Accumulated contributors plus the upstream builds already expanded.
#[derive(Debug, Default)]
struct Attribution {
    contributors: BTreeSet<Contributor>,
    visited_upstream: HashSet<(String, u64)>,
}

impl Attribution {
    fn add(&mut self, contributor: &Contributor) {
        if !contributor.is_anonymous() {
            self.contributors.insert(contributor.clone());
        }
    }

    fn add_culprits(&mut self, record: &BuildRecord) {
        for culprit in &record.culprits {
            self.add(culprit);
        }
    }

    fn add_change_authors(&mut self, record: &BuildRecord) {
        for author in record.change_set_authors() {
            self.add(author);
        }
    }

    /// Merge what each cause of `record` points at. Upstream builds not seen
    /// before are queued on `pending` rather than resolved here.
    fn classify(&mut self, record: &BuildRecord, pending: &mut Vec<(String, u64)>) {
        for cause in record.causes() {
            match cause {
                Cause::User { user_id } => self.add(&Contributor::new(user_id.as_str())),
                Cause::Upstream { project, build } => {
                    if self.visited_upstream.insert((project.clone(), *build)) {
                        pending.push((project.clone(), *build));
                    } else {
                        debug!("Upstream {}#{} already visited", project, build);
                    }
                }
                Cause::ScmChange => self.add_culprits(record),
                Cause::CommitNotification => self.add_change_authors(record),
                Cause::Unclassified { .. } => {}
            }
        }
    }
}

/// Backward history walker over a shared [`StatusResolver`].
pub struct CausalWalker {
    resolver: Arc<StatusResolver>,
    step_budget: u32,
}

impl CausalWalker {
    pub fn new(resolver: Arc<StatusResolver>) -> Self {
        Self {
            resolver,
            step_budget: STEP_BUDGET,
        }
    }

    pub fn with_step_budget(mut self, step_budget: u32) -> Self {
        self.step_budget = step_budget;
        self
    }

    /// Contributors responsible for the failing streak ending at `start`.
    ///
    /// Never fails: tracker errors end the walk early and whatever was
    /// collected up to that point is returned.
    pub async fn compute_causes(&self, job: &str, start: &BuildRef) -> BTreeSet<Contributor> {
        self.walk(job, start).await.contributors
    }

    /// Like [`compute_causes`](Self::compute_causes), with the walk's cost and
    /// stop reason.
    pub async fn walk(&self, job: &str, start: &BuildRef) -> WalkReport {
        let report = self
            .walk_inner(job, start)
            .instrument(walk_span(job, start))
            .await;
        METRICS.inc_walks();
        emit_walk_finished(job, &report);
        report
    }

    /// Culprits and classified causes of a single record, without walking
    /// history.
    pub async fn causes_of(&self, record: &BuildRecord) -> BTreeSet<Contributor> {
        let mut acc = Attribution::default();
        acc.add_culprits(record);
        self.attribute_causes(&mut acc, record).await;
        acc.contributors
    }

    async fn walk_inner(&self, job: &str, start: &BuildRef) -> WalkReport {
        emit_walk_started(job, start, self.step_budget);

        let mut acc = Attribution::default();
        let mut report = WalkReport {
            contributors: BTreeSet::new(),
            builds_visited: 0,
            gaps_skipped: 0,
            builds_attributed: 0,
            budget_remaining: self.step_budget,
            stop: StopReason::BudgetExhausted,
        };

        let mut current = match self.starting_number(job, start).await {
            Ok(n) => n,
            Err(stop) => {
                report.stop = stop;
                return report;
            }
        };

        report.stop = loop {
            if current == 0 {
                break StopReason::HistoryExhausted;
            }
            if report.budget_remaining == 0 {
                debug!("Maximum number of visits to the tracker reached for {}", job);
                break StopReason::BudgetExhausted;
            }
            report.budget_remaining -= 1;
            report.builds_visited += 1;

            let record = match self.resolver.get(job, &BuildRef::Number(current)).await {
                Ok(record) => record,
                Err(e) if e.is_not_found() => {
                    debug!("{}#{} is gone, skipping", job, current);
                    report.gaps_skipped += 1;
                    current -= 1;
                    continue;
                }
                Err(e) => {
                    emit_walk_aborted(job, current, &e);
                    break StopReason::Error(e.to_string());
                }
            };

            if record.result.closes_streak() {
                // The closing build ends the walk and is not charged.
                report.budget_remaining += 1;
                break StopReason::StreakClosed { build: current };
            }

            debug!(
                "Attributing {}#{} ({}): {} culprits, {} causes",
                job,
                current,
                record.result,
                record.culprits.len(),
                record.causes().count()
            );
            report.builds_attributed += 1;
            acc.add_culprits(&record);
            acc.add_change_authors(&record);
            self.attribute_causes(&mut acc, &record).await;
            current -= 1;
        };

        report.contributors = acc.contributors;
        report
    }

    /// Resolve the walk's first build number. Aliases are looked up once and
    /// do not cost budget; a finished alias record lands in the resolver
    /// cache under its number, so the first step does not refetch it.
    async fn starting_number(&self, job: &str, start: &BuildRef) -> Result<u64, StopReason> {
        match start {
            BuildRef::Number(n) => Ok(*n),
            BuildRef::Other(raw) => {
                debug!("Could not parse build number {:?}; not walking", raw);
                Err(StopReason::Unparseable(raw.clone()))
            }
            alias => match self.resolver.get(job, alias).await {
                Ok(record) => record.number().ok_or(StopReason::AliasUnresolved),
                Err(e) => {
                    debug!("{} of {} did not resolve: {}", alias, job, e);
                    Err(StopReason::AliasUnresolved)
                }
            },
        }
    }

    /// Classify the causes of `record`, then drain upstream builds with an
    /// explicit worklist. Unresolvable upstream builds are skipped.
    async fn attribute_causes(&self, acc: &mut Attribution, record: &BuildRecord) {
        let mut pending = Vec::new();
        acc.classify(record, &mut pending);

        while let Some((project, build)) = pending.pop() {
            match self.resolver.get(&project, &BuildRef::Number(build)).await {
                Ok(upstream) => acc.classify(&upstream, &mut pending),
                Err(e) => emit_upstream_skipped(&project, build, &e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildwatch_client::fakes::MemoryTracker;
    use buildwatch_client::BuildResult;

    fn walker_over(tracker: &Arc<MemoryTracker>) -> CausalWalker {
        CausalWalker::new(Arc::new(StatusResolver::new(tracker.clone())))
    }

    fn names(set: &BTreeSet<Contributor>) -> Vec<&str> {
        set.iter().map(Contributor::as_str).collect()
    }

    #[tokio::test]
    async fn test_anonymous_contributors_dropped() {
        let tracker = Arc::new(MemoryTracker::new());
        tracker.insert_build(
            BuildRecord::new("app", "2", BuildResult::Failure)
                .with_culprit("")
                .with_change_author("  ")
                .with_culprit("ana"),
        );
        tracker.insert_build(BuildRecord::new("app", "1", BuildResult::Success));

        let causes = walker_over(&tracker)
            .compute_causes("app", &BuildRef::Number(2))
            .await;
        assert_eq!(names(&causes), vec!["ana"]);
    }

    #[tokio::test]
    async fn test_scm_cause_on_upstream_merges_upstream_culprits() {
        let tracker = Arc::new(MemoryTracker::new());
        tracker.insert_build(
            BuildRecord::new("app", "3", BuildResult::Failure).with_cause(Cause::Upstream {
                project: "lib".into(),
                build: 8,
            }),
        );
        tracker.insert_build(BuildRecord::new("app", "2", BuildResult::Success));
        tracker.insert_build(
            BuildRecord::new("lib", "8", BuildResult::Success)
                .with_culprit("lib-dev")
                .with_change_author("lib-author")
                .with_cause(Cause::ScmChange),
        );

        let causes = walker_over(&tracker)
            .compute_causes("app", &BuildRef::Number(3))
            .await;
        // Upstream change set authors only count through a commit notification.
        assert_eq!(names(&causes), vec!["lib-dev"]);
    }

    #[tokio::test]
    async fn test_causes_of_single_record() {
        let tracker = Arc::new(MemoryTracker::new());
        let record = BuildRecord::new("app", "4", BuildResult::Failure)
            .with_culprit("ana")
            .with_change_author("bo")
            .with_cause(Cause::User {
                user_id: "cy".into(),
            });

        let causes = walker_over(&tracker).causes_of(&record).await;
        assert_eq!(names(&causes), vec!["ana", "cy"]);
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_custom_step_budget() {
        let tracker = Arc::new(MemoryTracker::new());
        for id in 1..=5u64 {
            tracker.insert_build(BuildRecord::new("app", id.to_string(), BuildResult::Failure));
        }

        let report = walker_over(&tracker)
            .with_step_budget(2)
            .walk("app", &BuildRef::Number(5))
            .await;
        assert_eq!(report.stop, StopReason::BudgetExhausted);
        assert_eq!(report.builds_visited, 2);
        assert_eq!(report.budget_remaining, 0);
    }

    #[tokio::test]
    async fn test_closing_build_not_charged() {
        let tracker = Arc::new(MemoryTracker::new());
        tracker.insert_build(BuildRecord::new("app", "2", BuildResult::Failure).with_culprit("a"));
        tracker.insert_build(BuildRecord::new("app", "1", BuildResult::Fixed));

        let report = walker_over(&tracker)
            .with_step_budget(1)
            .walk("app", &BuildRef::Number(2))
            .await;
        // The single step goes to #2; #1 is never fetched.
        assert_eq!(report.stop, StopReason::BudgetExhausted);
        assert_eq!(report.builds_visited, 1);

        let report = walker_over(&tracker)
            .with_step_budget(2)
            .walk("app", &BuildRef::Number(2))
            .await;
        assert_eq!(report.stop, StopReason::StreakClosed { build: 1 });
        assert_eq!(report.budget_remaining, 1);
    }

    #[tokio::test]
    async fn test_walk_stops_at_build_one() {
        let tracker = Arc::new(MemoryTracker::new());
        tracker.insert_build(BuildRecord::new("app", "2", BuildResult::Failure).with_culprit("a"));
        tracker.insert_build(BuildRecord::new("app", "1", BuildResult::Failure).with_culprit("b"));

        let report = walker_over(&tracker)
            .walk("app", &BuildRef::Number(2))
            .await;
        assert_eq!(report.stop, StopReason::HistoryExhausted);
        assert_eq!(report.builds_visited, 2);
        assert_eq!(names(&report.contributors), vec!["a", "b"]);
    }
}
