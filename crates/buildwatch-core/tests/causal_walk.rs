//! Failure attribution walks against the in-memory tracker.

use std::collections::BTreeSet;
use std::sync::Arc;

use buildwatch_client::fakes::{MemoryTracker, TrackerCall};
use buildwatch_client::{BuildRecord, BuildRef, BuildResult, Cause, Contributor, TrackerError};
use buildwatch_core::{
    CausalWalker, Monitor, StatusResolver, StopReason, TrackerMonitor, STEP_BUDGET,
};

fn walker(tracker: &Arc<MemoryTracker>) -> CausalWalker {
    CausalWalker::new(Arc::new(StatusResolver::new(tracker.clone())))
}

fn people(names: &[&str]) -> BTreeSet<Contributor> {
    names.iter().map(|n| Contributor::new(*n)).collect()
}

fn failure(job: &str, id: u64, culprit: &str) -> BuildRecord {
    BuildRecord::new(job, id.to_string(), BuildResult::Failure).with_culprit(culprit)
}

fn upstream(project: &str, build: u64) -> Cause {
    Cause::Upstream {
        project: project.to_string(),
        build,
    }
}

#[tokio::test]
async fn test_streak_excludes_closing_build() {
    let tracker = Arc::new(MemoryTracker::new());
    tracker.insert_build(failure("app", 5, "A"));
    tracker.insert_build(failure("app", 4, "B"));
    tracker.insert_build(BuildRecord::new("app", "3", BuildResult::Success).with_culprit("C"));

    let report = walker(&tracker).walk("app", &BuildRef::Number(5)).await;

    assert_eq!(report.contributors, people(&["A", "B"]));
    assert_eq!(report.stop, StopReason::StreakClosed { build: 3 });
}

#[tokio::test]
async fn test_fixed_build_closes_streak() {
    let tracker = Arc::new(MemoryTracker::new());
    tracker.insert_build(failure("app", 2, "A"));
    tracker.insert_build(BuildRecord::new("app", "1", BuildResult::Fixed).with_culprit("Z"));

    let causes = walker(&tracker)
        .compute_causes("app", &BuildRef::Number(2))
        .await;
    assert_eq!(causes, people(&["A"]));
}

#[tokio::test]
async fn test_unparseable_start_is_empty_without_calls() {
    let tracker = Arc::new(MemoryTracker::new());

    let report = walker(&tracker).walk("app", &BuildRef::parse("abc")).await;

    assert!(report.contributors.is_empty());
    assert_eq!(report.stop, StopReason::Unparseable("abc".to_string()));
    assert_eq!(report.builds_visited, 0);
    assert!(tracker.calls().is_empty());
}

#[tokio::test]
async fn test_purged_build_is_skipped() {
    let tracker = Arc::new(MemoryTracker::new());
    tracker.insert_build(failure("app", 9, "C"));
    tracker.insert_build(BuildRecord::new("app", "8", BuildResult::Success).with_culprit("D"));

    let report = walker(&tracker).walk("app", &BuildRef::Number(10)).await;

    assert_eq!(report.contributors, people(&["C"]));
    // #10 and #9 are walked past; #8 closes the streak for free.
    assert_eq!(STEP_BUDGET - report.budget_remaining, 2);
    assert_eq!(report.gaps_skipped, 1);
    assert_eq!(report.builds_attributed, 1);
    assert_eq!(report.builds_visited, 3);
    assert_eq!(report.stop, StopReason::StreakClosed { build: 8 });
}

#[tokio::test]
async fn test_budget_bounds_long_streak_cold_and_warm() {
    let tracker = Arc::new(MemoryTracker::new());
    for id in 1..=25u64 {
        tracker.insert_build(failure("app", id, &format!("dev{}", id)));
    }
    let walker = walker(&tracker);

    let cold = walker.walk("app", &BuildRef::Number(25)).await;
    assert_eq!(cold.builds_visited, STEP_BUDGET);
    assert_eq!(cold.stop, StopReason::BudgetExhausted);
    assert_eq!(cold.contributors.len(), STEP_BUDGET as usize);
    assert!(cold.contributors.contains(&Contributor::new("dev25")));
    assert!(cold.contributors.contains(&Contributor::new("dev6")));
    assert!(!cold.contributors.contains(&Contributor::new("dev5")));
    assert_eq!(tracker.status_fetches("app"), STEP_BUDGET as usize);

    let warm = walker.walk("app", &BuildRef::Number(25)).await;
    assert_eq!(warm.builds_visited, STEP_BUDGET);
    assert_eq!(warm.contributors, cold.contributors);
    // Everything came from the cache.
    assert_eq!(tracker.status_fetches("app"), STEP_BUDGET as usize);
}

#[tokio::test]
async fn test_duplicates_collapse() {
    let tracker = Arc::new(MemoryTracker::new());
    tracker.insert_build(
        failure("app", 3, "ana")
            .with_change_author("ana")
            .with_cause(Cause::User {
                user_id: "ana".into(),
            })
            .with_cause(Cause::ScmChange)
            .with_cause(Cause::CommitNotification),
    );
    tracker.insert_build(failure("app", 2, "ana").with_change_author("bo"));
    tracker.insert_build(BuildRecord::new("app", "1", BuildResult::Success));

    let causes = walker(&tracker)
        .compute_causes("app", &BuildRef::Number(3))
        .await;
    assert_eq!(causes, people(&["ana", "bo"]));
}

#[tokio::test]
async fn test_upstream_people_are_merged() {
    let tracker = Arc::new(MemoryTracker::new());
    tracker.insert_build(failure("app", 7, "A").with_cause(upstream("lib", 40)));
    tracker.insert_build(BuildRecord::new("app", "6", BuildResult::Success));
    tracker.insert_build(
        BuildRecord::new("lib", "40", BuildResult::Success)
            .with_change_author("lib-author")
            .with_cause(Cause::CommitNotification)
            .with_cause(upstream("core", 2)),
    );
    tracker.insert_build(
        BuildRecord::new("core", "2", BuildResult::Success).with_cause(Cause::User {
            user_id: "releaser".into(),
        }),
    );

    let causes = walker(&tracker)
        .compute_causes("app", &BuildRef::Number(7))
        .await;
    assert_eq!(causes, people(&["A", "lib-author", "releaser"]));
}

#[tokio::test]
async fn test_cyclic_upstream_terminates() {
    let tracker = Arc::new(MemoryTracker::new());
    tracker.insert_build(failure("app", 3, "A").with_cause(upstream("lib", 5)));
    tracker.insert_build(BuildRecord::new("app", "2", BuildResult::Success));
    tracker.insert_build(
        BuildRecord::new("lib", "5", BuildResult::Failure)
            .with_cause(upstream("app", 3))
            .with_cause(Cause::User {
                user_id: "L".into(),
            }),
    );

    let causes = walker(&tracker)
        .compute_causes("app", &BuildRef::Number(3))
        .await;

    assert_eq!(causes, people(&["A", "L"]));
    assert_eq!(tracker.status_fetches("lib"), 1);
    // app#3, app#2 and lib#5; app#3 is not fetched again through lib#5.
    assert_eq!(tracker.total_status_fetches(), 3);
}

#[tokio::test]
async fn test_unreachable_upstream_is_ignored() {
    let tracker = Arc::new(MemoryTracker::new());
    tracker.insert_build(failure("app", 2, "A").with_cause(upstream("gone", 1)));
    tracker.insert_build(BuildRecord::new("app", "1", BuildResult::Success));

    let report = walker(&tracker).walk("app", &BuildRef::Number(2)).await;

    assert_eq!(report.contributors, people(&["A"]));
    assert_eq!(report.stop, StopReason::StreakClosed { build: 1 });
}

#[tokio::test]
async fn test_transport_error_returns_partial_result() {
    let tracker = Arc::new(MemoryTracker::new());
    tracker.insert_build(failure("app", 5, "A"));
    tracker.fail_status("app", 4u64, TrackerError::Transport("connection reset".into()));
    tracker.insert_build(failure("app", 3, "B"));

    let report = walker(&tracker).walk("app", &BuildRef::Number(5)).await;

    assert_eq!(report.contributors, people(&["A"]));
    assert!(matches!(report.stop, StopReason::Error(_)));
}

#[tokio::test]
async fn test_folder_job_returns_empty() {
    let tracker = Arc::new(MemoryTracker::new());

    let report = walker(&tracker)
        .walk("team/project", &BuildRef::Number(4))
        .await;

    assert!(report.contributors.is_empty());
    assert!(matches!(report.stop, StopReason::Error(_)));
    assert!(tracker.calls().is_empty());
}

#[tokio::test]
async fn test_alias_start_resolves_once() {
    let tracker = Arc::new(MemoryTracker::new());
    tracker.insert_build(failure("app", 12, "A"));
    tracker.insert_build(failure("app", 11, "B"));
    tracker.insert_build(BuildRecord::new("app", "10", BuildResult::Success));
    tracker.set_alias("app", BuildRef::LatestCompleted, 12);

    let report = walker(&tracker)
        .walk("app", &BuildRef::LatestCompleted)
        .await;

    assert_eq!(report.contributors, people(&["A", "B"]));
    assert_eq!(report.builds_visited, 3);
    // The alias lookup doubles as #12; then #11 and #10.
    assert_eq!(tracker.status_fetches("app"), 3);
    assert_eq!(
        tracker.calls()[0],
        TrackerCall::Status {
            job: "app".to_string(),
            build: BuildRef::LatestCompleted,
        }
    );
}

#[tokio::test]
async fn test_alias_to_passing_build_fetches_once() {
    let tracker = Arc::new(MemoryTracker::new());
    tracker.insert_build(BuildRecord::new("app", "30", BuildResult::Success).with_culprit("A"));
    tracker.set_alias("app", BuildRef::LatestCompleted, 30);

    let report = walker(&tracker)
        .walk("app", &BuildRef::LatestCompleted)
        .await;

    assert!(report.contributors.is_empty());
    assert_eq!(report.stop, StopReason::StreakClosed { build: 30 });
    assert_eq!(report.budget_remaining, STEP_BUDGET);
    assert_eq!(tracker.status_fetches("app"), 1);
}

#[tokio::test]
async fn test_unknown_alias_stops() {
    let tracker = Arc::new(MemoryTracker::new());

    let report = walker(&tracker)
        .walk("app", &BuildRef::LatestCompleted)
        .await;

    assert_eq!(report.stop, StopReason::AliasUnresolved);
    assert!(report.contributors.is_empty());
}

#[tokio::test]
async fn test_concurrent_walks_share_cache() {
    let tracker = Arc::new(MemoryTracker::new());
    for id in 2..=6u64 {
        tracker.insert_build(failure("app", id, &format!("dev{}", id)));
    }
    tracker.insert_build(BuildRecord::new("app", "1", BuildResult::Success));
    let monitor = Arc::new(TrackerMonitor::new(tracker.clone()));

    let walks = (0..4).map(|_| {
        let monitor = monitor.clone();
        async move { monitor.compute_causes("app", &BuildRef::Number(6)).await }
    });
    let results = futures::future::join_all(walks).await;

    let expected = people(&["dev2", "dev3", "dev4", "dev5", "dev6"]);
    assert!(results.iter().all(|r| *r == expected));
    assert_eq!(monitor.resolver().cached_len(), 6);
}
