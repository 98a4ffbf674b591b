//! Failing test cases of a build.

use buildwatch_client::{BuildRef, BuildTracker, Result, TestCase};
use tracing::debug;

/// Failing test cases of `job` at `build`, in report order.
///
/// A build without a test report fails with `TrackerError::NoTestReport`.
pub async fn failed_tests(
    tracker: &dyn BuildTracker,
    job: &str,
    build: &BuildRef,
) -> Result<Vec<TestCase>> {
    let report = tracker.test_report(job, build).await?;
    let total = report.cases.len();
    let failed = filter_failed(report.cases);
    debug!("{}#{}: {} of {} test cases failing", job, build, failed.len(), total);
    Ok(failed)
}

/// Drop passed, skipped and fixed cases, keeping relative order.
pub fn filter_failed(cases: Vec<TestCase>) -> Vec<TestCase> {
    cases.into_iter().filter(|c| c.status.is_failing()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildwatch_client::TestStatus;

    fn case(name: &str, status: TestStatus) -> TestCase {
        TestCase {
            class_name: "suite".into(),
            name: name.into(),
            status,
            error_trace: String::new(),
        }
    }

    #[test]
    fn test_filter_keeps_order() {
        let cases = vec![
            case("a", TestStatus::Failed),
            case("b", TestStatus::Passed),
            case("c", TestStatus::Regression),
            case("d", TestStatus::Skipped),
            case("e", TestStatus::Fixed),
            case("f", TestStatus::Other("ERROR".into())),
        ];
        let names: Vec<_> = filter_failed(cases).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a", "c", "f"]);
    }

    #[test]
    fn test_all_passing_is_empty() {
        assert!(filter_failed(vec![case("a", TestStatus::Passed)]).is_empty());
    }
}
