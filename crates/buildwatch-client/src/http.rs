//! HTTP client for a Jenkins-compatible build tracker.
//!
//! Every status and report request uses the tracker's `tree=` projection so
//! only the fields buildwatch reads are transferred.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::model::{decode_job_catalog, BuildRecord, JobSummary, TestReport};
use crate::tracker::{check_job_name, BuildRef, BuildTracker};
use crate::Result;

const STATUS_TREE: &str = "id,result,timestamp,estimatedDuration,building,culprits[fullName],actions[causes[userId,upstreamBuild,upstreamProject,shortDescription]],changeSets[items[author[fullName]]]";
const TEST_REPORT_TREE: &str = "suites[cases[className,name,status,errorStackTrace]]";
const JOB_CATALOG_TREE: &str = "jobs[name,color]";

/// Response header carrying the total console log length.
pub const TEXT_SIZE_HEADER: &str = "X-Text-Size";

/// Build tracker client backed by `reqwest`
pub struct HttpTracker {
    config: TrackerConfig,
    base_url: Url,
    http_client: reqwest::Client,
}

impl HttpTracker {
    /// Create a new tracker client
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.server_url).map_err(|e| {
            TrackerError::InvalidConfig(format!("bad server URL {:?}: {}", config.server_url, e))
        })?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("buildwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| TrackerError::InvalidConfig(e.to_string()))?;

        Ok(HttpTracker {
            config,
            base_url,
            http_client,
        })
    }

    /// Browser URL of a build page.
    pub fn build_page_url(&self, job: &str, build: &BuildRef) -> Result<String> {
        let build = build.to_string();
        Ok(self.job_url(job, &[&build, ""])?.into())
    }

    /// `<server>/job/<job>/<segments...>`, each segment percent-encoded.
    fn job_url(&self, job: &str, segments: &[&str]) -> Result<Url> {
        check_job_name(job)?;
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                TrackerError::InvalidConfig(format!("{} cannot be a base URL", self.base_url))
            })?
            .pop_if_empty()
            .push("job")
            .push(job)
            .extend(segments);
        Ok(url)
    }

    fn build_url(&self, job: &str, build: &BuildRef, suffix: &[&str]) -> Result<Url> {
        let build = build.to_string();
        let segments: Vec<&str> = std::iter::once(build.as_str())
            .chain(suffix.iter().copied())
            .collect();
        self.job_url(job, &segments)
    }

    fn status_url(&self, job: &str, build: &BuildRef) -> Result<Url> {
        let mut url = self.build_url(job, build, &["api", "json"])?;
        url.set_query(Some(&format!("tree={}", STATUS_TREE)));
        Ok(url)
    }

    fn test_report_url(&self, job: &str, build: &BuildRef) -> Result<Url> {
        let mut url = self.build_url(job, build, &["testReport", "api", "json"])?;
        url.set_query(Some(&format!("tree={}", TEST_REPORT_TREE)));
        Ok(url)
    }

    fn console_url(&self, job: &str, build: &BuildRef) -> Result<Url> {
        self.build_url(job, build, &["logText", "progressiveHtml"])
    }

    fn catalog_url(&self) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "json"]);
        }
        url.set_query(Some(&format!("tree={}", JOB_CATALOG_TREE)));
        url
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response> {
        debug!("Visiting {}", url);
        Ok(self.http_client.get(url.clone()).send().await?)
    }
}

fn unexpected_status(url: &Url, status: StatusCode) -> TrackerError {
    TrackerError::Transport(format!("{} returned {}", url, status))
}

#[async_trait]
impl BuildTracker for HttpTracker {
    async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        let url = self.catalog_url();
        let response = self.get(&url).await?;
        if !response.status().is_success() {
            return Err(unexpected_status(&url, response.status()));
        }
        let body = response.bytes().await?;
        decode_job_catalog(&body)
    }

    async fn build_status(&self, job: &str, build: &BuildRef) -> Result<BuildRecord> {
        let url = self.status_url(job, build)?;
        let response = self.get(&url).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(TrackerError::NotFound {
                job: job.to_string(),
                build: build.to_string(),
            }),
            status if status.is_success() => {
                let body = response.bytes().await?;
                BuildRecord::from_json(job, &body)
            }
            status => Err(unexpected_status(&url, status)),
        }
    }

    async fn test_report(&self, job: &str, build: &BuildRef) -> Result<TestReport> {
        let url = self.test_report_url(job, build)?;
        let response = self.get(&url).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(TrackerError::NoTestReport {
                job: job.to_string(),
                build: build.to_string(),
            }),
            status if status.is_success() => {
                let body = response.bytes().await?;
                TestReport::from_json(&body)
            }
            status => Err(unexpected_status(&url, status)),
        }
    }

    async fn console_size(&self, job: &str, build: &BuildRef) -> Result<u64> {
        let url = self.console_url(job, build)?;
        debug!("Probing console size at {}", url);
        let response = self.http_client.head(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(TrackerError::LogSizeUnavailable(format!(
                "status {}",
                response.status().as_u16()
            )));
        }
        let size = response
            .headers()
            .get(TEXT_SIZE_HEADER)
            .ok_or_else(|| {
                TrackerError::LogSizeUnavailable("size not received from server".to_string())
            })?
            .to_str()
            .map_err(|e| TrackerError::LogSizeUnavailable(e.to_string()))?;
        size.trim()
            .parse()
            .map_err(|_| TrackerError::LogSizeUnavailable(format!("bad size value {:?}", size)))
    }

    async fn console_from(&self, job: &str, build: &BuildRef, offset: u64) -> Result<Vec<u8>> {
        let mut url = self.console_url(job, build)?;
        url.query_pairs_mut().append_pair("start", &offset.to_string());
        let response = self.get(&url).await?;
        if response.status() != StatusCode::OK {
            return Err(TrackerError::LogFetchFailed {
                status: response.status().as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn trigger_build(&self, job: &str) -> Result<()> {
        let mut url = self.job_url(job, &["build"])?;
        url.set_query(Some("delay=0sec"));
        debug!("Triggering {}", url);

        let mut request = self.http_client.post(url);
        match &self.config.username {
            Some(user) => request = request.basic_auth(user, self.config.token.as_deref()),
            None => warn!("Triggering {} without credentials", job),
        }

        let response = request.send().await?;
        if response.status() != StatusCode::CREATED {
            return Err(TrackerError::RunFailed {
                job: job.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> HttpTracker {
        HttpTracker::new(TrackerConfig::new("http://ci.local/")).unwrap()
    }

    #[test]
    fn test_status_url_projects_fields() {
        let url = tracker()
            .status_url("backend", &BuildRef::Number(42))
            .unwrap();
        assert!(url
            .as_str()
            .starts_with("http://ci.local/job/backend/42/api/json?tree=id,result"));
        assert!(url.as_str().contains("culprits[fullName]"));
        assert!(url.as_str().contains("changeSets[items[author[fullName]]]"));
    }

    #[test]
    fn test_alias_urls_use_permalinks() {
        let t = tracker();
        assert_eq!(
            t.console_url("backend", &BuildRef::LatestCompleted)
                .unwrap()
                .as_str(),
            "http://ci.local/job/backend/lastCompletedBuild/logText/progressiveHtml"
        );
        assert!(t
            .test_report_url("backend", &BuildRef::LastFailed)
            .unwrap()
            .as_str()
            .contains("/lastFailedBuild/testReport/api/json?tree=suites[cases["));
    }

    #[test]
    fn test_build_page_url() {
        assert_eq!(
            tracker()
                .build_page_url("backend", &BuildRef::Latest)
                .unwrap(),
            "http://ci.local/job/backend/lastBuild/"
        );
    }

    #[test]
    fn test_job_names_are_percent_encoded() {
        let t = tracker();
        assert_eq!(
            t.build_page_url("a b#c", &BuildRef::Number(3)).unwrap(),
            "http://ci.local/job/a%20b%23c/3/"
        );
        assert_eq!(
            t.console_url("x?y", &BuildRef::Number(1)).unwrap().path(),
            "/job/x%3Fy/1/logText/progressiveHtml"
        );
    }

    #[test]
    fn test_server_path_prefix_kept() {
        let t = HttpTracker::new(TrackerConfig::new("https://ci.example.com/jenkins")).unwrap();
        assert_eq!(
            t.build_page_url("app", &BuildRef::Number(7)).unwrap(),
            "https://ci.example.com/jenkins/job/app/7/"
        );
        assert_eq!(
            t.catalog_url().as_str(),
            "https://ci.example.com/jenkins/api/json?tree=jobs[name,color]"
        );
    }

    #[test]
    fn test_bad_server_url_rejected() {
        let err = HttpTracker::new(TrackerConfig::new("not a url")).err().unwrap();
        assert!(matches!(err, TrackerError::InvalidConfig(_)));
    }

    #[test]
    fn test_folder_jobs_rejected_before_request() {
        let err = tracker()
            .status_url("team/project", &BuildRef::Number(1))
            .unwrap_err();
        assert!(matches!(err, TrackerError::NotSupported { .. }));
    }

    #[tokio::test]
    async fn test_trigger_folder_job_not_supported() {
        let err = tracker().trigger_build("team/project").await.unwrap_err();
        assert!(matches!(err, TrackerError::NotSupported { .. }));
    }
}
