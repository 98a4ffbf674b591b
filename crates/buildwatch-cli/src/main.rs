//! buildwatch - CI job health and failure attribution
//!
//! The `buildwatch` command answers "is this job healthy, and if not, who
//! broke it" against a Jenkins-compatible build tracker.
//!
//! ## Commands
//!
//! - `jobs`: List jobs and their health
//! - `status`: Show one build's status record
//! - `causes`: Attribute a failing streak to its contributors
//! - `log`: Print the last lines of a build's console log
//! - `tests`: List failing test cases of a build
//! - `run`: Trigger a build
//! - `watch`: Refresh job health on an interval until Ctrl-C

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use buildwatch_client::{
    BuildRecord, BuildRef, Cause, Contributor, HttpTracker, JobHealth, TrackerConfig,
};
use buildwatch_core::{Monitor, RandomMonitor, TrackerMonitor, WalkReport, METRICS};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "buildwatch")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CI job health and failure attribution", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Tracker base URL (overrides BUILDWATCH_SERVER)
    #[arg(long, global = true)]
    server: Option<String>,

    /// User for authenticated calls (overrides BUILDWATCH_USER)
    #[arg(long, global = true)]
    user: Option<String>,

    /// API token paired with --user (overrides BUILDWATCH_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Serve random data instead of talking to a tracker
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known jobs with their health
    Jobs,

    /// Show the status record of a build
    Status {
        job: String,

        /// Build number or alias (latest, latest-completed, last-failed)
        #[arg(default_value = "latest")]
        build: String,
    },

    /// Show who is behind the failing streak ending at a build
    Causes {
        job: String,

        /// Build number or alias to start walking back from
        #[arg(default_value = "latest-completed")]
        build: String,

        /// Print the full walk report as JSON
        #[arg(long)]
        report: bool,
    },

    /// Print the last lines of a build's console log
    Log {
        job: String,

        #[arg(default_value = "latest")]
        build: String,

        /// Number of lines to print
        #[arg(short = 'n', long, default_value = "20")]
        lines: usize,
    },

    /// List failing test cases of a build
    Tests {
        job: String,

        #[arg(default_value = "last-failed")]
        build: String,
    },

    /// Trigger a build of a job
    Run { job: String },

    /// Refresh job health and culprits on an interval until Ctrl-C
    Watch {
        /// Comma-separated jobs to watch (default: every known job)
        #[arg(long, value_delimiter = ',')]
        jobs: Vec<String>,

        /// Seconds between refreshes
        #[arg(long, default_value = "15")]
        refresh_secs: u64,
    },
}

/// Where answers come from: a real tracker or the random stub.
enum Backend {
    Tracker {
        http: Arc<HttpTracker>,
        monitor: Arc<TrackerMonitor>,
    },
    Mock(Arc<RandomMonitor>),
}

impl Backend {
    fn open(cli: &Cli) -> Result<Self> {
        if cli.mock {
            info!("Using random mock data");
            return Ok(Backend::Mock(Arc::new(RandomMonitor::new())));
        }
        let config = tracker_config(cli);
        info!("Using tracker at {}", config.server_url);
        let http = Arc::new(HttpTracker::new(config).context("Failed to set up tracker client")?);
        let monitor = Arc::new(TrackerMonitor::new(http.clone()));
        Ok(Backend::Tracker { http, monitor })
    }

    fn monitor(&self) -> Arc<dyn Monitor> {
        match self {
            Backend::Tracker { monitor, .. } => monitor.clone() as Arc<dyn Monitor>,
            Backend::Mock(monitor) => monitor.clone() as Arc<dyn Monitor>,
        }
    }

    fn page_url(&self, job: &str, build: &BuildRef) -> Option<String> {
        match self {
            Backend::Tracker { http, .. } => http.build_page_url(job, build).ok(),
            Backend::Mock(_) => None,
        }
    }

    async fn walk(&self, job: &str, build: &BuildRef) -> Result<WalkReport> {
        match self {
            Backend::Tracker { monitor, .. } => Ok(monitor.walker().walk(job, build).await),
            Backend::Mock(_) => bail!("Walk reports need a real tracker (drop --mock)"),
        }
    }
}

fn tracker_config(cli: &Cli) -> TrackerConfig {
    let mut config = TrackerConfig::from_env();
    if let Some(server) = &cli.server {
        config = config.with_server(server);
    }
    if let Some(user) = &cli.user {
        config.username = Some(user.clone());
    }
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    buildwatch_core::init_tracing(cli.json, level);

    let backend = Backend::open(&cli)?;

    match &cli.command {
        Commands::Jobs => cmd_jobs(backend.monitor().as_ref()).await,
        Commands::Status { job, build } => cmd_status(&backend, job, build).await,
        Commands::Causes { job, build, report } => {
            if *report {
                cmd_causes_report(&backend, job, build).await
            } else {
                cmd_causes(backend.monitor().as_ref(), job, build).await
            }
        }
        Commands::Log { job, build, lines } => {
            cmd_log(backend.monitor().as_ref(), job, build, *lines).await
        }
        Commands::Tests { job, build } => cmd_tests(backend.monitor().as_ref(), job, build).await,
        Commands::Run { job } => cmd_run(backend.monitor().as_ref(), job).await,
        Commands::Watch { jobs, refresh_secs } => {
            cmd_watch(backend.monitor(), jobs, Duration::from_secs(*refresh_secs)).await
        }
    }
}

async fn cmd_jobs(monitor: &dyn Monitor) -> Result<()> {
    let jobs = monitor.list_jobs().await.context("Failed to list jobs")?;
    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }
    for job in jobs {
        println!("{:<10} {}", health_label(job.health()), job.name);
    }
    Ok(())
}

async fn cmd_status(backend: &Backend, job: &str, build: &str) -> Result<()> {
    let build = BuildRef::parse(build);
    let record = backend
        .monitor()
        .status(job, &build)
        .await
        .with_context(|| format!("Failed to fetch status of {}#{}", job, build))?;

    print!("{}", render_status(&record));
    if let Some(url) = backend.page_url(job, &build) {
        println!("URL:       {}", url);
    }
    Ok(())
}

async fn cmd_causes(monitor: &dyn Monitor, job: &str, build: &str) -> Result<()> {
    let causes = monitor.compute_causes(job, &BuildRef::parse(build)).await;
    println!("{}", join_contributors(&causes));
    Ok(())
}

async fn cmd_causes_report(backend: &Backend, job: &str, build: &str) -> Result<()> {
    let report = backend.walk(job, &BuildRef::parse(build)).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_log(monitor: &dyn Monitor, job: &str, build: &str, lines: usize) -> Result<()> {
    let build = BuildRef::parse(build);
    let lines = monitor
        .tail_lines(job, &build, lines)
        .await
        .with_context(|| format!("Failed to read console log of {}#{}", job, build))?;
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

async fn cmd_tests(monitor: &dyn Monitor, job: &str, build: &str) -> Result<()> {
    let build = BuildRef::parse(build);
    let failed = monitor
        .failed_tests(job, &build)
        .await
        .with_context(|| format!("Failed to read test report of {}#{}", job, build))?;

    if failed.is_empty() {
        println!("No failing tests.");
        return Ok(());
    }
    for case in failed {
        println!("{:?} {}.{}", case.status, case.class_name, case.name);
        if let Some(first) = case.error_trace.lines().next() {
            println!("    {}", first);
        }
    }
    Ok(())
}

async fn cmd_run(monitor: &dyn Monitor, job: &str) -> Result<()> {
    monitor
        .trigger_build(job)
        .await
        .with_context(|| format!("Failed to trigger {}", job))?;
    println!("Triggered {}", job);
    Ok(())
}

async fn cmd_watch(monitor: Arc<dyn Monitor>, jobs: &[String], every: Duration) -> Result<()> {
    let jobs = if jobs.is_empty() {
        monitor
            .list_jobs()
            .await
            .context("Failed to list jobs")?
            .into_iter()
            .map(|j| j.name)
            .collect()
    } else {
        jobs.to_vec()
    };
    if jobs.is_empty() {
        bail!("Nothing to watch");
    }

    let mut interval = tokio::time::interval(every);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let rows = futures::future::join_all(
                    jobs.iter().map(|job| refresh_job(monitor.as_ref(), job)),
                )
                .await;
                for row in rows {
                    println!("{}", row);
                }
                println!();
                METRICS.flush();
            }
            _ = &mut ctrl_c => break,
        }
    }
    Ok(())
}

/// One watch line: latest result of `job`, plus contributors when it is failing.
async fn refresh_job(monitor: &dyn Monitor, job: &str) -> String {
    let record = match monitor.status(job, &BuildRef::Latest).await {
        Ok(record) => record,
        Err(e) => {
            warn!("Could not refresh {}: {}", job, e);
            return format!("{:<30} ERROR     {}", job, e);
        }
    };

    let mut line = format!("{:<30} {:<9} #{}", job, record.result, record.id);
    if record.building {
        line.push_str(" (building)");
    }
    if !record.result.closes_streak() {
        let causes = monitor
            .compute_causes(job, &BuildRef::LatestCompleted)
            .await;
        line.push_str("  ");
        line.push_str(&join_contributors(&causes));
    }
    line
}

fn render_status(record: &BuildRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("Job:       {}\n", record.job));
    out.push_str(&format!("Build:     #{}\n", record.id));
    out.push_str(&format!("Result:    {}\n", record.result));
    if record.building {
        out.push_str("Building:  yes\n");
    }
    if let Some(started) = record.started_at().filter(|_| record.timestamp > 0) {
        out.push_str(&format!("Started:   {}\n", started.to_rfc3339()));
    }
    if record.building {
        if let Some(end) = record.estimated_end() {
            out.push_str(&format!("ETA:       {}\n", end.to_rfc3339()));
        }
    }
    let culprits: BTreeSet<Contributor> = record.culprits.iter().cloned().collect();
    out.push_str(&format!("Culprits:  {}\n", join_contributors(&culprits)));
    for cause in record.causes() {
        out.push_str(&format!("Cause:     {}\n", describe_cause(cause)));
    }
    out
}

fn describe_cause(cause: &Cause) -> String {
    match cause {
        Cause::User { user_id } => format!("started by {}", user_id),
        Cause::Upstream { project, build } => format!("upstream {}#{}", project, build),
        Cause::ScmChange => "SCM change".to_string(),
        Cause::CommitNotification => "commit notification".to_string(),
        Cause::Unclassified { description } if description.is_empty() => "unknown".to_string(),
        Cause::Unclassified { description } => description.clone(),
    }
}

fn join_contributors(people: &BTreeSet<Contributor>) -> String {
    if people.is_empty() {
        return "-".to_string();
    }
    people
        .iter()
        .map(Contributor::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn health_label(health: JobHealth) -> &'static str {
    match health {
        JobHealth::Healthy => "ok",
        JobHealth::Failing => "FAILING",
        JobHealth::Unstable => "unstable",
        JobHealth::Aborted => "aborted",
        JobHealth::Building => "building",
        JobHealth::Unknown => "?",
    }
}
