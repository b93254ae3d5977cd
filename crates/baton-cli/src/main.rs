//! baton demo: several simulated CI jobs report into one shared document.
//!
//! Environment:
//! - `BATON_JOBS`: number of concurrent jobs (default 3)
//! - `BATON_STORE_DIR`: when set, blobs live as files in this directory, so
//!   separate invocations contend too; otherwise an in-memory store is used
//! - `BATON_RUN_NUMBER`: run number stamped on every report (default 1)
//! - `BATON_DOMAIN`: coordination domain key (default `demo/pr-1`)
//! - `RUST_LOG`: log filter (default `info`)

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use baton_core::domain::{LockTiming, ReportFragment};
use baton_core::impls::{DirDocumentStore, InMemoryDocumentStore};
use baton_core::ports::DocumentStore;
use baton_core::ReporterBuilder;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type JobError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Serialize)]
struct JobOutcome {
    job: i64,
    report_id: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Demo timing: the default protocol shape, scaled down so a run takes
/// seconds rather than minutes.
fn demo_timing() -> LockTiming {
    LockTiming::default()
        .with_create_retry_delay(Duration::from_millis(100))
        .with_min_hold_time(Duration::from_millis(250))
        .with_wait_range(Duration::from_millis(50), Duration::from_millis(150))
        .with_wait_timeout(Duration::from_secs(15))
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn fragment(job: i64, run_number: u64) -> ReportFragment {
    let report_id = format!("bench-{job}");
    ReportFragment::new(report_id.clone(), job, run_number)
        .with_title(format!("<code>{report_id}</code>"))
        .with_summary(format!(": run #{run_number} finished"))
        .with_detail(format!(
            "<table><thead><tr><th>Version</th><th>Avg time</th></tr></thead>\
             <tbody><tr><td>{report_id}</td><td>{}ms</td></tr></tbody></table>",
            40 + job * 3
        ))
        .open(job == 0)
}

async fn run_job(
    store: Arc<dyn DocumentStore>,
    domain: String,
    job: i64,
    run_number: u64,
) -> Result<(), JobError> {
    let mut reporter = ReporterBuilder::new()
        .domain_key(domain)
        .timing(demo_timing())
        .build()?;
    info!(job, writer = reporter.context().owner_id(), "job started");

    // Post a running status first, then the finished result.
    let running = fragment(job, run_number).running("⏱ running");
    reporter.report(store.as_ref(), &running).await?;
    reporter.report(store.as_ref(), &fragment(job, run_number)).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let jobs: i64 = env_or("BATON_JOBS", 3);
    let run_number: u64 = env_or("BATON_RUN_NUMBER", 1);
    let domain = std::env::var("BATON_DOMAIN").unwrap_or_else(|_| "demo/pr-1".to_string());

    let store: Arc<dyn DocumentStore> = match std::env::var("BATON_STORE_DIR") {
        Ok(dir) => {
            info!(dir = %dir, "using directory store");
            Arc::new(DirDocumentStore::open(dir).await?)
        }
        Err(_) => Arc::new(InMemoryDocumentStore::new()),
    };

    let handles: Vec<_> = (0..jobs)
        .map(|job| {
            let store = Arc::clone(&store);
            let domain = domain.clone();
            // Reverse start order so the document has to sort them.
            let job = jobs - 1 - job;
            (job, tokio::spawn(run_job(store, domain, job, run_number)))
        })
        .collect();

    let mut outcomes = Vec::new();
    for (job, handle) in handles {
        let result = match handle.await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(join) => Err(format!("job panicked: {join}")),
        };
        if let Err(e) = &result {
            error!(job, error = %e, "job failed");
        }
        outcomes.push(JobOutcome {
            job,
            report_id: format!("bench-{job}"),
            ok: result.is_ok(),
            error: result.err(),
        });
    }

    for blob in store.list().await? {
        println!("--- blob {} ---\n{}\n", blob.id, blob.body);
    }
    println!("{}", serde_json::to_string_pretty(&outcomes)?);

    if outcomes.iter().all(|o| o.ok) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
