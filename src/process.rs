use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::Local;
use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::plan::{plan_windows, Window};
use crate::request::{request_row_count, request_table_names, request_window};
use crate::storage::{BucketStore, LocalBucketStore};
use crate::write::{write_table, Payload, WrittenTable};
use crate::{info_time, warn_time, Config, Error, Result};

/// One item of a stage that did not make it, kept for the run summary.
#[derive(Debug)]
pub struct Failure {
    pub item: String,
    pub error: Error,
}

/// Everything a run did, and everything it failed to do.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Distinct table names, in discovery order.
    pub tables: Vec<String>,
    pub discovery_failures: Vec<Failure>,
    pub count_failures: Vec<Failure>,
    /// Tables reporting zero rows. They get no windows and no file.
    pub empty_tables: Vec<String>,
    pub windows_planned: usize,
    pub window_failures: Vec<Failure>,
    pub write_failures: Vec<Failure>,
    pub written: Vec<WrittenTable>,
}

impl RunSummary {
    pub fn failure_count(&self) -> usize {
        self.discovery_failures.len()
            + self.count_failures.len()
            + self.window_failures.len()
            + self.write_failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failure_count() == 0
    }

    fn record(failures: &mut Vec<Failure>, stage: &str, item: String, error: Error) {
        warn_time!("{} failed for {}: {}", stage, item, error);
        failures.push(Failure { item, error });
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: u64 = self.written.iter().map(|w| w.rows).sum();
        writeln!(f, "RUN SUMMARY")?;
        writeln!(f, "  tables discovered : {}", self.tables.len())?;
        writeln!(f, "  empty tables      : {}", self.empty_tables.len())?;
        writeln!(f, "  windows planned   : {}", self.windows_planned)?;
        writeln!(f, "  files written     : {} ({} rows)", self.written.len(), rows)?;

        let sections = [
            ("discovery failures", &self.discovery_failures),
            ("count failures", &self.count_failures),
            ("window gaps", &self.window_failures),
            ("write failures", &self.write_failures),
        ];
        for (name, failures) in sections {
            if failures.is_empty() {
                continue;
            }
            writeln!(f, "  {} ({}):", name, failures.len())?;
            for failure in failures {
                writeln!(f, "    {} : {}", failure.item, failure.error)?;
            }
        }
        write!(
            f,
            "  status            : {}",
            if self.is_complete() { "COMPLETE" } else { "INCOMPLETE" }
        )
    }
}

/// Runs the whole acquisition: discovery, row counts, window planning, then fetching
/// and writing. Every stage finishes completely before the next one starts.
/// Per table and per window failures end up in the returned summary, only setup
/// errors abort the run.
pub async fn run_pipeline(config: &Config) -> Result<RunSummary> {
    let start_time = Local::now();
    config.validate()?;

    let client = Client::builder()
        .timeout(config.request_timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let limiter = Arc::new(Semaphore::new(config.max_concurrent_requests));
    tokio::fs::create_dir_all(&config.output_dir).await?;

    let mut summary = RunSummary::default();
    info_time!("Started harvesting");

    let tables = discover_tables(config, &client, &limiter, &mut summary).await?;
    summary.tables = tables;
    if summary.tables.is_empty() {
        info_time!(start_time, "No tables discovered, nothing to fetch.");
        return Ok(summary);
    }

    let counts = count_rows(config, &client, &limiter, &mut summary).await?;

    let windows = plan_all(config, &counts, &mut summary);

    fetch_and_write(config, &client, &limiter, windows, &mut summary).await?;

    info_time!(start_time, "Finished harvesting {} tables.", summary.tables.len());
    Ok(summary)
}

/// Holds one permit of the shared limiter while `fut` runs.
async fn limited<F, T>(limiter: Arc<Semaphore>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let _permit = limiter.acquire_owned().await?;
    fut.await
}

/// Distinct names, first occurrence wins.
pub fn dedup_tables(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

async fn discover_tables(
    config: &Config,
    client: &Client,
    limiter: &Arc<Semaphore>,
    summary: &mut RunSummary,
) -> Result<Vec<String>> {
    let stage_start = Local::now();
    let mut task_set = JoinSet::new();

    for (idx, url) in config.discovery_urls.iter().enumerate() {
        let fut = request_table_names(
            client.clone(),
            url.clone(),
            config.table_marker.clone(),
            config.retry.clone(),
        );
        let limiter = limiter.clone();
        let url = url.clone();
        task_set.spawn(async move { (idx, url, limited(limiter, fut).await) });
    }

    let mut pages = Vec::with_capacity(config.discovery_urls.len());
    while let Some(task) = task_set.join_next().await {
        let (idx, url, res) = task?;
        match res {
            Ok(names) => pages.push((idx, names)),
            Err(e) => RunSummary::record(&mut summary.discovery_failures, "Discovery", url, e),
        }
    }
    // Keep the order of the configured pages.
    pages.sort_by_key(|(idx, _)| *idx);

    let tables = dedup_tables(pages.into_iter().flat_map(|(_, names)| names));
    info_time!(stage_start, "Discovered {} distinct tables.", tables.len());
    Ok(tables)
}

async fn count_rows(
    config: &Config,
    client: &Client,
    limiter: &Arc<Semaphore>,
    summary: &mut RunSummary,
) -> Result<Vec<(String, u64)>> {
    let stage_start = Local::now();
    let mut task_set = JoinSet::new();

    for (idx, table) in summary.tables.iter().enumerate() {
        let fut = request_row_count(
            client.clone(),
            config.base_url.clone(),
            table.clone(),
            config.max_rows,
            config.retry.clone(),
        );
        let limiter = limiter.clone();
        let table = table.clone();
        task_set.spawn(async move { (idx, table, limited(limiter, fut).await) });
    }

    let mut counts = Vec::with_capacity(summary.tables.len());
    while let Some(task) = task_set.join_next().await {
        let (idx, table, res) = task?;
        match res {
            Ok(count) => counts.push((idx, table, count)),
            Err(e) => RunSummary::record(&mut summary.count_failures, "Row count", table, e),
        }
    }
    counts.sort_by_key(|(idx, _, _)| *idx);

    info_time!(
        stage_start,
        "Counted rows of {} tables, {} failed.",
        counts.len(),
        summary.count_failures.len()
    );
    Ok(counts
        .into_iter()
        .map(|(_, table, count)| (table, count))
        .collect())
}

fn plan_all(config: &Config, counts: &[(String, u64)], summary: &mut RunSummary) -> Vec<Window> {
    let mut windows = Vec::new();
    for (table, row_count) in counts {
        let planned = plan_windows(table, *row_count, config.max_window);
        if planned.is_empty() {
            info_time!("Table {} is empty, skipping it.", table);
            summary.empty_tables.push(table.clone());
        }
        windows.extend(planned);
    }
    summary.windows_planned = windows.len();
    info_time!("Planned {} windows.", windows.len());
    windows
}

/// Fetched windows of one table, waiting until the last of them arrives.
struct TableBuffer {
    expected: usize,
    arrived: usize,
    parts: Vec<(Window, Payload)>,
}

async fn fetch_and_write(
    config: &Config,
    client: &Client,
    limiter: &Arc<Semaphore>,
    windows: Vec<Window>,
    summary: &mut RunSummary,
) -> Result<()> {
    let stage_start = Local::now();

    let mut buffers: HashMap<String, TableBuffer> = HashMap::new();
    for window in &windows {
        buffers
            .entry(window.table.clone())
            .or_insert_with(|| TableBuffer {
                expected: 0,
                arrived: 0,
                parts: Vec::new(),
            })
            .expected += 1;
    }

    let mut fetch_set = JoinSet::new();
    for window in windows {
        let fut = request_window(
            client.clone(),
            config.base_url.clone(),
            config.format.clone(),
            window.clone(),
            config.retry.clone(),
        );
        let limiter = limiter.clone();
        fetch_set.spawn(async move { (window, limited(limiter, fut).await) });
    }

    // Each table gets exactly one writer, spawned once all its windows are in.
    let mut write_set = JoinSet::new();
    while let Some(task) = fetch_set.join_next().await {
        let (window, res) = task?;
        let table = window.table.clone();

        let Some(buffer) = buffers.get_mut(&table) else {
            continue;
        };
        buffer.arrived += 1;
        match res {
            Ok(payload) => buffer.parts.push((window, payload)),
            Err(e) => {
                RunSummary::record(&mut summary.window_failures, "Window", window.to_string(), e)
            }
        }

        if buffer.arrived == buffer.expected {
            if let Some(buffer) = buffers.remove(&table) {
                let dir = config.output_dir.clone();
                let format = config.format.clone();
                write_set.spawn(async move {
                    let res = write_table(&dir, &table, &format, buffer.parts).await;
                    (table, res)
                });
            }
        }
    }

    while let Some(task) = write_set.join_next().await {
        let (table, res) = task?;
        match res {
            Ok(Some(written)) => {
                info_time!(
                    "Wrote {} rows of {} to {}",
                    written.rows,
                    table,
                    written.path.display()
                );
                summary.written.push(written);
            }
            Ok(None) => warn_time!("Every window of {} failed, no file written.", table),
            Err(e) => RunSummary::record(&mut summary.write_failures, "Write", table, e),
        }
    }
    summary.written.sort_by(|a, b| a.table.cmp(&b.table));

    info_time!(
        stage_start,
        "Fetched {} windows into {} files, {} gaps.",
        summary.windows_planned,
        summary.written.len(),
        summary.window_failures.len()
    );
    Ok(())
}

/// Hands the output directory to the bucket store: ensure the bucket, then upload.
pub async fn upload_with(store: &dyn BucketStore, bucket: &str, config: &Config) -> Result<usize> {
    store.ensure_bucket(bucket).await?;
    store.upload_directory(bucket, &config.output_dir).await
}

pub async fn upload_outputs(config: &Config, bucket: &str) -> Result<usize> {
    let store = LocalBucketStore::new(&config.bucket_root);
    upload_with(&store, bucket, config).await
}
