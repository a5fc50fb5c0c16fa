//! GREENHOUSE GAS TABLE HARVESTER
//! Discovers the summary tables advertised on the EPA page, counts their rows,
//! splits them into API sized windows and stores every table as one file.

mod macros;

pub mod config;
mod error;
pub mod parse;
pub mod plan;
pub mod process;
pub mod request;
pub mod retry;
pub mod storage;
pub mod write;

pub use config::Config;
pub use error::{Error, Result};
pub use plan::{plan_windows, Window};
pub use process::{run_pipeline, RunSummary};
pub use storage::{BucketStore, LocalBucketStore};

const DISCOVERY_URL: &str = "https://www.epa.gov/enviro/greenhouse-gas-summary-model";
const BASE_URL: &str = "https://data.epa.gov/efservice";
/// Query parameter carrying the table name in the discovery page links.
const TABLE_MARKER: &str = "p_table_name";
const REQUEST_FORMAT: &str = "csv";
/// The API refuses to return more rows than this in a single request.
pub const MAX_WINDOW: u64 = 10_000;
/// Largest row count accepted from the count endpoint.
pub const MAX_ROWS: u64 = 1_000_000_000;
const MAX_CONCURRENT_REQUESTS: usize = 32;
const REQUEST_TIMEOUT_SECS: u64 = 60;
const OUTPUT_DIR: &str = ".";
