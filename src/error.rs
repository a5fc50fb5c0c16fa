use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("The selector you are trying to scrape for is invalid. Selector: {0}")]
    ParseMissingSelector(String),
    #[error("Count response is malformed: {0}")]
    MalformedCount(String),
    #[error("Row count {count} is above the accepted maximum of {max}")]
    CountOutOfRange { count: u64, max: u64 },
    #[error("Window payload was empty, not even a header line was returned.")]
    EmptyPayload,
    #[error("Window payload is short: expected {expected} rows, received {received}")]
    PartialPayload { expected: u64, received: u64 },

    #[error("Invalid configuration for {key}: {message}")]
    Config { key: String, message: String },
    #[error("Bucket {0} does not exist.")]
    MissingBucket(String),
    #[error("Run finished with {failures} failed items, see the summary above.")]
    IncompleteRun { failures: usize },

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),

    #[error("The request limiter was closed while tasks were still waiting on it.")]
    RuntimeLimiterClosed,

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl From<tokio::sync::AcquireError> for Error {
    fn from(_value: tokio::sync::AcquireError) -> Self {
        Error::RuntimeLimiterClosed
    }
}

impl Error {
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            key: key.into(),
            message: message.into(),
        }
    }
}
