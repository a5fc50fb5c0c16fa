use reqwest::Client;
use tokio::task::spawn_blocking;

use crate::parse::{extract_table_names, parse_row_count};
use crate::plan::Window;
use crate::retry::{with_retry, RetryConfig};
use crate::write::Payload;
use crate::{Error, Result};

/// Requests a page and returns its body, treating non 2xx statuses as errors.
async fn request_text(client: &Client, url: &str) -> Result<String> {
    let res = client.get(url).send().await?.error_for_status()?;
    let text = res.text().await?;
    Ok(text)
}

/// Downloads a discovery page and returns the table names linked from it.
pub async fn request_table_names(
    client: Client,
    url: String,
    marker: String,
    retry: RetryConfig,
) -> Result<Vec<String>> {
    let html = with_retry(&retry, &url, || request_text(&client, &url)).await?;
    // Parsed documents are not `Send`, keep them off the async workers.
    let names = spawn_blocking(move || extract_table_names(&html, &marker)).await??;
    Ok(names)
}

pub fn count_url(base_url: &str, table: &str) -> String {
    format!("{base_url}/{table}/count")
}

pub fn rows_url(base_url: &str, window: &Window, format: &str) -> String {
    format!(
        "{base_url}/{}/rows/{}:{}/{format}",
        window.table, window.start, window.end
    )
}

/// Queries `{base}/{table}/count` for the number of rows in `table`.
/// Counts above `max_rows` are rejected instead of being planned.
pub async fn request_row_count(
    client: Client,
    base_url: String,
    table: String,
    max_rows: u64,
    retry: RetryConfig,
) -> Result<u64> {
    let url = count_url(&base_url, &table);
    let body = with_retry(&retry, &url, || request_text(&client, &url)).await?;
    let count = spawn_blocking(move || parse_row_count(&body)).await??;
    if count > max_rows {
        return Err(Error::CountOutOfRange {
            count,
            max: max_rows,
        });
    }
    Ok(count)
}

/// Fetches the rows of one window. A payload without a header line or with fewer
/// data lines than the window spans is rejected, so it can be reported as a gap.
pub async fn request_window(
    client: Client,
    base_url: String,
    format: String,
    window: Window,
    retry: RetryConfig,
) -> Result<Payload> {
    let url = rows_url(&base_url, &window, &format);
    let text = with_retry(&retry, &url, || request_text(&client, &url)).await?;

    let payload = Payload::new(text);
    if payload.header().is_none() {
        return Err(Error::EmptyPayload);
    }
    let received = payload.data_line_count() as u64;
    if received < window.row_span() {
        return Err(Error::PartialPayload {
            expected: window.row_span(),
            received,
        });
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_ROWS;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn no_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        }
    }

    fn window(start: u64, end: u64) -> Window {
        Window {
            table: "FOO".into(),
            start,
            end,
            seq: 0,
        }
    }

    #[test]
    fn endpoint_urls() {
        assert_eq!(count_url("http://h/ef", "FOO"), "http://h/ef/FOO/count");
        assert_eq!(
            rows_url("http://h/ef", &window(10_000, 19_999), "csv"),
            "http://h/ef/FOO/rows/10000:19999/csv"
        );
    }

    #[tokio::test]
    async fn row_count_is_parsed_from_wrapper() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/FOO/count"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<Envirofacts><RequestRecordCount>1234</RequestRecordCount></Envirofacts>",
            ))
            .mount(&server)
            .await;

        let count = request_row_count(Client::new(), server.uri(), "FOO".into(), MAX_ROWS, no_retry())
            .await
            .unwrap();
        assert_eq!(count, 1234);
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/FOO/count"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/FOO/count"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<count>7</count>"))
            .mount(&server)
            .await;

        let retry = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            jitter: false,
            ..RetryConfig::default()
        };
        let count = request_row_count(Client::new(), server.uri(), "FOO".into(), MAX_ROWS, retry)
            .await
            .unwrap();
        assert_eq!(count, 7);
    }

    #[tokio::test]
    async fn missing_table_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/NOPE/count"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let res = request_row_count(
            Client::new(),
            server.uri(),
            "NOPE".into(),
            MAX_ROWS,
            RetryConfig::default(),
        )
        .await;
        assert!(matches!(res, Err(Error::Reqwest(_))));
    }

    #[tokio::test]
    async fn implausible_count_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/HUGE/count"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<count>18446744073709551615</count>"),
            )
            .mount(&server)
            .await;

        let res = request_row_count(Client::new(), server.uri(), "HUGE".into(), MAX_ROWS, no_retry()).await;
        assert!(matches!(
            res,
            Err(Error::CountOutOfRange { count: u64::MAX, max: MAX_ROWS })
        ));
    }

    #[tokio::test]
    async fn short_and_empty_windows_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/FOO/rows/0:2/csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("id,name\n1,a\n2,b\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/FOO/rows/3:4/csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/FOO/rows/5:6/csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("id,name\n6,f\n7,g"))
            .mount(&server)
            .await;

        let fetch = |w: Window| request_window(Client::new(), server.uri(), "csv".into(), w, no_retry());

        let short = fetch(window(0, 2)).await;
        assert!(matches!(
            short,
            Err(Error::PartialPayload { expected: 3, received: 2 })
        ));
        assert!(matches!(fetch(window(3, 4)).await, Err(Error::EmptyPayload)));

        let full = fetch(window(5, 6)).await.unwrap();
        assert_eq!(full.data_line_count(), 2);
    }
}
