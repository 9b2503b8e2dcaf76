use std::time::Duration;

use anyhow::Context;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{SourceError, SourceResult};

pub fn build_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(crate::constants::USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed creating HTTP client")
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

pub fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    let value = value?.to_str().ok()?.trim();
    let secs = value.parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}

pub fn truncate_for_log(text: &str) -> String {
    let trimmed = text.trim();
    let max_len = 300usize;
    if trimmed.len() <= max_len {
        return trimmed.to_string();
    }
    let mut end = max_len;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

/// GET `url` with `query`. Transient failures are retried up to `max_retries`
/// times after the first attempt, with exponential backoff. Non-retryable
/// statuses come back as `SourceError::Status`.
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
    max_retries: u32,
) -> SourceResult<T> {
    let attempts = max_retries.saturating_add(1);
    let mut backoff = Duration::from_millis(500);

    for attempt in 1..=attempts {
        match client.get(url).query(query).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    let body = resp.text().await?;
                    return Ok(serde_json::from_str(&body)?);
                }

                let retry_after = parse_retry_after(resp.headers().get(RETRY_AFTER));
                let body = resp.text().await.unwrap_or_default();
                if is_retryable_status(status) && attempt < attempts {
                    tracing::debug!(%status, attempt, url, "retrying after transient status");
                    tokio::time::sleep(retry_after.unwrap_or(backoff)).await;
                    backoff = (backoff + backoff).min(Duration::from_secs(30));
                    continue;
                }
                return Err(SourceError::Status {
                    status: status.as_u16(),
                    body: truncate_for_log(&body),
                });
            }
            Err(err) => {
                if attempt == attempts {
                    return Err(err.into());
                }
                tracing::debug!(attempt, url, error = %err, "retrying after request failure");
                tokio::time::sleep(backoff).await;
                backoff = (backoff + backoff).min(Duration::from_secs(30));
            }
        }
    }

    Err(SourceError::Network(format!("no attempts made for {url}")))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::net::SocketAddr;

    /// Serves `router` on an ephemeral local port for the rest of the test.
    pub async fn serve(router: axum::Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    /// An address nothing listens on.
    pub async fn closed_port() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }
}
