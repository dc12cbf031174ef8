use std::time::Duration;

use crate::error::{AppError, AppResult};

const MAX_RETRIES: usize = 4;
const MAX_BACKOFF_SECS: u64 = 30;

/// Send an idempotent request, retrying on 429, 5xx and network errors.
///
/// Honors `Retry-After` (seconds). Any other status is handed back to the
/// caller, which decides what 401/404/etc. mean for it.
pub async fn send_with_backoff<F>(service: &str, make_request: F) -> AppResult<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut backoff_secs: u64 = 1;

    for attempt in 0..MAX_RETRIES {
        match (make_request)().send().await {
            Ok(resp) => {
                if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
                    || resp.status().is_server_error()
                {
                    let wait_secs = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|h| h.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(|s| s.min(MAX_BACKOFF_SECS))
                        .unwrap_or(backoff_secs);

                    if attempt + 1 >= MAX_RETRIES {
                        let status = resp.status();
                        let err_text = resp.text().await.unwrap_or_default();
                        return Err(AppError::ServiceUnavailable(format!(
                            "{} failed after {} attempts ({}): {}",
                            service,
                            attempt + 1,
                            status,
                            err_text
                        )));
                    }

                    tracing::warn!(
                        "Transient {} error (status: {}). Retrying in {}s (attempt {}/{})",
                        service,
                        resp.status(),
                        wait_secs,
                        attempt + 1,
                        MAX_RETRIES
                    );

                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                    backoff_secs = std::cmp::min(backoff_secs * 2, MAX_BACKOFF_SECS);
                    continue;
                }

                return Ok(resp);
            }
            Err(e) => {
                if attempt + 1 >= MAX_RETRIES {
                    return Err(e.into());
                }
                tracing::warn!(
                    "{} request failed: {}. Retrying in {}s (attempt {}/{})",
                    service,
                    e,
                    backoff_secs,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                backoff_secs = std::cmp::min(backoff_secs * 2, MAX_BACKOFF_SECS);
            }
        }
    }

    Err(AppError::ServiceUnavailable(format!(
        "Exceeded {} retry attempts",
        service
    )))
}
