//! HTTP client wrapper for listing and detail pages.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::config::HarvestConfig;
use crate::error::{HarvesterError, Result};

/// Maximum number of retry attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Create a configured HTTP client.
///
/// Every call returns a fresh client with its own connection pool, so
/// separate clients never share session state.
pub fn create_client(config: &HarvestConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(config.http_timeout)
        .user_agent(config.user_agent.as_str())
        .build()?;
    Ok(client)
}

/// Download a page as text with retry logic.
///
/// Retries with exponential backoff on connection errors and 5xx responses.
/// Timeouts are returned immediately: the timeout already bounds the wait.
pub fn download_text(client: &Client, url: &str) -> Result<String> {
    let mut last_error: Option<String> = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 500ms, 1000ms
            let delay = RETRY_BASE_DELAY_MS * (1 << (attempt - 1));
            tracing::debug!(attempt, delay_ms = delay, url, "Retrying after delay");
            thread::sleep(Duration::from_millis(delay));
        }

        match client.get(url).send() {
            Ok(response) => {
                let status = response.status();

                if status.is_server_error() {
                    tracing::warn!(
                        status = %status,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        url,
                        "Server error, will retry"
                    );
                    last_error = Some(format!("Server error: {status}"));
                    continue;
                }

                // Client errors (4xx) won't succeed on retry
                let response = response.error_for_status()?;
                return Ok(response.text()?);
            }
            Err(e) if e.is_connect() => {
                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = MAX_RETRIES,
                    url,
                    "Connection error, will retry"
                );
                last_error = Some(e.to_string());
            }
            Err(e) => return Err(HarvesterError::Http(e)),
        }
    }

    Err(HarvesterError::RetriesExhausted {
        attempts: MAX_RETRIES,
        message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Whether an error is worth retrying at a higher level (e.g. page advance).
pub fn is_transient(err: &HarvesterError) -> bool {
    match err {
        HarvesterError::Http(e) => e.is_timeout() || e.is_connect(),
        HarvesterError::RetriesExhausted { .. } => true,
        _ => false,
    }
}
