// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::{FetchError, Result};
use crate::models::HttpConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch a URL and return its body, treating any non-2xx status as failure.
pub async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: u64,
) -> std::result::Result<String, FetchError> {
    let response = client.get(url).send().await.map_err(|e| classify(e, timeout_secs))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    response.text().await.map_err(|e| classify(e, timeout_secs))
}

fn classify(error: reqwest::Error, timeout_secs: u64) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout_secs)
    } else {
        FetchError::Http(error)
    }
}
