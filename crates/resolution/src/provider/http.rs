//! JSON-over-HTTP plumbing shared by the REST providers.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::errors::ProviderError;

/// `GET url` and decode the body, bounded by `deadline`.
///
/// A 404 is `Ok(None)`: the upstream doesn't know the subject, which is an
/// empty answer rather than a failure.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    provider: &str,
    url: &str,
    deadline: Instant,
) -> Result<Option<T>, ProviderError> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    let response = client
        .get(url)
        .timeout(remaining)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    provider: provider.to_string(),
                    elapsed_ms: remaining.as_millis() as u64,
                }
            } else {
                ProviderError::Network {
                    provider: provider.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(ProviderError::Http {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .json::<T>()
        .await
        .map(Some)
        .map_err(|e| ProviderError::Malformed {
            provider: provider.to_string(),
            message: e.to_string(),
        })
}

/// Client with the crate's user agent and a hard upper bound per request.
pub(crate) fn build_client(user_agent: &str, timeout: std::time::Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .unwrap_or_else(|_| Client::new())
}
