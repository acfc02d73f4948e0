use super::SourceFetchError;
use crate::retry::RetryPolicy;
use futures::StreamExt;
use std::time::Duration;

/// Largest response body accepted from a source (10MB).
pub(crate) const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// GETs `url` and returns the body, retrying transient failures.
///
/// # Behavior
///
/// - Each attempt is bounded by `timeout`
/// - HTTP 429 and 5xx are retried per `retry`; other non-2xx statuses fail immediately
/// - Bodies larger than [`MAX_BODY_SIZE`] are rejected
/// - Bodies shorter than their Content-Length are retried as incomplete downloads
pub(crate) async fn get_bytes(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    retry: RetryPolicy,
) -> Result<Vec<u8>, SourceFetchError> {
    let mut retry_count = 0;

    loop {
        let response = tokio::time::timeout(timeout, client.get(url).send())
            .await
            .map_err(|_| SourceFetchError::Timeout)?
            .map_err(SourceFetchError::Network)?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retry_count >= retry.max_retries {
                return Err(SourceFetchError::RateLimited(retry.max_retries));
            }
            let delay = retry.delay_for(retry_count);
            tracing::warn!(
                url = %url,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if status.is_server_error() {
            if retry_count >= retry.max_retries {
                return Err(SourceFetchError::HttpStatus(status.as_u16()));
            }
            let delay = retry.delay_for(retry_count);
            tracing::warn!(
                url = %url,
                status = %status,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Server error, retrying after delay"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if !status.is_success() {
            return Err(SourceFetchError::HttpStatus(status.as_u16()));
        }

        match tokio::time::timeout(timeout, read_limited_bytes(response, MAX_BODY_SIZE)).await {
            Err(_) => return Err(SourceFetchError::Timeout),
            Ok(Ok(bytes)) => return Ok(bytes),
            Ok(Err(SourceFetchError::IncompleteResponse { expected, received })) => {
                if retry_count >= retry.max_retries {
                    return Err(SourceFetchError::IncompleteResponse { expected, received });
                }
                let delay = retry.delay_for(retry_count);
                tracing::debug!(
                    url = %url,
                    expected = expected,
                    received = received,
                    attempt = retry_count + 1,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Ok(Err(e)) => return Err(e),
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, SourceFetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(SourceFetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(SourceFetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(SourceFetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(SourceFetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
