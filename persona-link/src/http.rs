//! Shared HTTP plumbing for the conversation service

use crate::error::{LinkError, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Largest response body accepted from the service
pub const MAX_RESPONSE_SIZE: usize = 100 * 1024;

/// Error bodies are cut to this length
pub const MAX_ERROR_TEXT_SIZE: usize = 10_000;

pub(crate) fn build_client(timeout: Option<Duration>) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| LinkError::Network(format!("Failed to create HTTP client: {}", e)))
}

/// Map a non-2xx response to `LinkError::Api`, otherwise return it untouched
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let bytes = response.bytes().await.unwrap_or_default();
    let end = bytes.len().min(MAX_ERROR_TEXT_SIZE);
    Err(LinkError::Api {
        status: status.as_u16(),
        body: String::from_utf8_lossy(&bytes[..end]).to_string(),
    })
}

/// Read and decode a JSON body, enforcing `MAX_RESPONSE_SIZE`
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    if let Some(content_length) = response.content_length() {
        if content_length > MAX_RESPONSE_SIZE as u64 {
            return Err(LinkError::InvalidResponse(format!(
                "Response too large (max {} bytes)",
                MAX_RESPONSE_SIZE
            )));
        }
    }

    // Chunked bodies carry no length; check after reading
    let bytes = response
        .bytes()
        .await
        .map_err(|e| LinkError::Network(format!("Failed to read response: {}", e)))?;
    if bytes.len() > MAX_RESPONSE_SIZE {
        return Err(LinkError::InvalidResponse(format!(
            "Response too large (max {} bytes)",
            MAX_RESPONSE_SIZE
        )));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| LinkError::InvalidResponse(format!("Failed to parse response: {}", e)))
}
