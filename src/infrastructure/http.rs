// src/infrastructure/http.rs
use crate::domain::GenerationError;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::time::Duration;

/// Blocking client with an optional overall timeout. Zero disables the timeout.
pub fn build_client(timeout_secs: u64) -> Result<Client, GenerationError> {
    let mut builder = Client::builder();
    builder = if timeout_secs == 0 {
        builder.timeout(None)
    } else {
        builder.timeout(Duration::from_secs(timeout_secs))
    };
    builder
        .build()
        .map_err(|e| GenerationError::Unavailable(format!("Failed to build HTTP client: {}", e)))
}

pub fn map_request_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Network(e.to_string())
    }
}

/// Pass successful responses through, turn everything else into a typed error.
pub fn check_status(response: Response) -> Result<Response, GenerationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(status_error(status, body))
}

pub fn status_error(status: StatusCode, body: String) -> GenerationError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Auth(body),
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited(body),
        _ => GenerationError::Api {
            status: status.as_u16(),
            message: body,
        },
    }
}

pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
