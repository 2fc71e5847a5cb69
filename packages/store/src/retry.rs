//! Backoff around `reqwest` sends.
//!
//! PocketBase and the messaging webhook both sit behind flaky links at
//! stations, so every outbound request goes through [`send_json`] or
//! [`send_empty`]. A failed attempt is classified as either worth repeating
//! (timeouts, dropped connections, 429, 5xx) or final (other 4xx), and
//! repeatable failures back off 2s, 4s, 8s.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};

use crate::StoreError;

/// Send attempts after the first.
const SEND_RETRIES: u32 = 3;

/// Re-fetches after a response body that would not decode.
const DECODE_RETRIES: u32 = 2;

/// Characters of a bad body kept in logs and error messages.
const PREVIEW_CHARS: usize = 500;

enum Attempt {
    Done(Response),
    Again(StoreError),
    Fatal(StoreError),
}

fn backoff(round: u32) -> Duration {
    Duration::from_secs(1u64 << round)
}

/// Sends the request built by `build` and decodes the body as JSON.
///
/// `build` runs once per attempt because `send()` consumes the builder.
///
/// # Errors
///
/// * [`StoreError::Status`] for a rejected request, or a 429/5xx that
///   outlasted every retry
/// * [`StoreError::Http`] when the connection never succeeded
/// * [`StoreError::Json`] when the body still would not decode after
///   re-fetching
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build: F) -> Result<serde_json::Value, StoreError>
where
    F: Fn() -> RequestBuilder,
{
    let mut round = 0;
    loop {
        let response = send_with_backoff(&build).await?;
        let url = response.url().clone();

        let failure = match response.text().await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    log::warn!("Undecodable body from {url}: {e} ({})", preview(&text));
                    StoreError::Json(e)
                }
            },
            Err(e) => {
                log::warn!("Could not read body from {url}: {e}");
                StoreError::Http(e)
            }
        };

        round += 1;
        if round > DECODE_RETRIES {
            log::error!("Giving up on {url}");
            return Err(failure);
        }
        log::warn!("Re-fetching {url} ({round}/{DECODE_RETRIES})");
        tokio::time::sleep(backoff(round)).await;
    }
}

/// Sends a request whose body does not matter (deletes, realtime
/// subscription updates).
///
/// # Errors
///
/// Same as [`send_json`], minus decoding.
#[allow(clippy::future_not_send)]
pub async fn send_empty<F>(build: F) -> Result<(), StoreError>
where
    F: Fn() -> RequestBuilder,
{
    send_with_backoff(&build).await.map(drop)
}

#[allow(clippy::future_not_send)]
async fn send_with_backoff<F>(build: &F) -> Result<Response, StoreError>
where
    F: Fn() -> RequestBuilder,
{
    let mut round = 0;
    loop {
        match attempt(build()).await {
            Attempt::Done(response) => return Ok(response),
            Attempt::Fatal(e) => return Err(e),
            Attempt::Again(e) if round >= SEND_RETRIES => {
                log::error!("Out of retries: {e}");
                return Err(e);
            }
            Attempt::Again(e) => {
                round += 1;
                log::warn!("{e}; retry {round}/{SEND_RETRIES}");
                tokio::time::sleep(backoff(round)).await;
            }
        }
    }
}

#[allow(clippy::future_not_send)]
async fn attempt(request: RequestBuilder) -> Attempt {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) if is_transient(&e) => return Attempt::Again(StoreError::Http(e)),
        Err(e) => return Attempt::Fatal(StoreError::Http(e)),
    };

    let status = response.status();
    if should_retry(status) {
        return Attempt::Again(StoreError::Status {
            status: status.as_u16(),
            message: format!("HTTP {status}"),
        });
    }
    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        return Attempt::Fatal(StoreError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    Attempt::Done(response)
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
}

/// PocketBase errors look like `{"code":400,"message":"...","data":{}}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| preview(body))
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
