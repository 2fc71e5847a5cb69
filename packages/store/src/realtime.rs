//! PocketBase realtime (server-sent events) transport.
//!
//! The handshake is:
//!
//! 1. `GET /api/realtime` opens the event stream. The first event,
//!    `PB_CONNECT`, carries the `clientId` for this connection.
//! 2. `POST /api/realtime {clientId, subscriptions: [key]}` registers the
//!    topics this client wants.
//! 3. Every following event named `key` carries `{action, record}`.
//!
//! Each [`Subscription`] owns one connection. Releasing it aborts the
//! stream task.

use std::time::Duration;

use eventsource_stream::Event as SseEvent;
use futures::StreamExt;
use patrol_desk_store_models::RecordEvent;
use reqwest_eventsource::{Event, EventSource, retry::Never};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::subscription::EVENT_CHANNEL_BUFFER;
use crate::{StoreError, Subscription, retry};

/// Name of the handshake event.
pub const CONNECT_EVENT: &str = "PB_CONNECT";

/// How long to wait for the handshake event.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

fn stream_error(e: &reqwest_eventsource::Error) -> StoreError {
    StoreError::Realtime {
        message: e.to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectPayload {
    client_id: String,
}

/// Decodes the data of a subscription event. Returns `None` (and logs)
/// for payloads that are not `{action, record}`.
#[must_use]
pub fn decode_event(key: &str, event: &SseEvent) -> Option<RecordEvent> {
    if event.event != key {
        return None;
    }
    match serde_json::from_str::<RecordEvent>(&event.data) {
        Ok(record_event) => Some(record_event),
        Err(e) => {
            log::warn!("Dropping undecodable realtime event on {key}: {e}");
            None
        }
    }
}

/// Opens a realtime connection and subscribes it to `key`.
///
/// # Errors
///
/// Returns [`StoreError`] if the stream cannot be opened, the handshake
/// does not arrive in time, or the subscription cannot be registered.
pub async fn open(
    client: reqwest::Client,
    base_url: &str,
    token: Option<String>,
    key: String,
) -> Result<Subscription, StoreError> {
    let url = format!("{base_url}/api/realtime");
    log::debug!("Opening realtime stream {url} for {key}");

    let request = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream");
    let mut source = EventSource::new(request).map_err(|e| StoreError::Realtime {
        message: e.to_string(),
    })?;
    // Client IDs do not survive a reconnect; the feed owns reconnection.
    source.set_retry_policy(Box::new(Never));

    let client_id = tokio::time::timeout(CONNECT_TIMEOUT, async {
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => log::trace!("Realtime stream {url} open"),
                Ok(Event::Message(msg)) if msg.event == CONNECT_EVENT => {
                    let payload: ConnectPayload = serde_json::from_str(&msg.data)?;
                    return Ok(payload.client_id);
                }
                Ok(Event::Message(msg)) => {
                    log::debug!("Ignoring {} before handshake", msg.event);
                }
                Err(e) => return Err(stream_error(&e)),
            }
        }
        Err::<String, StoreError>(StoreError::Realtime {
            message: "stream closed before handshake".to_string(),
        })
    })
    .await
    .map_err(|_| StoreError::Realtime {
        message: format!("no {CONNECT_EVENT} within {CONNECT_TIMEOUT:?}"),
    })??;

    log::debug!("Realtime client {client_id} connected, subscribing to {key}");
    let body = serde_json::json!({
        "clientId": client_id,
        "subscriptions": [key],
    });
    retry::send_empty(|| {
        let request = client.post(&url).json(&body);
        match &token {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, token),
            None => request,
        }
    })
    .await?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
    let task_key = key.clone();
    let handle = tokio::spawn(async move {
        while let Some(event) = source.next().await {
            let msg = match event {
                Ok(Event::Message(msg)) => msg,
                Ok(Event::Open) => continue,
                Err(e) => {
                    log::warn!("Realtime stream for {task_key} failed: {e}");
                    source.close();
                    let _ = tx.send(Err(stream_error(&e))).await;
                    return;
                }
            };
            if let Some(record_event) = decode_event(&task_key, &msg)
                && tx.send(Ok(record_event)).await.is_err()
            {
                source.close();
                return;
            }
        }
        log::warn!("Realtime stream for {task_key} closed by server");
        let _ = tx
            .send(Err(StoreError::Realtime {
                message: "connection closed".to_string(),
            }))
            .await;
    });

    Ok(Subscription::new(key, rx, move || handle.abort()))
}

#[cfg(test)]
mod tests {
    use patrol_desk_store_models::RecordAction;

    use super::*;

    #[test]
    fn decodes_only_matching_subscription_events() {
        let event = SseEvent {
            event: "cases/*".to_string(),
            data: r#"{"action":"create","record":{"id":"2","status":"Open"}}"#.to_string(),
            id: String::new(),
            retry: None,
        };
        let decoded = decode_event("cases/*", &event).unwrap();
        assert_eq!(decoded.action, RecordAction::Create);
        assert!(decode_event("news/*", &event).is_none());

        let garbage = SseEvent {
            data: "not json".to_string(),
            ..event
        };
        assert!(decode_event("cases/*", &garbage).is_none());
    }
}
