//! Outbound activity-log client.
//!
//! Every persisted event is forwarded to `POST {backend}/activity-log`.
//! Requests run on a dedicated Tokio runtime thread fed through an
//! unbounded channel, so callers never wait on the network. Failures are
//! logged and dropped.

use crate::error::{MonitorError, Result};
use crate::store::Event;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Request body of `POST /activity-log`.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityLogEntry {
    pub session_id: Uuid,
    pub event_type: &'static str,
    pub data: serde_json::Value,
}

impl ActivityLogEntry {
    pub fn from_event(session_id: Uuid, event: &Event) -> Self {
        Self {
            session_id,
            event_type: event.kind().as_str(),
            data: event.data_json(),
        }
    }
}

/// Cloneable handle to the upload thread.
#[derive(Debug, Clone)]
pub struct BackendClient {
    session_id: Uuid,
    tx: mpsc::UnboundedSender<ActivityLogEntry>,
}

impl BackendClient {
    /// Starts the upload thread for `base_url`, minting a fresh session id.
    ///
    /// The thread exits once every handle has been dropped and the queued
    /// requests are sent.
    pub fn spawn(base_url: &str) -> Result<Self> {
        let endpoint = format!("{}/activity-log", base_url.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MonitorError::Backend(e.to_string()))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MonitorError::Backend(e.to_string()))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<ActivityLogEntry>();
        let session_id = Uuid::new_v4();

        let thread_endpoint = endpoint.clone();
        std::thread::Builder::new()
            .name("backend-upload".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(entry) = rx.recv().await {
                        post_entry(&client, &thread_endpoint, &entry).await;
                    }
                });
                tracing::debug!("Backend upload thread finished");
            })
            .map_err(|source| MonitorError::Spawn {
                name: "backend upload",
                source,
            })?;

        tracing::info!(%endpoint, %session_id, "Activity log upload enabled");
        Ok(Self { session_id, tx })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Queues one request per event. Never blocks.
    pub fn submit(&self, batch: &[Event]) {
        for event in batch {
            let entry = ActivityLogEntry::from_event(self.session_id, event);
            if self.tx.send(entry).is_err() {
                tracing::warn!("Backend upload thread is gone, dropping batch");
                return;
            }
        }
    }
}

async fn post_entry(client: &reqwest::Client, endpoint: &str, entry: &ActivityLogEntry) {
    match client.post(endpoint).json(entry).send().await {
        Ok(response) if response.status().is_success() => {
            tracing::trace!(event_type = entry.event_type, "Activity log entry uploaded");
        }
        Ok(response) => {
            tracing::warn!(
                status = %response.status(),
                event_type = entry.event_type,
                "Backend rejected activity log entry"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, event_type = entry.event_type, "Activity log upload failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventPayload;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn record(State(received): State<Received>, Json(body): Json<serde_json::Value>) -> StatusCode {
        received.lock().unwrap().push(body);
        StatusCode::CREATED
    }

    #[test]
    fn test_entry_shape() {
        let session_id = Uuid::new_v4();
        let event = Event::new(Utc::now(), EventPayload::FocusQuery { level: 6 });

        let json = serde_json::to_value(ActivityLogEntry::from_event(session_id, &event)).unwrap();
        assert_eq!(json["session_id"], session_id.to_string());
        assert_eq!(json["event_type"], "focus_level");
        assert_eq!(json["data"]["level"], 6);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_posts_one_request_per_event() {
        let received: Received = Arc::default();
        let app = Router::new()
            .route("/activity-log", post(record))
            .with_state(Arc::clone(&received));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = BackendClient::spawn(&format!("http://{addr}/")).unwrap();
        client.submit(&[
            Event::new(
                Utc::now(),
                EventPayload::WindowActivity {
                    title: "Editor".to_string(),
                },
            ),
            Event::new(Utc::now(), EventPayload::FocusQuery { level: 3 }),
        ]);

        for _ in 0..200 {
            if received.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let bodies = received.lock().unwrap().clone();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["event_type"], "active_window");
        assert_eq!(bodies[0]["data"]["title"], "Editor");
        assert_eq!(bodies[1]["session_id"], client.session_id().to_string());
    }

    #[test]
    fn test_unreachable_backend_does_not_block() {
        let client = BackendClient::spawn("http://127.0.0.1:9").unwrap();
        let started = std::time::Instant::now();
        client.submit(&[Event::new(Utc::now(), EventPayload::FocusQuery { level: 1 })]);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
