//! Event broadcast for catalog progress and save notifications.
//!
//! Events are JSON lines so any renderer (terminal, web socket, log sink)
//! can subscribe without depending on engine types. Emitting never alters
//! engine state.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_BUFFER: usize = 256;

/// Emitted after every catalog page.
pub const CATALOG_PROGRESS: &str = "catalog.progress";
/// Emitted when a fetched snapshot is stored.
pub const CATALOG_LOADED: &str = "catalog.loaded";
/// Emitted when a catalog fetch fails.
pub const CATALOG_FAILED: &str = "catalog.failed";
/// Emitted after the persistence service accepts a scope write.
pub const SCOPE_SAVED: &str = "scope.saved";

/// "loaded X of Y" progress payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogProgress {
    pub loaded: usize,
    /// Advisory total, when the provider reports one.
    pub total: Option<usize>,
    pub pages: usize,
}

impl std::fmt::Display for CatalogProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.total {
            Some(total) => write!(f, "loaded {} of {} projects", self.loaded, total),
            None => write!(f, "loaded {} projects", self.loaded),
        }
    }
}

/// Broadcast channel for engine events (JSON lines).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<String>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl EventBus {
    /// Create a new event bus; the buffer is clamped to at least the default.
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(DEFAULT_BUFFER);
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Emit a structured event with payload. Without subscribers this is a no-op.
    pub fn emit<T: Serialize>(&self, event: &str, data: &T) {
        let payload = json!({
            "event": event,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        });
        match serde_json::to_string(&payload) {
            Ok(serialized) => {
                let _ = self.sender.send(serialized);
            }
            Err(err) => warn!("Failed to serialize event {}: {}", event, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn emit_sends_json_with_event_data_and_timestamp() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(
            CATALOG_PROGRESS,
            &CatalogProgress {
                loaded: 200,
                total: Some(250),
                pages: 1,
            },
        );

        let msg = tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("broadcast recv failed");

        let parsed: serde_json::Value = serde_json::from_str(&msg).expect("invalid json");
        assert_eq!(parsed["event"], "catalog.progress");
        assert_eq!(parsed["data"]["loaded"], 200);
        assert_eq!(parsed["data"]["total"], 250);
        let ts = parsed["timestamp"].as_str().expect("timestamp should be string");
        chrono::DateTime::parse_from_rfc3339(ts).expect("timestamp should be RFC3339");
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new(1);
        bus.emit(SCOPE_SAVED, &json!({ "mode": "all" }));
    }

    #[test]
    fn progress_display() {
        let with_total = CatalogProgress {
            loaded: 10,
            total: Some(20),
            pages: 1,
        };
        assert_eq!(with_total.to_string(), "loaded 10 of 20 projects");
        let open = CatalogProgress {
            loaded: 10,
            total: None,
            pages: 1,
        };
        assert_eq!(open.to_string(), "loaded 10 projects");
    }
}
