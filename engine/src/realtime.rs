// Realtime fan-out
//
// Best-effort broadcast of engine events to connected dashboard sockets.
// Emitting never fails the caller: with no subscribers the event is
// simply dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub event_type: String,
    pub tenant_id: Uuid,
    pub payload: JsonValue,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RealtimeHub {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self { sender }
    }

    pub fn emit(&self, event_type: &str, tenant_id: Uuid, payload: JsonValue) {
        let event = RealtimeEvent {
            event_type: event_type.to_string(),
            tenant_id,
            payload,
            timestamp: Utc::now(),
        };

        // Err here only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let hub = RealtimeHub::new();
        let mut receiver = hub.subscribe();
        let tenant_id = Uuid::new_v4();

        hub.emit("notification.created", tenant_id, json!({"title": "Checkout due"}));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type, "notification.created");
        assert_eq!(event.tenant_id, tenant_id);
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let hub = RealtimeHub::new();
        hub.emit("notification.created", Uuid::new_v4(), json!({}));
    }
}
