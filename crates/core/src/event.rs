//! Session event system.
//!
//! Sessions publish events as they talk to the model and run tools. Loggers,
//! cost trackers and UIs subscribe without the session knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All events a session publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A completion request returned
    CompletionReceived {
        session_id: String,
        model: String,
        iteration: u32,
        prompt_tokens: u32,
        completion_tokens: u32,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool handler ran
    ToolDispatched {
        session_id: String,
        tool_name: String,
        call_id: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A completion request failed
    CompletionFailed {
        session_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A task ended: "completed", "reply" or "not_converged"
    Finished {
        session_id: String,
        outcome: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<SessionEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SessionEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(SessionEvent::ToolDispatched {
            session_id: "s1".into(),
            tool_name: "lookup".into(),
            call_id: "call_1".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            SessionEvent::ToolDispatched { tool_name, success, .. } => {
                assert_eq!(tool_name, "lookup");
                assert!(success);
            }
            _ => panic!("Expected ToolDispatched event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(SessionEvent::CompletionFailed {
            session_id: "s1".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
