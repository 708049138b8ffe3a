use serde::Serialize;
use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Broadcast hub behind one named SSE stream.
pub struct SseHub {
    name: &'static str,
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// `capacity` bounds how far a slow subscriber may lag before it skips events.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { name, sender }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Serialize `payload` as event `event` and fan it out.
    ///
    /// Returns how many subscribers got it. Nothing is serialized while nobody listens.
    pub fn publish<T: Serialize>(&self, event: &str, payload: &T) -> serde_json::Result<usize> {
        if self.sender.receiver_count() == 0 {
            return Ok(0);
        }
        let event = ServerEvent::json(Some(event.to_string()), payload)?;
        Ok(self.sender.send(event).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Size {
        size: usize,
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let hub = SseHub::new("lobby", 4);
        assert_eq!(hub.publish("queue.size", &Size { size: 2 }).unwrap(), 0);
    }

    #[test]
    fn subscribers_receive_named_json_events() {
        let hub = SseHub::new("lobby", 4);
        let mut rx = hub.subscribe();

        assert_eq!(hub.publish("queue.size", &Size { size: 2 }).unwrap(), 1);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some("queue.size"));
        assert_eq!(event.data, r#"{"size":2}"#);
    }
}
