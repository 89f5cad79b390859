//! Cross-process transport seam for the broadcast bus.
//!
//! Frames travel as JSON `{event, data}` on the shared channel. A
//! subscription yields only frames published by *other* endpoints, so
//! receipt can fan out locally without looping an event back onto the
//! wire.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use super::EventFrame;

/// A subscription to the shared channel.
#[async_trait::async_trait]
pub trait PubSubSubscription: Send {
    /// Next frame from another endpoint, or `None` when the transport
    /// is gone.
    async fn recv(&mut self) -> Option<EventFrame>;
}

/// Cross-process publish/subscribe transport.
pub trait PubSub: Send + Sync {
    /// Publish a frame to the shared channel. Best-effort.
    fn publish(&self, frame: &EventFrame);

    /// Subscribe to frames from other endpoints.
    fn subscribe(&self) -> Box<dyn PubSubSubscription>;
}

/// In-process stand-in for an external broker: endpoints created from
/// the same hub see each other's frames, exactly like processes sharing
/// a broker channel. Single-node deployments attach one endpoint per
/// logical process.
pub struct LoopbackHub {
    tx: broadcast::Sender<(u64, String)>,
    next_endpoint: AtomicU64,
}

impl LoopbackHub {
    /// Create a hub for the `broadcast_channel`.
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(256);
        Arc::new(Self {
            tx,
            next_endpoint: AtomicU64::new(0),
        })
    }

    /// Create an endpoint representing one process on the channel.
    pub fn endpoint(self: &Arc<Self>) -> Arc<LoopbackPubSub> {
        Arc::new(LoopbackPubSub {
            hub: Arc::clone(self),
            endpoint_id: self.next_endpoint.fetch_add(1, Ordering::Relaxed),
        })
    }
}

/// One endpoint on a [`LoopbackHub`].
pub struct LoopbackPubSub {
    hub: Arc<LoopbackHub>,
    endpoint_id: u64,
}

impl PubSub for LoopbackPubSub {
    fn publish(&self, frame: &EventFrame) {
        let Ok(json) = serde_json::to_string(frame) else {
            tracing::error!(event = %frame.event, "failed to serialize event frame");
            return;
        };
        // Send fails only when no endpoint is subscribed; that is fine.
        let _ = self.hub.tx.send((self.endpoint_id, json));
    }

    fn subscribe(&self) -> Box<dyn PubSubSubscription> {
        Box::new(LoopbackSubscription {
            rx: self.hub.tx.subscribe(),
            own_endpoint: self.endpoint_id,
        })
    }
}

struct LoopbackSubscription {
    rx: broadcast::Receiver<(u64, String)>,
    own_endpoint: u64,
}

#[async_trait::async_trait]
impl PubSubSubscription for LoopbackSubscription {
    async fn recv(&mut self) -> Option<EventFrame> {
        loop {
            match self.rx.recv().await {
                Ok((origin, _)) if origin == self.own_endpoint => {}
                Ok((_, json)) => match serde_json::from_str(&json) {
                    Ok(frame) => return Some(frame),
                    Err(e) => {
                        tracing::error!(error = %e, "invalid JSON on broadcast channel");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    tracing::warn!(count, "pub/sub subscription lagged, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use tokio_util::sync::CancellationToken;

    fn frame(event: &str) -> EventFrame {
        EventFrame {
            event: event.to_string(),
            data: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn subscription_skips_own_frames() {
        let hub = LoopbackHub::new();
        let a = hub.endpoint();
        let b = hub.endpoint();

        let mut sub_a = a.subscribe();
        a.publish(&frame("own"));
        b.publish(&frame("peer"));

        let received = sub_a.recv().await.expect("frame");
        assert_eq!(received.event, "peer");
    }

    #[tokio::test]
    async fn listener_fans_out_remote_frames_locally() {
        let hub = LoopbackHub::new();
        let local = Arc::new(Broadcaster::with_pubsub(hub.endpoint()));
        let remote = Broadcaster::with_pubsub(hub.endpoint());

        let cancel = CancellationToken::new();
        let handle = local
            .spawn_pubsub_listener(cancel.clone())
            .expect("listener");
        let mut rx = local.register("observer");

        remote.broadcast("session_update", serde_json::json!({"id": "d1"}));

        let received = rx.recv().await.expect("frame");
        assert_eq!(received.event, "session_update");
        assert_eq!(received.data["id"], "d1");

        cancel.cancel();
        handle.await.expect("listener exits");
    }

    #[tokio::test]
    async fn local_publish_is_not_duplicated_through_the_listener() {
        let hub = LoopbackHub::new();
        let local = Arc::new(Broadcaster::with_pubsub(hub.endpoint()));

        let cancel = CancellationToken::new();
        let _handle = local.spawn_pubsub_listener(cancel.clone());
        let mut rx = local.register("observer");

        local.broadcast("session_update", serde_json::Value::Null);

        let first = rx.recv().await.expect("frame");
        assert_eq!(first.event, "session_update");
        // No echo arrives from the transport.
        let echo = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(echo.is_err());

        cancel.cancel();
    }
}
