//! Event fan-out for live observers.
//!
//! Two levels: local fan-out to registered client channels (bounded; a
//! slow or closed client is unregistered rather than blocking the
//! producer), and cross-process fan-out through a [`PubSub`] transport
//! on the `broadcast_channel` channel. Frames received from the
//! transport are fanned out locally only — never republished — so two
//! processes cannot loop an event between them.

pub mod pubsub;
pub mod strategy;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dialog::{Dialog, Message};

pub use pubsub::{LoopbackHub, PubSub, PubSubSubscription};

/// Bounded per-client channel capacity.
pub const CHANNEL_CAPACITY: usize = 64;

/// Pub/sub channel name shared by all processes.
pub const BROADCAST_CHANNEL: &str = "broadcast_channel";

/// Event names observers can subscribe to.
pub mod events {
    /// A message changed (status transition or text extension).
    pub const MESSAGE_UPDATE: &str = "message_update";
    /// An assistant message reached `delivered`.
    pub const COMPLETION_FINISHED: &str = "completion_finished";
    /// A message reached `failed`.
    pub const MESSAGE_ERROR: &str = "message_error";
    /// A dialog changed.
    pub const SESSION_UPDATE: &str = "session_update";
    /// A dialog is waiting for human input.
    pub const USER_INPUT_REQUIRED: &str = "user_input_required";
    /// A dialog completed.
    pub const SESSION_COMPLETED: &str = "session_completed";
    /// A dialog failed.
    pub const SESSION_ERROR: &str = "session_error";
    /// The process is shutting down.
    pub const SERVER_SHUTDOWN: &str = "server_shutdown";
}

/// One event on the bus: `{event, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name.
    pub event: String,
    /// JSON payload.
    pub data: Value,
}

/// Two-level publish/subscribe hub.
pub struct Broadcaster {
    clients: Mutex<HashMap<String, mpsc::Sender<EventFrame>>>,
    pubsub: Option<Arc<dyn PubSub>>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    /// Local-only broadcaster (no cross-process transport).
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            pubsub: None,
        }
    }

    /// Broadcaster with a cross-process transport attached.
    pub fn with_pubsub(pubsub: Arc<dyn PubSub>) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            pubsub: Some(pubsub),
        }
    }

    fn clients(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::Sender<EventFrame>>> {
        match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a client and return its event channel.
    pub fn register(&self, client_id: impl Into<String>) -> mpsc::Receiver<EventFrame> {
        let client_id = client_id.into();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut clients = self.clients();
        clients.insert(client_id.clone(), tx);
        tracing::info!(client_id = %client_id, total = clients.len(), "registered observer");
        rx
    }

    /// Unregister a client, closing its channel.
    pub fn unregister(&self, client_id: &str) {
        let mut clients = self.clients();
        if clients.remove(client_id).is_some() {
            tracing::info!(client_id = %client_id, remaining = clients.len(), "unregistered observer");
        }
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients().len()
    }

    /// Broadcast an event to all local clients and the cross-process
    /// transport.
    pub fn broadcast(&self, event: &str, data: Value) {
        let frame = EventFrame {
            event: event.to_string(),
            data,
        };
        self.local_broadcast(&frame);

        if let Some(pubsub) = &self.pubsub {
            pubsub.publish(&frame);
        }
    }

    /// Fan an event out to local clients only. A full or closed channel
    /// unregisters the client.
    pub(crate) fn local_broadcast(&self, frame: &EventFrame) {
        let mut clients = self.clients();
        if clients.is_empty() {
            tracing::debug!(event = %frame.event, "no observers for event");
            return;
        }

        let mut dropped = Vec::new();
        for (client_id, tx) in clients.iter() {
            if let Err(e) = tx.try_send(frame.clone()) {
                tracing::warn!(client_id = %client_id, error = %e, "dropping slow or closed observer");
                dropped.push(client_id.clone());
            }
        }
        for client_id in dropped {
            clients.remove(&client_id);
        }
    }

    /// Broadcast the events a message update implies, per the message
    /// strategy.
    pub fn message_update(&self, message: &Message) {
        for (event, data) in strategy::message_events(message) {
            self.broadcast(event, data);
        }
    }

    /// Broadcast the events a dialog update implies, per the dialog
    /// strategy.
    pub fn dialog_update(&self, dialog: &Dialog) {
        for (event, data) in strategy::dialog_events(dialog) {
            self.broadcast(event, data);
        }
    }

    /// Announce shutdown and close all client channels.
    pub fn shutdown(&self) {
        self.broadcast(events::SERVER_SHUTDOWN, Value::Null);
        self.clients().clear();
    }

    /// Spawn the cross-process listener: frames arriving on the
    /// transport are fanned out locally only. Returns `None` when no
    /// transport is attached.
    pub fn spawn_pubsub_listener(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let pubsub = self.pubsub.clone()?;
        let broadcaster = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut subscription = pubsub.subscribe();
            tracing::debug!(channel = BROADCAST_CHANNEL, "pub/sub listener started");
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("pub/sub listener cancelled");
                        return;
                    }
                    frame = subscription.recv() => {
                        match frame {
                            Some(frame) => broadcaster.local_broadcast(&frame),
                            None => {
                                tracing::warn!("pub/sub subscription closed");
                                return;
                            }
                        }
                    }
                }
            }
        }))
    }
}
