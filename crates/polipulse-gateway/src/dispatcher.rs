use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::trace;
use uuid::Uuid;

use polipulse_types::events::RealtimeEvent;

/// Routes realtime events to connected users. Each user has at most one live
/// channel; a newer connection replaces the older one.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<RealtimeEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    pub async fn register_user_channel(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.user_channels.write().await.insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user. Dropped if they are offline.
    pub async fn send_to_user(&self, user_id: Uuid, event: RealtimeEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    /// Send one event to each listed user once, e.g. both participants of a
    /// conversation.
    pub async fn send_to_users(&self, user_ids: &[Uuid], event: RealtimeEvent) {
        let channels = self.inner.user_channels.read().await;
        let mut delivered: Vec<Uuid> = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            if delivered.contains(user_id) {
                continue;
            }
            delivered.push(*user_id);
            if let Some((_, tx)) = channels.get(user_id) {
                if tx.send(event.clone()).is_err() {
                    trace!("Receiver for {} already closed", user_id);
                }
            }
        }
    }
}
