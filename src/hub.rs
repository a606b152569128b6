//! Connection Hub: in-memory registry of live per-user connections and the
//! fan-out engine for chat events.
//!
//! The hub is an explicitly owned component with a start/stop lifecycle. A
//! single actor task consumes a command queue, making it the sole owner of
//! all registry mutation: register, unregister, heartbeat bookkeeping and
//! broadcast are serialized with respect to each other. Event producers
//! (Chat Service) only enqueue commands and never block on slow consumers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::frames::ServerFrame;
use crate::store::ParticipantDirectory;

pub type ConnectionId = Uuid;

/// A registered connection. Presence in the registry means the connection is
/// open; removal drops the sender, which ends the write loop and closes the
/// socket.
struct ConnectionEntry {
    id: ConnectionId,
    user_id: Uuid,
    sender: mpsc::Sender<ServerFrame>,
    last_pong: Instant,
}

enum HubCommand {
    Register {
        user_id: Uuid,
        conn_id: ConnectionId,
        sender: mpsc::Sender<ServerFrame>,
        ack: oneshot::Sender<bool>,
    },
    Unregister {
        conn_id: ConnectionId,
    },
    Pong {
        conn_id: ConnectionId,
    },
    Broadcast {
        dialog_id: Uuid,
        exclude_user: Option<Uuid>,
        frame: ServerFrame,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Cloneable handle injected into the Chat Service and protocol handler.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Registers a connection's outbound queue. Returns false when the hub
    /// is shutting down and no longer accepts registrations.
    pub async fn register(
        &self,
        user_id: Uuid,
        conn_id: ConnectionId,
        sender: mpsc::Sender<ServerFrame>,
    ) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        let cmd = HubCommand::Register {
            user_id,
            conn_id,
            sender,
            ack: ack_tx,
        };
        if self.tx.send(cmd).await.is_err() {
            return false;
        }
        ack_rx.await.unwrap_or(false)
    }

    pub async fn unregister(&self, conn_id: ConnectionId) {
        let _ = self.tx.send(HubCommand::Unregister { conn_id }).await;
    }

    /// Heartbeat response from a connection's read loop.
    pub async fn pong(&self, conn_id: ConnectionId) {
        let _ = self.tx.send(HubCommand::Pong { conn_id }).await;
    }

    /// Fans `frame` out to every live connection of the dialog's active
    /// participants. Fire-and-forget for the producer.
    pub async fn broadcast(&self, dialog_id: Uuid, exclude_user: Option<Uuid>, frame: ServerFrame) {
        let cmd = HubCommand::Broadcast {
            dialog_id,
            exclude_user,
            frame,
        };
        if self.tx.send(cmd).await.is_err() {
            tracing::warn!(dialog_id = %dialog_id, "Hub is down, dropping broadcast");
        }
    }

    /// Stops accepting registrations, closes all outbound queues and waits
    /// for the actor to finish.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(HubCommand::Shutdown { ack: ack_tx }).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

pub struct ChatHub {
    directory: Arc<dyn ParticipantDirectory>,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    /// user_id -> connection ids, kept in sync with `connections`.
    by_user: HashMap<Uuid, Vec<ConnectionId>>,
    heartbeat_interval: Duration,
    missed_heartbeat_limit: u32,
    accepting: bool,
}

impl ChatHub {
    /// Spawns the hub actor; the returned handle is the only way to talk to
    /// it. The join handle resolves after [`HubHandle::shutdown`].
    pub fn start(
        directory: Arc<dyn ParticipantDirectory>,
        config: &ChatConfig,
    ) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(256);
        let hub = ChatHub {
            directory,
            connections: HashMap::new(),
            by_user: HashMap::new(),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
            missed_heartbeat_limit: config.missed_heartbeat_limit,
            accepting: true,
        };
        let task = tokio::spawn(hub.run(rx));
        (HubHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
        let mut sweep = tokio::time::interval(self.heartbeat_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(HubCommand::Register { user_id, conn_id, sender, ack }) => {
                            let accepted = self.register(user_id, conn_id, sender);
                            let _ = ack.send(accepted);
                        }
                        Some(HubCommand::Unregister { conn_id }) => {
                            self.close_connection(conn_id, "unregistered");
                        }
                        Some(HubCommand::Pong { conn_id }) => {
                            if let Some(entry) = self.connections.get_mut(&conn_id) {
                                entry.last_pong = Instant::now();
                            }
                        }
                        Some(HubCommand::Broadcast { dialog_id, exclude_user, frame }) => {
                            self.broadcast(dialog_id, exclude_user, frame).await;
                        }
                        Some(HubCommand::Shutdown { ack }) => {
                            self.shutdown();
                            let _ = ack.send(());
                            break;
                        }
                        None => break,
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_stale();
                }
            }
        }

        tracing::info!("Connection hub stopped");
    }

    fn register(
        &mut self,
        user_id: Uuid,
        conn_id: ConnectionId,
        sender: mpsc::Sender<ServerFrame>,
    ) -> bool {
        if !self.accepting {
            tracing::debug!(conn_id = %conn_id, "Registration rejected, hub shutting down");
            return false;
        }

        let entry = ConnectionEntry {
            id: conn_id,
            user_id,
            sender,
            last_pong: Instant::now(),
        };

        self.by_user.entry(user_id).or_default().push(conn_id);
        self.connections.insert(conn_id, entry);

        tracing::debug!(
            conn_id = %conn_id,
            connections = self.connections.len(),
            "Connection open"
        );
        true
    }

    /// Removes the entry and drops its sender; the write loop observes the
    /// closed queue and shuts the socket.
    fn close_connection(&mut self, conn_id: ConnectionId, reason: &str) {
        let Some(entry) = self.connections.remove(&conn_id) else {
            return;
        };

        if let Some(ids) = self.by_user.get_mut(&entry.user_id) {
            ids.retain(|id| *id != conn_id);
            if ids.is_empty() {
                self.by_user.remove(&entry.user_id);
            }
        }

        tracing::debug!(conn_id = %conn_id, reason = reason, "Connection closed");
    }

    async fn broadcast(&mut self, dialog_id: Uuid, exclude_user: Option<Uuid>, frame: ServerFrame) {
        let participants = match self.directory.active_participant_ids(dialog_id).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    dialog_id = %dialog_id,
                    "Failed to resolve participants for broadcast"
                );
                return;
            }
        };

        let mut overflowed: Vec<ConnectionId> = Vec::new();

        for user_id in participants {
            if exclude_user == Some(user_id) {
                continue;
            }
            let Some(conn_ids) = self.by_user.get(&user_id) else {
                continue;
            };

            for conn_id in conn_ids {
                let Some(entry) = self.connections.get(conn_id) else {
                    continue;
                };
                // Non-blocking: a full queue marks the consumer for forced
                // disconnect instead of stalling everyone else.
                match entry.sender.try_send(frame.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            conn_id = %entry.id,
                            "Outbound queue full, forcing disconnect"
                        );
                        overflowed.push(entry.id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        overflowed.push(entry.id);
                    }
                }
            }
        }

        for conn_id in overflowed {
            self.close_connection(conn_id, "outbound queue overflow");
        }
    }

    fn sweep_stale(&mut self) {
        let deadline = self.heartbeat_interval * self.missed_heartbeat_limit;
        let now = Instant::now();
        let stale: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|e| now.duration_since(e.last_pong) > deadline)
            .map(|e| e.id)
            .collect();

        for conn_id in stale {
            self.close_connection(conn_id, "missed heartbeat");
        }
    }

    fn shutdown(&mut self) {
        self.accepting = false;
        let all: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for conn_id in all {
            self.close_connection(conn_id, "server shutdown");
        }
        tracing::info!("Connection hub draining complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use async_trait::async_trait;
    use tokio::time::timeout;

    struct StaticDirectory(Vec<Uuid>);

    #[async_trait]
    impl ParticipantDirectory for StaticDirectory {
        async fn active_participant_ids(&self, _dialog_id: Uuid) -> AppResult<Vec<Uuid>> {
            Ok(self.0.clone())
        }
    }

    fn test_config() -> ChatConfig {
        ChatConfig {
            heartbeat_interval_secs: 3600, // keep the sweep out of the way
            ..ChatConfig::default()
        }
    }

    fn error_frame() -> ServerFrame {
        ServerFrame::Error {
            code: "TEST".into(),
            message: "test".into(),
        }
    }

    async fn recv_one(rx: &mut mpsc::Receiver<ServerFrame>) -> Option<ServerFrame> {
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection_of_each_participant_once() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let directory = Arc::new(StaticDirectory(vec![alice, bob]));
        let (hub, task) = ChatHub::start(directory, &test_config());

        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let (tx3, mut rx3) = mpsc::channel(8);
        assert!(hub.register(bob, Uuid::new_v4(), tx1).await);
        assert!(hub.register(bob, Uuid::new_v4(), tx2).await);
        assert!(hub.register(alice, Uuid::new_v4(), tx3).await);

        hub.broadcast(Uuid::new_v4(), None, error_frame()).await;

        // Exactly one frame per live connection, multi-device included.
        assert!(recv_one(&mut rx1).await.is_some());
        assert!(recv_one(&mut rx2).await.is_some());
        assert!(recv_one(&mut rx3).await.is_some());
        assert!(recv_one(&mut rx1).await.is_none());
        assert!(recv_one(&mut rx2).await.is_none());

        hub.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn excluded_user_receives_nothing() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let directory = Arc::new(StaticDirectory(vec![alice, bob]));
        let (hub, task) = ChatHub::start(directory, &test_config());

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        hub.register(alice, Uuid::new_v4(), tx_a).await;
        hub.register(bob, Uuid::new_v4(), tx_b).await;

        hub.broadcast(Uuid::new_v4(), Some(alice), error_frame()).await;

        assert!(recv_one(&mut rx_b).await.is_some());
        assert!(recv_one(&mut rx_a).await.is_none());

        hub.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn slow_consumer_is_dropped_without_stalling_others() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let directory = Arc::new(StaticDirectory(vec![alice, bob]));
        let (hub, task) = ChatHub::start(directory, &test_config());

        // Capacity 1 and nobody draining: the second broadcast overflows.
        let (tx_slow, mut rx_slow) = mpsc::channel(1);
        let (tx_ok, mut rx_ok) = mpsc::channel(8);
        hub.register(alice, Uuid::new_v4(), tx_slow).await;
        hub.register(bob, Uuid::new_v4(), tx_ok).await;

        let dialog = Uuid::new_v4();
        hub.broadcast(dialog, None, error_frame()).await;
        hub.broadcast(dialog, None, error_frame()).await;
        hub.broadcast(dialog, None, error_frame()).await;

        // The healthy consumer got all three.
        assert!(recv_one(&mut rx_ok).await.is_some());
        assert!(recv_one(&mut rx_ok).await.is_some());
        assert!(recv_one(&mut rx_ok).await.is_some());

        // The slow one got the first frame, then its channel was closed.
        assert!(recv_one(&mut rx_slow).await.is_some());
        assert!(recv_one(&mut rx_slow).await.is_none());

        hub.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_is_dropped_after_missed_heartbeats() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let directory = Arc::new(StaticDirectory(vec![alice, bob]));
        let config = ChatConfig {
            heartbeat_interval_secs: 30,
            missed_heartbeat_limit: 2,
            ..ChatConfig::default()
        };
        let (hub, task) = ChatHub::start(directory, &config);

        let (tx_a, mut rx_a) = mpsc::channel(32);
        let (tx_b, mut rx_b) = mpsc::channel(32);
        let conn_a = Uuid::new_v4();
        assert!(hub.register(alice, conn_a, tx_a).await);
        assert!(hub.register(bob, Uuid::new_v4(), tx_b).await);

        // Four sweep intervals; only the first connection keeps answering.
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(30)).await;
            hub.pong(conn_a).await;
            // Round-trip through the actor so the pong lands before the
            // next sweep fires.
            hub.broadcast(Uuid::new_v4(), None, error_frame()).await;
            assert!(recv_one(&mut rx_a).await.is_some());
        }

        // The silent connection went past two intervals without a pong and
        // was dropped; its queue may still hold frames from before.
        loop {
            match timeout(Duration::from_millis(100), rx_b.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => panic!("silent connection still registered"),
            }
        }

        // The responsive connection is still served.
        hub.broadcast(Uuid::new_v4(), None, error_frame()).await;
        assert!(recv_one(&mut rx_a).await.is_some());

        hub.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn unregistered_connection_stops_receiving() {
        let alice = Uuid::new_v4();
        let directory = Arc::new(StaticDirectory(vec![alice]));
        let (hub, task) = ChatHub::start(directory, &test_config());

        let (tx, mut rx) = mpsc::channel(8);
        let conn_id = Uuid::new_v4();
        hub.register(alice, conn_id, tx).await;
        hub.unregister(conn_id).await;

        hub.broadcast(Uuid::new_v4(), None, error_frame()).await;
        assert!(recv_one(&mut rx).await.is_none());

        hub.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_rejects_new_registrations_and_closes_queues() {
        let alice = Uuid::new_v4();
        let directory = Arc::new(StaticDirectory(vec![alice]));
        let (hub, task) = ChatHub::start(directory.clone(), &test_config());

        let (tx, mut rx) = mpsc::channel(8);
        hub.register(alice, Uuid::new_v4(), tx).await;

        hub.shutdown().await;
        task.await.unwrap();

        // Existing queue was closed by the drain.
        assert!(rx.recv().await.is_none());

        // And the stopped hub accepts nothing new.
        let (tx2, _rx2) = mpsc::channel(8);
        assert!(!hub.register(alice, Uuid::new_v4(), tx2).await);
    }
}
