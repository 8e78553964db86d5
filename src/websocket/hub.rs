//! Broadcast Hub
//!
//! Owns the set of live viewer connections. All mutation of that set and all
//! delivery happen inside a single loop task; everything else talks to the
//! loop through [`HubHandle`] commands, so no lock on the viewer set exists
//! outside this module.
//!
//! Each viewer gets a bounded outbound queue drained by its own writer task.
//! The loop only ever `try_send`s into those queues, so a stalled viewer
//! cannot hold up delivery to the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

/// Unique identifier for a viewer connection
pub type ViewerId = String;

/// Configuration for the broadcast hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent viewers
    pub max_viewers: usize,
    /// Capacity of the hub command channel
    pub command_capacity: usize,
    /// Frames buffered per viewer before it counts as stalled
    pub viewer_queue: usize,
    /// How often every viewer is probed
    pub keepalive_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_viewers: 1000,
            command_capacity: 1024,
            viewer_queue: 64,
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

/// A frame queued for one viewer
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Serialized event, shared by every recipient of the same broadcast
    Payload(Arc<[u8]>),
    /// Keepalive probe
    Ping,
}

/// Lifecycle of a viewer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    /// Upgraded, not yet known to the hub
    Connecting,
    /// In the viewer set, nothing delivered yet
    Registered,
    /// At least one frame handed off
    Active,
    /// Close signalled, being removed
    Draining,
    /// Terminal
    Closed,
}

impl ViewerState {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: ViewerState) -> bool {
        use ViewerState::*;
        matches!(
            (self, next),
            (Connecting, Registered)
                | (Registered, Active)
                | (Registered, Draining)
                | (Active, Draining)
                | (Draining, Closed)
        )
    }
}

/// The viewer side of a registration
///
/// The connection's writer drains `frames` and must stop as soon as `closed`
/// resolves.
#[derive(Debug)]
pub struct Viewer {
    pub id: ViewerId,
    pub frames: mpsc::Receiver<Frame>,
    pub closed: oneshot::Receiver<()>,
}

/// Errors returned by hub operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("Too many viewers (limit: {0})")]
    TooManyViewers(usize),

    #[error("Broadcast hub is not running")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryFailure {
    /// Outbound queue full
    Stalled,
    /// Writer gone
    Disconnected,
}

/// Hub-side state of one viewer
struct ViewerConnection {
    outbound: mpsc::Sender<Frame>,
    close: Option<oneshot::Sender<()>>,
    state: ViewerState,
}

impl ViewerConnection {
    fn transition(&mut self, next: ViewerState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    fn deliver(&mut self, frame: Frame) -> Result<(), DeliveryFailure> {
        match self.outbound.try_send(frame) {
            Ok(()) => {
                if self.state == ViewerState::Registered {
                    self.transition(ViewerState::Active);
                }
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(DeliveryFailure::Stalled),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryFailure::Disconnected),
        }
    }

    /// Signal the writer to stop; only the first call has an effect
    fn close(&mut self) {
        if !self.transition(ViewerState::Draining) {
            return;
        }
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        self.transition(ViewerState::Closed);
    }
}

enum HubCommand {
    Register {
        reply: oneshot::Sender<Result<Viewer, HubError>>,
    },
    Unregister {
        id: ViewerId,
        reply: oneshot::Sender<bool>,
    },
    Broadcast(Arc<[u8]>),
    ViewerCount(oneshot::Sender<usize>),
    Shutdown,
}

/// Cloneable handle to the hub loop
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Add a viewer to the broadcast set
    pub async fn register(&self) -> Result<Viewer, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Register { reply }).await?;
        rx.await.map_err(|_| HubError::Closed)?
    }

    /// Remove a viewer and close its connection
    ///
    /// Returns false if the viewer was not registered. Once this returns no
    /// further frame reaches the viewer's writer.
    pub async fn unregister(&self, id: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .send(HubCommand::Unregister {
                id: id.to_string(),
                reply,
            })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Queue a payload for every current viewer
    ///
    /// Waits only for the hand-off to the hub loop, never for delivery.
    pub async fn broadcast(&self, payload: impl Into<Arc<[u8]>>) -> Result<(), HubError> {
        self.send(HubCommand::Broadcast(payload.into())).await
    }

    /// Number of registered viewers
    pub async fn viewer_count(&self) -> Result<usize, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::ViewerCount(reply)).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Close every viewer and stop the loop
    pub async fn shutdown(&self) {
        let _ = self.send(HubCommand::Shutdown).await;
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.commands.send(command).await.map_err(|_| HubError::Closed)
    }
}

/// The hub loop state
pub struct BroadcastHub {
    config: HubConfig,
    viewers: HashMap<ViewerId, ViewerConnection>,
    commands: mpsc::Receiver<HubCommand>,
}

impl BroadcastHub {
    /// Start the hub loop
    pub fn spawn(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_capacity.max(1));
        let hub = BroadcastHub {
            config,
            viewers: HashMap::new(),
            commands: rx,
        };
        let handle = tokio::spawn(hub.run());
        (HubHandle { commands: tx }, handle)
    }

    async fn run(mut self) {
        let period = self.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            max_viewers = self.config.max_viewers,
            keepalive_secs = period.as_secs(),
            "Broadcast hub started"
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(HubCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                _ = keepalive.tick() => self.deliver_all(Frame::Ping),
            }
        }

        let ids: Vec<ViewerId> = self.viewers.keys().cloned().collect();
        for id in ids {
            self.unregister(&id);
        }
        tracing::info!("Broadcast hub stopped");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { reply } => {
                let _ = reply.send(self.register());
            }
            HubCommand::Unregister { id, reply } => {
                let _ = reply.send(self.unregister(&id));
            }
            HubCommand::Broadcast(payload) => self.deliver_all(Frame::Payload(payload)),
            HubCommand::ViewerCount(reply) => {
                let _ = reply.send(self.viewers.len());
            }
            HubCommand::Shutdown => {}
        }
    }

    fn register(&mut self) -> Result<Viewer, HubError> {
        if self.viewers.len() >= self.config.max_viewers {
            tracing::warn!(limit = self.config.max_viewers, "Viewer rejected, hub full");
            return Err(HubError::TooManyViewers(self.config.max_viewers));
        }

        let id = Uuid::new_v4().to_string();
        let (outbound, frames) = mpsc::channel(self.config.viewer_queue.max(1));
        let (close, closed) = oneshot::channel();

        let mut connection = ViewerConnection {
            outbound,
            close: Some(close),
            state: ViewerState::Connecting,
        };
        connection.transition(ViewerState::Registered);
        self.viewers.insert(id.clone(), connection);

        tracing::info!(viewer_id = %id, viewers = self.viewers.len(), "Viewer connected");
        Ok(Viewer { id, frames, closed })
    }

    fn unregister(&mut self, id: &str) -> bool {
        match self.viewers.remove(id) {
            Some(mut connection) => {
                connection.close();
                tracing::info!(viewer_id = %id, viewers = self.viewers.len(), "Viewer disconnected");
                true
            }
            None => false,
        }
    }

    /// Hand `frame` to every viewer; failures only remove the failing viewer
    fn deliver_all(&mut self, frame: Frame) {
        let mut failed = Vec::new();

        for (id, connection) in self.viewers.iter_mut() {
            if let Err(failure) = connection.deliver(frame.clone()) {
                failed.push((id.clone(), failure));
            }
        }

        for (id, failure) in failed {
            tracing::debug!(viewer_id = %id, failure = ?failure, "Delivery failed, dropping viewer");
            self.unregister(&id);
        }
    }
}
