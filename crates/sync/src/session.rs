//! The mounted board session.
//!
//! [`mount`] spawns one task that owns the board and everything that changes
//! it: snapshot results, channel pushes and failures, the recovery deadline,
//! and the results of the user's own mutations. Those all arrive as
//! [`SessionEvent`]s on one queue and are applied in order, so the list is
//! never touched from two places at once. Observers read the board through a
//! `watch` channel and only ever see whole states.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use itemboard_core::{Applied, Failure, Item, ItemId, ListEvent};
use itemboard_runtime_config::{RealtimeSettings, RecoveryPolicy};

use crate::backend::{ChannelGuard, ChannelKind, ChannelSink, ItemBackend, PushEvent, PushSource};
use crate::loader::{Settled, SnapshotLoader, fetch_snapshot, user_message};
use crate::state::BoardState;
use crate::supervisor::ChannelSupervisor;

const CREATE_FAILED: &str = "Failed to create item";
const UPDATE_FAILED: &str = "Failed to update item";
const DELETE_FAILED: &str = "Failed to delete item";

pub(crate) enum SessionEvent {
    Channel {
        kind: ChannelKind,
        epoch: u64,
        message: ChannelMessage,
    },
    Loaded {
        generation: u64,
        result: Result<Vec<Item>, Failure>,
    },
    Reload,
    ClearError,
    Apply(ListEvent),
    MutationFailed(String),
}

pub(crate) enum ChannelMessage {
    Established,
    Push(PushEvent),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Quiet period between a channel failure and the resync.
    pub recovery_delay: Duration,
    pub recovery: RecoveryPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            recovery_delay: Duration::from_secs(5),
            recovery: RecoveryPolicy::default(),
        }
    }
}

impl From<&RealtimeSettings> for SessionOptions {
    fn from(settings: &RealtimeSettings) -> Self {
        Self {
            recovery_delay: Duration::from_secs(settings.recovery_delay_secs),
            recovery: settings.recovery,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("no item with id {0}")]
    UnknownItem(ItemId),
    #[error("failed to {action} item: {source}")]
    Mutation {
        action: &'static str,
        #[source]
        source: Failure,
    },
    #[error("session is no longer mounted")]
    Closed,
}

/// Mount a session: load the board, open the three push channels and keep
/// both in sync until the handle is unmounted or dropped. Must be called
/// inside a tokio runtime.
pub fn mount<B, P>(backend: Arc<B>, push: Arc<P>, options: SessionOptions) -> SessionHandle<B>
where
    B: ItemBackend,
    P: PushSource,
{
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(BoardState::mounting());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let session = Session {
        loader: SnapshotLoader::new(Arc::clone(&backend)),
        push,
        supervisor: ChannelSupervisor::new(options.recovery, options.recovery_delay),
        guards: HashMap::new(),
        epochs: HashMap::new(),
        next_epoch: 0,
        events: events_tx.clone(),
        state: state_tx,
        load_task: None,
    };
    let task = tokio::spawn(session.run(events_rx, shutdown_rx));

    SessionHandle {
        backend,
        events: events_tx,
        state: state_rx,
        shutdown: shutdown_tx,
        task: Some(task),
    }
}

/// The caller's side of a mounted session. Dropping it unmounts the session
/// in the background; [`SessionHandle::unmount`] waits for teardown.
pub struct SessionHandle<B> {
    backend: Arc<B>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Receiver<BoardState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl<B: ItemBackend> SessionHandle<B> {
    /// A receiver that is notified on every board change.
    pub fn subscribe(&self) -> watch::Receiver<BoardState> {
        self.state.clone()
    }

    /// Current board.
    pub fn board(&self) -> BoardState {
        self.state.borrow().clone()
    }

    /// Clear the error and resync from a full snapshot.
    pub fn reload(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::ClearError)?;
        self.send(SessionEvent::Reload)
    }

    pub async fn create_item(&self, title: &str) -> Result<Item, SessionError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SessionError::EmptyTitle);
        }
        self.send(SessionEvent::ClearError)?;
        match self.backend.submit_create(title).await {
            Ok(item) => {
                debug!(id = %item.id, "created");
                self.send(SessionEvent::Apply(ListEvent::Created(item.clone())))?;
                Ok(item)
            }
            Err(failure) => Err(self.mutation_failed("create", CREATE_FAILED, failure)),
        }
    }

    /// Flip the completion flag of `id` as currently shown on the board.
    pub async fn toggle_item(&self, id: &ItemId) -> Result<Item, SessionError> {
        let completed = self.state.borrow().items.get(id).map(|item| item.completed);
        let completed = completed.ok_or_else(|| SessionError::UnknownItem(id.clone()))?;
        self.send(SessionEvent::ClearError)?;
        match self.backend.submit_update(id, !completed).await {
            Ok(item) => {
                debug!(id = %item.id, completed = item.completed, "updated");
                self.send(SessionEvent::Apply(ListEvent::Updated(item.clone())))?;
                Ok(item)
            }
            Err(failure) => Err(self.mutation_failed("update", UPDATE_FAILED, failure)),
        }
    }

    /// Delete `id`. Returns the backend's answer; the item leaves the local
    /// board either way.
    pub async fn delete_item(&self, id: &ItemId) -> Result<bool, SessionError> {
        self.send(SessionEvent::ClearError)?;
        match self.backend.submit_delete(id).await {
            Ok(deleted) => {
                if !deleted {
                    debug!(%id, "backend reported nothing deleted");
                }
                self.send(SessionEvent::Apply(ListEvent::Deleted(id.clone())))?;
                Ok(deleted)
            }
            Err(failure) => Err(self.mutation_failed("delete", DELETE_FAILED, failure)),
        }
    }

    /// Release every channel, cancel pending recovery and wait for the
    /// session task to finish.
    pub async fn unmount(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.events.send(event).map_err(|_| SessionError::Closed)
    }

    fn mutation_failed(&self, action: &'static str, fallback: &str, failure: Failure) -> SessionError {
        error!("failed to {action} item: {failure}");
        let _ = self
            .events
            .send(SessionEvent::MutationFailed(user_message(&failure, fallback)));
        SessionError::Mutation {
            action,
            source: failure,
        }
    }
}

impl<B> Drop for SessionHandle<B> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

struct Session<B, P> {
    loader: SnapshotLoader<B>,
    push: Arc<P>,
    supervisor: ChannelSupervisor,
    guards: HashMap<ChannelKind, ChannelGuard>,
    /// Epoch of the live sink per channel; older sinks are ignored.
    epochs: HashMap<ChannelKind, u64>,
    next_epoch: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<BoardState>,
    load_task: Option<JoinHandle<()>>,
}

impl<B: ItemBackend, P: PushSource> Session<B, P> {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("session mounted");
        self.start_load();
        for kind in ChannelKind::ALL {
            self.open_channel(kind);
        }

        loop {
            let deadline = self.supervisor.deadline();
            tokio::select! {
                Some(event) = events.recv() => self.handle(event),

                _ = sleep_until(deadline) => self.recover(),

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.teardown();
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Channel {
                kind,
                epoch,
                message,
            } => self.on_channel(kind, epoch, message),
            SessionEvent::Loaded { generation, result } => {
                let loader = &mut self.loader;
                self.state
                    .send_if_modified(|s| loader.settle(generation, result, s) != Settled::Superseded);
            }
            SessionEvent::Reload => self.start_load(),
            SessionEvent::ClearError => {
                self.state.send_if_modified(|s| s.error.take().is_some());
            }
            SessionEvent::Apply(event) => self.apply(event),
            SessionEvent::MutationFailed(message) => {
                self.state.send_modify(|s| s.error = Some(message));
            }
        }
    }

    fn on_channel(&mut self, kind: ChannelKind, epoch: u64, message: ChannelMessage) {
        if self.epochs.get(&kind) != Some(&epoch) {
            debug!(channel = %kind, epoch, "ignoring message from a released channel");
            return;
        }
        match message {
            ChannelMessage::Established => self.supervisor.established(kind),
            ChannelMessage::Push(push) => {
                let event = match push {
                    PushEvent::Created(item) => ListEvent::Created(item),
                    PushEvent::Updated(item) => ListEvent::Updated(item),
                    PushEvent::Deleted(Some(id)) => ListEvent::Deleted(id),
                    PushEvent::Deleted(None) => ListEvent::Reload,
                };
                self.apply(event);
            }
            ChannelMessage::Failed(reason) => {
                warn!(channel = %kind, "push channel failed: {reason}");
                if self.supervisor.failed(kind, Instant::now()) {
                    self.publish_status();
                }
            }
        }
    }

    fn apply(&mut self, event: ListEvent) {
        let mut reload = false;
        self.state.send_if_modified(|s| {
            let applied = s.items.apply(event);
            reload = applied == Applied::ReloadRequired;
            applied.changed()
        });
        if reload {
            self.start_load();
        }
    }

    fn recover(&mut self) {
        let Some(recovery) = self.supervisor.expire(Instant::now()) else {
            return;
        };
        self.publish_status();
        for kind in recovery.resubscribe {
            self.open_channel(kind);
        }
        self.start_load();
    }

    fn start_load(&mut self) {
        if let Some(previous) = self.load_task.take() {
            previous.abort();
        }
        let mut generation = 0;
        let loader = &mut self.loader;
        self.state.send_modify(|s| generation = loader.begin(s));

        let backend = self.loader.backend();
        let events = self.events.clone();
        self.load_task = Some(tokio::spawn(async move {
            let result = fetch_snapshot(backend).await;
            let _ = events.send(SessionEvent::Loaded { generation, result });
        }));
    }

    fn open_channel(&mut self, kind: ChannelKind) {
        if let Some(mut previous) = self.guards.remove(&kind) {
            debug!(channel = %kind, "releasing channel before resubscribing");
            previous.release();
        }
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        self.epochs.insert(kind, epoch);
        self.supervisor.opening(kind);

        let sink = ChannelSink::new(kind, epoch, self.events.clone());
        let guard = self.push.subscribe(kind, sink);
        self.guards.insert(kind, guard);
    }

    fn publish_status(&self) {
        let status = self.supervisor.status();
        self.state.send_if_modified(|s| {
            let changed = s.realtime != status;
            s.realtime = status;
            changed
        });
    }

    fn teardown(&mut self) {
        self.supervisor.shutdown();
        for (kind, mut guard) in self.guards.drain() {
            debug!(channel = %kind, "releasing channel");
            guard.release();
        }
        self.epochs.clear();
        if let Some(task) = self.load_task.take() {
            task.abort();
        }
        info!("session unmounted");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
