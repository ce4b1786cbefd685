//! Collaborator seams: the request/response backend and the push channels.

use std::future::Future;

use tokio::sync::mpsc;

use itemboard_core::{Failure, Item, ItemId};

use crate::session::{ChannelMessage, SessionEvent};

/// Request/response side of the backend.
pub trait ItemBackend: Send + Sync + 'static {
    fn fetch_all(&self) -> impl Future<Output = Result<Vec<Item>, Failure>> + Send;

    fn submit_create(&self, title: &str) -> impl Future<Output = Result<Item, Failure>> + Send;

    fn submit_update(
        &self,
        id: &ItemId,
        completed: bool,
    ) -> impl Future<Output = Result<Item, Failure>> + Send;

    fn submit_delete(&self, id: &ItemId) -> impl Future<Output = Result<bool, Failure>> + Send;
}

/// The three push categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Created,
    Updated,
    Deleted,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [Self::Created, Self::Updated, Self::Deleted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Created(Item),
    Updated(Item),
    /// `None` when the channel only signals that some deletion happened.
    Deleted(Option<ItemId>),
}

/// Opens push channels. Implementations deliver into the given sink from
/// wherever they like (typically a spawned task) and stop when the returned
/// guard is released.
pub trait PushSource: Send + Sync + 'static {
    fn subscribe(&self, kind: ChannelKind, sink: ChannelSink) -> ChannelGuard;
}

/// Delivery side of one subscription: next-value, established and error
/// notifications for a single channel. Every method returns `false` once the
/// session is gone, which is the cue to stop.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    kind: ChannelKind,
    epoch: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub(crate) fn new(kind: ChannelKind, epoch: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { kind, epoch, tx }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn established(&self) -> bool {
        self.send(ChannelMessage::Established)
    }

    pub fn push(&self, event: PushEvent) -> bool {
        self.send(ChannelMessage::Push(event))
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.send(ChannelMessage::Failed(message.into()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, message: ChannelMessage) -> bool {
        self.tx
            .send(SessionEvent::Channel {
                kind: self.kind,
                epoch: self.epoch,
                message,
            })
            .is_ok()
    }
}

/// Releases a push channel when dropped or explicitly released.
pub struct ChannelGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ChannelGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Guard for a channel that needs no cleanup.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn is_open(&self) -> bool {
        self.release.is_some()
    }

    /// Idempotent.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ChannelGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelGuard")
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn guard_releases_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut guard = ChannelGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(guard.is_open());
        guard.release();
        guard.release();
        assert!(!guard.is_open());
        drop(guard);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_guard_releases() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        drop(ChannelGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sink_reports_closed_session() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(ChannelKind::Created, 1, tx);
        assert!(sink.established());
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.fail("gone"));
    }
}
