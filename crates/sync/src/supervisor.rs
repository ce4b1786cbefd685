//! Push-channel lifecycle and failure recovery.
//!
//! Per channel: `Opening → Open → Failed → Recovering → Open …`. Any one
//! failure degrades the aggregate [`RealtimeStatus`] and arms a single
//! recovery deadline; further failures push that deadline back. When it
//! passes, status returns to connected and the caller resyncs from a full
//! snapshot (and, under [`RecoveryPolicy::Resubscribe`], reopens the failed
//! channels). The supervisor holds no timer itself: the session loop sleeps
//! until [`ChannelSupervisor::deadline`] and calls
//! [`ChannelSupervisor::expire`].

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use itemboard_runtime_config::RecoveryPolicy;

use crate::backend::ChannelKind;

/// Cap for deadlines that would overflow `Instant` (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Aggregate health of the push channels, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RealtimeStatus {
    #[default]
    Connected,
    Disconnected,
}

impl RealtimeStatus {
    pub fn caption(&self) -> &'static str {
        match self {
            Self::Connected => "Real-time connected",
            Self::Disconnected => "Reconnecting...",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not subscribed (before mount, after teardown).
    Closed,
    Opening,
    Open,
    Failed,
    Recovering,
}

/// Returned by [`ChannelSupervisor::expire`]: the resync is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    /// Channels to release and subscribe again before resyncing.
    pub resubscribe: Vec<ChannelKind>,
}

#[derive(Debug)]
pub struct ChannelSupervisor {
    policy: RecoveryPolicy,
    delay: Duration,
    channels: HashMap<ChannelKind, ChannelState>,
    status: RealtimeStatus,
    deadline: Option<Instant>,
    shut_down: bool,
}

impl ChannelSupervisor {
    pub fn new(policy: RecoveryPolicy, delay: Duration) -> Self {
        Self {
            policy,
            delay,
            channels: ChannelKind::ALL
                .into_iter()
                .map(|kind| (kind, ChannelState::Closed))
                .collect(),
            status: RealtimeStatus::Connected,
            deadline: None,
            shut_down: false,
        }
    }

    pub fn status(&self) -> RealtimeStatus {
        self.status
    }

    pub fn state(&self, kind: ChannelKind) -> ChannelState {
        self.channels
            .get(&kind)
            .copied()
            .unwrap_or(ChannelState::Closed)
    }

    /// Pending recovery deadline, if a failure is waiting out its delay.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// A subscription for `kind` has been requested. A channel resubscribed
    /// by [`expire`](Self::expire) stays `Recovering` until it is established.
    pub fn opening(&mut self, kind: ChannelKind) {
        if self.shut_down || self.state(kind) == ChannelState::Recovering {
            return;
        }
        self.channels.insert(kind, ChannelState::Opening);
    }

    /// The transport confirmed the subscription.
    pub fn established(&mut self, kind: ChannelKind) {
        if self.shut_down {
            return;
        }
        match self.state(kind) {
            ChannelState::Opening | ChannelState::Recovering => {
                debug!(channel = %kind, "channel open");
                self.channels.insert(kind, ChannelState::Open);
            }
            _ => {}
        }
    }

    /// The transport reported an error on `kind`. Returns true when this
    /// flipped the aggregate status to disconnected.
    pub fn failed(&mut self, kind: ChannelKind, now: Instant) -> bool {
        if self.shut_down {
            return false;
        }
        self.channels.insert(kind, ChannelState::Failed);
        let deadline = now
            .checked_add(self.delay)
            .unwrap_or_else(|| now + FAR_FUTURE);
        if self.deadline.replace(deadline).is_some() {
            debug!(channel = %kind, "another channel failure, recovery deadline pushed back");
        }
        let flipped = self.status == RealtimeStatus::Connected;
        if flipped {
            warn!(channel = %kind, delay = ?self.delay, "realtime disconnected, recovery scheduled");
        }
        self.status = RealtimeStatus::Disconnected;
        flipped
    }

    /// Fire the recovery if its deadline has passed. Yields at most once per
    /// armed deadline and never after shutdown.
    pub fn expire(&mut self, now: Instant) -> Option<Recovery> {
        if self.shut_down {
            return None;
        }
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return None,
        }
        self.deadline = None;
        self.status = RealtimeStatus::Connected;

        let mut resubscribe = Vec::new();
        for kind in ChannelKind::ALL {
            if self.state(kind) != ChannelState::Failed {
                continue;
            }
            match self.policy {
                RecoveryPolicy::Resubscribe => {
                    self.channels.insert(kind, ChannelState::Recovering);
                    resubscribe.push(kind);
                }
                RecoveryPolicy::ResyncOnly => {
                    self.channels.insert(kind, ChannelState::Open);
                }
            }
        }
        info!(resubscribe = resubscribe.len(), "realtime recovery: resyncing");
        Some(Recovery { resubscribe })
    }

    /// Tear down: cancel the pending deadline and close every channel.
    pub fn shutdown(&mut self) {
        self.shut_down = true;
        self.deadline = None;
        for state in self.channels.values_mut() {
            *state = ChannelState::Closed;
        }
    }
}
