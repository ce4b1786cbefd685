//! Client-side realtime reconciliation for the item board.
//!
//! A mounted [`session`] owns the board: the [`loader`] fills it from a full
//! snapshot, pushes from the three channels are merged into it through the
//! list rules in `itemboard_core::list`, and the [`supervisor`] turns channel
//! failures into a status flag plus a timed resync.

pub mod backend;
pub mod loader;
pub mod remote;
pub mod session;
pub mod state;
pub mod supervisor;

pub use backend::{ChannelGuard, ChannelKind, ChannelSink, ItemBackend, PushEvent, PushSource};
pub use loader::SnapshotLoader;
pub use remote::RealtimePushSource;
pub use session::{SessionError, SessionHandle, SessionOptions, mount};
pub use state::BoardState;
pub use supervisor::{ChannelState, ChannelSupervisor, RealtimeStatus};
