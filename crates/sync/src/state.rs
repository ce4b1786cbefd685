use itemboard_core::ItemList;

use crate::supervisor::RealtimeStatus;

/// Everything a presentation layer needs to draw the board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardState {
    pub items: ItemList,
    /// A snapshot load is in flight.
    pub loading: bool,
    /// Last user-facing error; cleared by the next user action or a
    /// successful load.
    pub error: Option<String>,
    pub realtime: RealtimeStatus,
}

impl BoardState {
    /// Initial state of a freshly mounted session.
    pub fn mounting() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    pub fn summary(&self) -> String {
        self.items.summary()
    }

    pub fn status_caption(&self) -> &'static str {
        self.realtime.caption()
    }
}
