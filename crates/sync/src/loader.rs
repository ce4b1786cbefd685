//! Snapshot loading: full replacement of the board from the backend.
//!
//! A load is split in two so the session loop never waits on the network:
//! [`SnapshotLoader::begin`] marks the board as loading and hands out a
//! generation number, the fetch runs in its own task, and
//! [`SnapshotLoader::settle`] applies the result back on the loop. Only the
//! most recently started generation is applied.

use std::sync::Arc;

use tracing::{debug, error, info};

use itemboard_core::{Failure, Item, ItemList};

use crate::backend::ItemBackend;
use crate::state::BoardState;

/// Shown when the backend fails without saying why.
const LOAD_FAILED: &str = "Failed to load items";

/// Outcome of [`SnapshotLoader::settle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Applied,
    Failed,
    /// A newer load was started after this one; its result was dropped.
    Superseded,
}

pub struct SnapshotLoader<B> {
    backend: Arc<B>,
    generation: u64,
    loaded_once: bool,
}

impl<B: ItemBackend> SnapshotLoader<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            generation: 0,
            loaded_once: false,
        }
    }

    pub fn backend(&self) -> Arc<B> {
        Arc::clone(&self.backend)
    }

    /// Generation of the most recently started load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_loaded(&self) -> bool {
        self.loaded_once
    }

    /// One-shot load outside any session.
    pub async fn load(&self) -> Result<ItemList, Failure> {
        let items = self.backend.fetch_all().await?;
        Ok(ItemList::from_snapshot(items))
    }

    /// Start a load: raise the loading flag and return its generation.
    pub fn begin(&mut self, state: &mut BoardState) -> u64 {
        self.generation += 1;
        state.loading = true;
        debug!(generation = self.generation, "snapshot load started");
        self.generation
    }

    /// Apply the result of the load numbered `generation`.
    ///
    /// Success replaces the list wholesale and clears the error. Failure
    /// records the message and keeps whatever list is on the board (empty
    /// before the first successful load).
    pub fn settle(
        &mut self,
        generation: u64,
        result: Result<Vec<Item>, Failure>,
        state: &mut BoardState,
    ) -> Settled {
        if generation != self.generation {
            debug!(
                generation,
                latest = self.generation,
                "dropping superseded snapshot"
            );
            return Settled::Superseded;
        }
        state.loading = false;
        match result {
            Ok(items) => {
                state.items = ItemList::from_snapshot(items);
                state.error = None;
                self.loaded_once = true;
                info!(items = state.items.len(), "snapshot loaded");
                Settled::Applied
            }
            Err(failure) => {
                error!("snapshot load failed: {failure}");
                if !self.loaded_once {
                    state.items = ItemList::new();
                }
                state.error = Some(user_message(&failure, LOAD_FAILED));
                Settled::Failed
            }
        }
    }
}

/// Fetch a snapshot on behalf of a spawned task.
pub async fn fetch_snapshot<B: ItemBackend>(backend: Arc<B>) -> Result<Vec<Item>, Failure> {
    backend.fetch_all().await
}

/// The failure's own message, or `fallback` when it has none.
pub(crate) fn user_message(failure: &Failure, fallback: &str) -> String {
    let message = failure.message().trim();
    if message.is_empty() {
        fallback.to_string()
    } else {
        message.to_string()
    }
}
