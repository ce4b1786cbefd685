//! Wires the session seams to the real backend: [`ApiClient`] as the
//! [`ItemBackend`], the realtime WebSocket client as the [`PushSource`].

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use itemboard_api_client::graphql::{
    self, DeletePayload, OnCreateItemData, OnDeleteItemData, OnUpdateItemData,
};
use itemboard_api_client::{ApiClient, ApiError, Operation, RealtimeClient, RealtimeEvent};
use itemboard_core::{Failure, Item, ItemId};
use itemboard_runtime_config::DeleteSignal;

use crate::backend::{ChannelGuard, ChannelKind, ChannelSink, ItemBackend, PushEvent, PushSource};

fn failure(err: ApiError) -> Failure {
    Failure::with_cause(err.to_string(), err)
}

impl ItemBackend for ApiClient {
    async fn fetch_all(&self) -> Result<Vec<Item>, Failure> {
        self.list_items().await.map_err(failure)
    }

    async fn submit_create(&self, title: &str) -> Result<Item, Failure> {
        self.create_item(title).await.map_err(failure)
    }

    async fn submit_update(&self, id: &ItemId, completed: bool) -> Result<Item, Failure> {
        self.update_item(id, completed).await.map_err(failure)
    }

    async fn submit_delete(&self, id: &ItemId) -> Result<bool, Failure> {
        self.delete_item(id).await.map_err(failure)
    }
}

/// Push channels backed by realtime WebSocket subscriptions, one
/// connection per channel.
#[derive(Debug, Clone)]
pub struct RealtimePushSource {
    client: RealtimeClient,
    delete_signal: DeleteSignal,
}

impl RealtimePushSource {
    pub fn new(client: RealtimeClient, delete_signal: DeleteSignal) -> Self {
        Self {
            client,
            delete_signal,
        }
    }

    /// Subscription document for `kind` under the configured delete signal.
    pub fn operation(&self, kind: ChannelKind) -> Operation {
        match kind {
            ChannelKind::Created => graphql::ON_CREATE_ITEM,
            ChannelKind::Updated => graphql::ON_UPDATE_ITEM,
            ChannelKind::Deleted => match self.delete_signal {
                DeleteSignal::Opaque => graphql::ON_DELETE_ITEM,
                DeleteSignal::IdBearing => graphql::ON_DELETE_ITEM_WITH_ID,
            },
        }
    }
}

impl PushSource for RealtimePushSource {
    fn subscribe(&self, kind: ChannelKind, sink: ChannelSink) -> ChannelGuard {
        let mut subscription = self.client.subscribe(self.operation(kind));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    event = subscription.next() => {
                        let delivered = match event {
                            Some(Ok(RealtimeEvent::Established)) => sink.established(),
                            Some(Ok(RealtimeEvent::Data(data))) => match decode_push(kind, data) {
                                Ok(push) => sink.push(push),
                                Err(e) => {
                                    warn!(channel = %kind, "undecodable push: {e}");
                                    true
                                }
                            },
                            Some(Err(e)) => {
                                sink.fail(e.to_string());
                                false
                            }
                            None => {
                                sink.fail("subscription closed by server");
                                false
                            }
                        };
                        if !delivered {
                            break;
                        }
                    }
                }
            }
            debug!(channel = %kind, "realtime forwarder stopped");
            subscription.unsubscribe();
        });

        ChannelGuard::new(move || {
            let _ = stop_tx.send(());
        })
    }
}

/// Decode the `data` object of one push for channel `kind`.
pub fn decode_push(kind: ChannelKind, data: Value) -> Result<PushEvent, serde_json::Error> {
    Ok(match kind {
        ChannelKind::Created => {
            PushEvent::Created(serde_json::from_value::<OnCreateItemData>(data)?.on_create_item)
        }
        ChannelKind::Updated => {
            PushEvent::Updated(serde_json::from_value::<OnUpdateItemData>(data)?.on_update_item)
        }
        ChannelKind::Deleted => PushEvent::Deleted(deleted_id(data)),
    })
}

/// Id named by a delete push. Any other payload (a flag, `null`, no `data`
/// at all) still means something was deleted, so it never fails.
fn deleted_id(data: Value) -> Option<ItemId> {
    match serde_json::from_value::<OnDeleteItemData>(data) {
        Ok(OnDeleteItemData {
            on_delete_item: DeletePayload::Deleted { id },
        }) => Some(id),
        Ok(_) => None,
        Err(e) => {
            debug!("delete push without an id: {e}");
            None
        }
    }
}
