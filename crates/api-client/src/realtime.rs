//! Realtime subscriptions over the managed backend's WebSocket protocol.
//!
//! Each [`RealtimeSubscription`] owns one connection running in a background
//! task: `connection_init` → `connection_ack` → `start` → `start_ack`, then
//! `data` frames until the subscription is dropped (which sends `stop`) or
//! the connection fails. A failure is delivered once as an `Err` and ends
//! the stream; reconnecting is the caller's decision.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::graphql::Operation;

const SUBPROTOCOL: &str = "graphql-ws";
/// Used until `connection_ack` tells us the server's keep-alive window.
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(300);

/// What a live subscription yields.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// `start_ack` received; pushes may arrive from now on.
    Established,
    /// The `data` object of one push, e.g. `{"onCreateItem": {...}}`.
    Data(Value),
}

/// Connection parameters for the realtime endpoint.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    realtime_url: String,
    host: String,
    api_key: String,
}

impl RealtimeClient {
    pub fn new(http_endpoint: &str, api_key: &str) -> Result<Self, ApiError> {
        Ok(Self {
            realtime_url: realtime_url(http_endpoint)?,
            host: endpoint_host(http_endpoint)?,
            api_key: api_key.to_string(),
        })
    }

    pub fn realtime_url(&self) -> &str {
        &self.realtime_url
    }

    /// URL with the base64 authorization header and empty payload the
    /// handshake expects.
    pub fn connect_url(&self) -> String {
        let header = STANDARD.encode(self.authorization().to_string());
        format!("{}?header={header}&payload=e30=", self.realtime_url)
    }

    fn authorization(&self) -> Value {
        json!({ "host": self.host, "x-api-key": self.api_key })
    }

    fn start_message(&self, id: &str, operation: &Operation) -> Value {
        let data = json!({ "query": operation.document, "variables": {} }).to_string();
        json!({
            "id": id,
            "type": "start",
            "payload": {
                "data": data,
                "extensions": { "authorization": self.authorization() },
            },
        })
    }

    /// Open a subscription for `operation`. Must be called inside a tokio
    /// runtime; the connection is established in the background.
    pub fn subscribe(&self, operation: Operation) -> RealtimeSubscription {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let client = self.clone();
        let id = uuid::Uuid::new_v4().to_string();

        tokio::spawn(async move {
            let result = client
                .drive(&id, operation, &events_tx, stop_rx)
                .await;
            if let Err(e) = result {
                warn!(operation = operation.name, "realtime subscription failed: {e}");
                let _ = events_tx.send(Err(e));
            }
        });

        RealtimeSubscription {
            operation,
            events: events_rx,
            stop: Some(stop_tx),
        }
    }

    async fn drive(
        &self,
        id: &str,
        operation: Operation,
        events: &mpsc::UnboundedSender<Result<RealtimeEvent, ApiError>>,
        mut stop: oneshot::Receiver<()>,
    ) -> Result<(), ApiError> {
        let mut request = self.connect_url().into_client_request()?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(SUBPROTOCOL),
        );

        let (ws, _) = tokio::select! {
            connected = tokio_tungstenite::connect_async(request) => connected?,
            _ = &mut stop => return Ok(()),
        };
        let (mut sink, mut stream) = ws.split();
        sink.send(Message::Text(json!({ "type": "connection_init" }).to_string()))
            .await?;

        let mut keep_alive = DEFAULT_KEEP_ALIVE;
        let mut deadline = Instant::now() + keep_alive;
        let mut started = false;

        loop {
            tokio::select! {
                _ = &mut stop => {
                    if started {
                        let stop_frame = json!({ "type": "stop", "id": id }).to_string();
                        let _ = sink.send(Message::Text(stop_frame)).await;
                    }
                    let _ = sink.close().await;
                    debug!(operation = operation.name, "realtime subscription stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(ApiError::KeepAliveTimeout(keep_alive));
                }
                frame = stream.next() => {
                    let Some(frame) = frame else {
                        return Err(ApiError::Protocol("connection closed".into()));
                    };
                    let text = match frame? {
                        Message::Text(text) => text,
                        Message::Close(_) => {
                            return Err(ApiError::Protocol("connection closed by server".into()));
                        }
                        _ => continue,
                    };
                    deadline = Instant::now() + keep_alive;

                    let delivered = match serde_json::from_str::<ServerMessage>(&text)? {
                        ServerMessage::ConnectionAck { payload } => {
                            if let Some(ms) = payload.and_then(|p| p.connection_timeout_ms) {
                                keep_alive = Duration::from_millis(ms);
                                deadline = Instant::now() + keep_alive;
                            }
                            let start = self.start_message(id, &operation).to_string();
                            sink.send(Message::Text(start)).await?;
                            true
                        }
                        ServerMessage::Ka => true,
                        ServerMessage::StartAck => {
                            started = true;
                            info!(operation = operation.name, "realtime subscription established");
                            events.send(Ok(RealtimeEvent::Established)).is_ok()
                        }
                        ServerMessage::Data { payload } => {
                            let data = payload.get("data").cloned().unwrap_or(Value::Null);
                            events.send(Ok(RealtimeEvent::Data(data))).is_ok()
                        }
                        ServerMessage::Error { payload } | ServerMessage::ConnectionError { payload } => {
                            return Err(ApiError::Protocol(error_message(&payload)));
                        }
                        ServerMessage::Complete => {
                            return Err(ApiError::Protocol("subscription completed by server".into()));
                        }
                        ServerMessage::Unknown => true,
                    };
                    if !delivered {
                        // Receiver gone: nobody is listening any more.
                        let _ = sink.close().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Receiving end of one subscription. Dropping it unsubscribes.
pub struct RealtimeSubscription {
    operation: Operation,
    events: mpsc::UnboundedReceiver<Result<RealtimeEvent, ApiError>>,
    stop: Option<oneshot::Sender<()>>,
}

impl RealtimeSubscription {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Next event; `None` once the connection task has finished.
    pub async fn next(&mut self) -> Option<Result<RealtimeEvent, ApiError>> {
        self.events.recv().await
    }

    /// Send `stop` and close the connection.
    pub fn unsubscribe(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    ConnectionAck {
        #[serde(default)]
        payload: Option<AckPayload>,
    },
    Ka,
    StartAck,
    Data {
        payload: Value,
    },
    Error {
        #[serde(default)]
        payload: Value,
    },
    ConnectionError {
        #[serde(default)]
        payload: Value,
    },
    Complete,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AckPayload {
    connection_timeout_ms: Option<u64>,
}

fn error_message(payload: &Value) -> String {
    let messages: Vec<&str> = payload
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e.get("message").or_else(|| e.get("errorType")))
                .filter_map(Value::as_str)
                .collect()
        })
        .unwrap_or_default();
    if messages.is_empty() {
        payload.to_string()
    } else {
        messages.join("; ")
    }
}

fn split_scheme(endpoint: &str) -> Result<(&'static str, &str), ApiError> {
    if let Some(rest) = endpoint.strip_prefix("https://") {
        Ok(("wss://", rest))
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        Ok(("ws://", rest))
    } else {
        Err(ApiError::InvalidEndpoint(endpoint.to_string()))
    }
}

/// Host part of the GraphQL endpoint, as the authorization header wants it.
pub fn endpoint_host(endpoint: &str) -> Result<String, ApiError> {
    let (_, rest) = split_scheme(endpoint.trim_end_matches('/'))?;
    let host = rest.split('/').next().unwrap_or(rest);
    if host.is_empty() {
        return Err(ApiError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(host.to_string())
}

/// Realtime URL for a GraphQL endpoint: the `appsync-realtime-api` host for
/// stock endpoints, `<endpoint>/realtime` for custom domains.
pub fn realtime_url(endpoint: &str) -> Result<String, ApiError> {
    let endpoint = endpoint.trim_end_matches('/');
    let (scheme, rest) = split_scheme(endpoint)?;
    if rest.contains(".appsync-api.") {
        Ok(format!(
            "{scheme}{}",
            rest.replacen(".appsync-api.", ".appsync-realtime-api.", 1)
        ))
    } else {
        Ok(format!("{scheme}{rest}/realtime"))
    }
}
