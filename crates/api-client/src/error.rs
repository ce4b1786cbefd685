use std::time::Duration;

use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The server answered but the GraphQL envelope carried `errors`.
    #[error("{}", .0.join("; "))]
    GraphQl(Vec<String>),

    #[error("response carried no data for {0}")]
    MissingData(&'static str),

    #[error("invalid endpoint {0:?}: expected an http(s) URL")]
    InvalidEndpoint(String),

    #[error("realtime connection failed: {0}")]
    WebSocket(Box<tungstenite::Error>),

    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("realtime protocol error: {0}")]
    Protocol(String),

    #[error("no keep-alive from realtime endpoint within {0:?}")]
    KeepAliveTimeout(Duration),
}

impl From<tungstenite::Error> for ApiError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}
