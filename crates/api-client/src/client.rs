use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use itemboard_core::{Item, ItemId};

use crate::error::ApiError;
use crate::graphql::{self, Operation, Request, Response};
use crate::realtime::RealtimeClient;

/// Typed GraphQL client for the item backend.
///
/// Authenticates every request with the API key (`x-api-key`), which is how
/// the managed backend is configured. One instance is created at startup and
/// handed to whatever needs it; there is no process-wide client.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    api_key: String,
}

impl ApiClient {
    /// Create a new client with the given endpoint, credentials and timeout.
    pub fn new(
        endpoint: &str,
        region: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint, region, api_key))
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, endpoint: &str, region: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            region: region.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Realtime subscription client for the same backend.
    pub fn realtime(&self) -> Result<RealtimeClient, ApiError> {
        RealtimeClient::new(&self.endpoint, &self.api_key)
    }

    /// Run one query or mutation and unwrap the GraphQL envelope.
    pub async fn execute<V, T>(&self, operation: &Operation, variables: V) -> Result<T, ApiError>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        debug!(operation = operation.name, "graphql request");
        let body = Request {
            query: operation.document,
            operation_name: operation.name,
            variables,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let envelope: Response<T> = parse_response(resp).await?;
        envelope.into_result(operation)
    }

    // ── Items ─────────────────────────────────────────────────────────────

    pub async fn list_items(&self) -> Result<Vec<Item>, ApiError> {
        let data: graphql::ItemsData = self.execute(&graphql::LIST_ITEMS, json!({})).await?;
        Ok(data.items)
    }

    pub async fn create_item(&self, title: &str) -> Result<Item, ApiError> {
        let data: graphql::CreateItemData = self
            .execute(&graphql::CREATE_ITEM, json!({ "title": title }))
            .await?;
        Ok(data.create_item)
    }

    pub async fn update_item(&self, id: &ItemId, completed: bool) -> Result<Item, ApiError> {
        let data: graphql::UpdateItemData = self
            .execute(
                &graphql::UPDATE_ITEM,
                json!({ "id": id, "completed": completed }),
            )
            .await?;
        Ok(data.update_item)
    }

    pub async fn delete_item(&self, id: &ItemId) -> Result<bool, ApiError> {
        let data: graphql::DeleteItemData = self
            .execute(&graphql::DELETE_ITEM, json!({ "id": id }))
            .await?;
        Ok(data.delete_item)
    }
}

/// Parse an HTTP response: return the deserialized body on 2xx,
/// or an error containing the status and body text.
async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Status { status, body });
    }
    Ok(resp.json().await?)
}
