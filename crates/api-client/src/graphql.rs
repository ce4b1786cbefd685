//! GraphQL documents and response envelopes for the item schema.

use serde::{Deserialize, Serialize};

use itemboard_core::Item;

use crate::error::ApiError;

/// A named GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub document: &'static str,
}

pub const LIST_ITEMS: Operation = Operation {
    name: "GetItems",
    document: "query GetItems { items { id title completed createdAt updatedAt } }",
};

pub const CREATE_ITEM: Operation = Operation {
    name: "CreateItem",
    document: "mutation CreateItem($title: String!) { \
               createItem(title: $title) { id title completed createdAt updatedAt } }",
};

pub const UPDATE_ITEM: Operation = Operation {
    name: "UpdateItem",
    document: "mutation UpdateItem($id: ID!, $completed: Boolean!) { \
               updateItem(id: $id, completed: $completed) { id title completed updatedAt } }",
};

pub const DELETE_ITEM: Operation = Operation {
    name: "DeleteItem",
    document: "mutation DeleteItem($id: ID!) { deleteItem(id: $id) }",
};

pub const ON_CREATE_ITEM: Operation = Operation {
    name: "OnCreateItem",
    document: "subscription OnCreateItem { onCreateItem { id title completed createdAt updatedAt } }",
};

pub const ON_UPDATE_ITEM: Operation = Operation {
    name: "OnUpdateItem",
    document: "subscription OnUpdateItem { onUpdateItem { id title completed updatedAt } }",
};

/// The stock schema's delete subscription: a bare Boolean.
pub const ON_DELETE_ITEM: Operation = Operation {
    name: "OnDeleteItem",
    document: "subscription OnDeleteItem { onDeleteItem }",
};

/// Delete subscription for schemas whose `onDeleteItem` returns the item.
pub const ON_DELETE_ITEM_WITH_ID: Operation = Operation {
    name: "OnDeleteItem",
    document: "subscription OnDeleteItem { onDeleteItem { id } }",
};

#[derive(Debug, Serialize)]
pub struct Request<'a, V: Serialize> {
    pub query: &'a str,
    #[serde(rename = "operationName")]
    pub operation_name: &'a str,
    pub variables: V,
}

#[derive(Debug, Deserialize)]
pub struct Response<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default, rename = "errorType")]
    pub error_type: Option<String>,
}

impl<T> Response<T> {
    /// Errors win over partial data.
    pub fn into_result(self, operation: &Operation) -> Result<T, ApiError> {
        if let Some(errors) = self.errors.filter(|e| !e.is_empty()) {
            return Err(ApiError::GraphQl(
                errors.into_iter().map(|e| e.message).collect(),
            ));
        }
        self.data.ok_or(ApiError::MissingData(operation.name))
    }
}

// ── Payloads ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ItemsData {
    pub items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemData {
    pub create_item: Item,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemData {
    pub update_item: Item,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItemData {
    pub delete_item: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnCreateItemData {
    pub on_create_item: Item,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnUpdateItemData {
    pub on_update_item: Item,
}

/// `onDeleteItem` is either a Boolean or `{ id }` depending on the schema.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnDeleteItemData {
    pub on_delete_item: DeletePayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DeletePayload {
    Deleted { id: itemboard_core::ItemId },
    Signal(bool),
}
