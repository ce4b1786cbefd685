//! One-shot item commands: each talks to the backend directly and exits.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use itemboard_api_client::ApiClient;
use itemboard_core::ItemId;
use itemboard_sync::SnapshotLoader;

use crate::output::{self, OutputFormat};

pub async fn run_list(client: ApiClient, format: &OutputFormat) -> Result<()> {
    let loader = SnapshotLoader::new(Arc::new(client));
    let list = loader.load().await.context("Failed to load items")?;
    output::render_list(&list, format, &mut std::io::stdout().lock())
}

pub async fn run_add(client: &ApiClient, title: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        bail!("Title must not be empty");
    }
    let item = client
        .create_item(title)
        .await
        .context("Failed to create item")?;
    println!("Created {} {}", item.id, item.title);
    Ok(())
}

/// Flip the completion flag of `id` as the backend currently has it.
pub async fn run_toggle(client: &ApiClient, id: &str) -> Result<()> {
    let id = ItemId::from(id.trim());
    let items = client.list_items().await.context("Failed to load items")?;
    let current = items
        .iter()
        .find(|item| item.id == id)
        .with_context(|| format!("No item with id {id}"))?;
    let item = client
        .update_item(&id, !current.completed)
        .await
        .context("Failed to update item")?;
    println!("{} {}  {}", item.checkbox(), item.id, item.title);
    Ok(())
}

pub async fn run_delete(client: &ApiClient, id: &str) -> Result<()> {
    let id = ItemId::from(id.trim());
    let deleted = client
        .delete_item(&id)
        .await
        .context("Failed to delete item")?;
    if deleted {
        println!("Deleted {id}");
    } else {
        println!("Nothing to delete for {id}");
    }
    Ok(())
}
