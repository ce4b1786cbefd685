use anyhow::{Context, Result};
use itemboard_api_client::ApiClient;
use itemboard_runtime_config::{CONFIG_FILE_NAME, RuntimeConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the config directory path (~/.config/itemboard/)
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("itemboard"))
}

/// Canonical config file path.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// `--config` if given, the canonical path otherwise.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => config_path(),
    }
}

/// File values with environment overrides applied.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::load(path)?;
    config.apply_env_overrides();
    Ok(config)
}

/// Effective configuration, failing if the backend cannot be reached with it.
pub fn load_validated(path: &Path) -> Result<RuntimeConfig> {
    let config = load_config(path)?;
    config.validate().with_context(|| {
        format!(
            "Incomplete configuration in {} (set it with `itemboard config --endpoint <url> --region <region> --api-key <key>`)",
            path.display()
        )
    })?;
    Ok(config)
}

pub fn api_client(config: &RuntimeConfig) -> Result<ApiClient> {
    let client = ApiClient::new(
        config.api.endpoint.trim(),
        config.api.region.trim(),
        config.api.api_key.trim(),
        Duration::from_secs(config.api.timeout_secs),
    )
    .context("Failed to build HTTP client")?;
    Ok(client)
}

/// Show current configuration.
pub fn show_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    println!("Config file: {}", path.display());
    println!();
    println!("[api]");
    println!("  endpoint     = {}", or_unset(&config.api.endpoint));
    println!("  region       = {}", or_unset(&config.api.region));
    println!("  api_key      = {}", mask_key(&config.api.api_key));
    println!("  timeout_secs = {}", config.api.timeout_secs);
    println!();
    println!("[realtime]");
    println!("  recovery_delay_secs = {}", config.realtime.recovery_delay_secs);
    println!("  delete_signal       = {:?}", config.realtime.delete_signal);
    println!("  recovery            = {:?}", config.realtime.recovery);
    Ok(())
}

/// Update config with provided values.
pub fn set_config(
    path: &Path,
    endpoint: Option<String>,
    region: Option<String>,
    api_key: Option<String>,
) -> Result<()> {
    update_config(path, endpoint, region, api_key)?;
    println!("Configuration updated.");
    show_config(path)
}

/// Write the given values into the file at `path`, leaving the rest intact.
/// Environment overrides are not persisted.
fn update_config(
    path: &Path,
    endpoint: Option<String>,
    region: Option<String>,
    api_key: Option<String>,
) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::load(path)?;
    if let Some(endpoint) = endpoint {
        config.api.endpoint = endpoint.trim().trim_end_matches('/').to_string();
    }
    if let Some(region) = region {
        config.api.region = region.trim().to_string();
    }
    if let Some(key) = api_key {
        config.api.api_key = key.trim().to_string();
    }
    config.save(path)?;
    Ok(config)
}

fn or_unset(value: &str) -> &str {
    if value.trim().is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn mask_key(key: &str) -> String {
    if key.is_empty() {
        "(not set)".to_string()
    } else {
        format!("{}...", key.chars().take(8).collect::<String>())
    }
}
