use std::io::Write;

use anyhow::Result;
use itemboard_core::ItemList;
use itemboard_sync::BoardState;

/// Output format for the item list.
#[derive(Debug, Clone, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Jsonl,
    /// NDJSON stream: each line is an independent JSON envelope
    Stream,
}

/// Structured output envelope for `--format stream`.
#[derive(Debug, serde::Serialize)]
pub struct OutputEnvelope {
    pub version: &'static str,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(rename = "@message")]
    pub message: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl OutputEnvelope {
    pub fn new(data_type: &str, message: &str, data: serde_json::Value) -> Self {
        Self {
            version: "0.1",
            data_type: data_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }
}

/// Render a list in the specified format.
pub fn render_list(list: &ItemList, format: &OutputFormat, writer: &mut dyn Write) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for item in list {
                writeln!(writer, "{} {}  {}", item.checkbox(), item.id, item.title)?;
            }
            if !list.is_empty() {
                writeln!(writer)?;
            }
            writeln!(writer, "{}", list.summary())?;
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(list.items())?;
            writeln!(writer, "{json}")?;
        }
        OutputFormat::Jsonl => {
            for item in list {
                writeln!(writer, "{}", serde_json::to_string(item)?)?;
            }
        }
        OutputFormat::Stream => {
            let envelope = OutputEnvelope::new(
                "item_list",
                &list.summary(),
                serde_json::to_value(list.items())?,
            );
            writeln!(writer, "{}", serde_json::to_string(&envelope)?)?;
        }
    }
    Ok(())
}

/// Render the live board. Text mode redraws the status, error and list;
/// stream mode emits one `board` envelope.
pub fn render_board(state: &BoardState, format: &OutputFormat, writer: &mut dyn Write) -> Result<()> {
    match format {
        OutputFormat::Text => {
            writeln!(writer, "── {} ──", state.status_caption())?;
            if state.loading {
                writeln!(writer, "Loading items...")?;
            }
            if let Some(error) = &state.error {
                writeln!(writer, "Error: {error}")?;
            }
            render_list(&state.items, format, writer)?;
        }
        OutputFormat::Json | OutputFormat::Jsonl | OutputFormat::Stream => {
            let data = serde_json::json!({
                "realtime": state.status_caption(),
                "loading": state.loading,
                "error": state.error,
                "items": state.items.items(),
            });
            let envelope = OutputEnvelope::new("board", &state.summary(), data);
            writeln!(writer, "{}", serde_json::to_string(&envelope)?)?;
        }
    }
    Ok(())
}
