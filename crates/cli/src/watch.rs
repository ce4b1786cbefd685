//! `itemboard watch`: mount a live session and redraw the board on every
//! change while reading commands from stdin.

use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use itemboard_api_client::ApiClient;
use itemboard_core::ItemId;
use itemboard_runtime_config::RuntimeConfig;
use itemboard_sync::{ItemBackend, RealtimePushSource, SessionHandle, SessionOptions, mount};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info};

use crate::output::{self, OutputFormat};

const HELP: &str = "commands: add <title> | toggle <id> | delete <id> | reload | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Add(String),
    Toggle(ItemId),
    Delete(ItemId),
    Reload,
    Help,
    Quit,
}

/// Parse one stdin line. Blank lines yield `Ok(None)`.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let id = |usage: &str| {
        if rest.is_empty() {
            Err(format!("usage: {usage}"))
        } else {
            Ok(ItemId::from(rest))
        }
    };
    let command = match verb {
        "add" | "a" => Command::Add(rest.to_string()),
        "toggle" | "t" => Command::Toggle(id("toggle <id>")?),
        "delete" | "rm" | "d" => Command::Delete(id("delete <id>")?),
        "reload" | "r" => Command::Reload,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command {other:?}; {HELP}")),
    };
    Ok(Some(command))
}

pub async fn run_watch(config: &RuntimeConfig, client: ApiClient, format: &OutputFormat) -> Result<()> {
    let realtime = client
        .realtime()
        .context("Failed to derive the realtime endpoint")?;
    info!(url = realtime.realtime_url(), "mounting board");
    let push = RealtimePushSource::new(realtime, config.realtime.delete_signal);
    let handle = mount(
        Arc::new(client),
        Arc::new(push),
        SessionOptions::from(&config.realtime),
    );

    let result = drive(&handle, format).await;
    handle.unmount().await;
    result
}

async fn drive(handle: &SessionHandle<ApiClient>, format: &OutputFormat) -> Result<()> {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    drive_with(handle, format, lines, shutdown).await
}

/// Select loop over board changes, command lines and the shutdown signal.
/// End of input only stops reading commands; the board keeps running until
/// `quit` or `shutdown`.
async fn drive_with<B, R>(
    handle: &SessionHandle<B>,
    format: &OutputFormat,
    mut lines: Lines<R>,
    mut shutdown: Pin<&mut impl Future<Output = ()>>,
) -> Result<()>
where
    B: ItemBackend,
    R: AsyncBufRead + Unpin,
{
    let mut board = handle.subscribe();
    let mut input_open = true;

    redraw(&board.borrow_and_update(), format)?;
    if *format == OutputFormat::Text {
        eprintln!("{HELP}");
    }

    loop {
        tokio::select! {
            changed = board.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = board.borrow_and_update().clone();
                redraw(&state, format)?;
            }

            line = lines.next_line(), if input_open => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("stdin closed; watching until a signal arrives");
                    input_open = false;
                    continue;
                };
                match parse_command(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => execute(handle, command).await,
                    Ok(None) => {}
                    Err(message) => eprintln!("{message}"),
                }
            }

            _ = shutdown.as_mut() => break,
        }
    }
    Ok(())
}

/// Run one command. Failures are already on the board; this only echoes
/// what the command returned.
async fn execute<B: ItemBackend>(handle: &SessionHandle<B>, command: Command) {
    let result = match command {
        Command::Add(title) => handle.create_item(&title).await.map(|item| {
            eprintln!("created {}", item.id);
        }),
        Command::Toggle(id) => handle.toggle_item(&id).await.map(|_| ()),
        Command::Delete(id) => handle.delete_item(&id).await.map(|_| ()),
        Command::Reload => handle.reload(),
        Command::Help => {
            eprintln!("{HELP}");
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    if let Err(e) = result {
        eprintln!("{e}");
    }
}

fn redraw(state: &itemboard_sync::BoardState, format: &OutputFormat) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if *format == OutputFormat::Text {
        use std::io::Write;
        writeln!(out)?;
    }
    output::render_board(state, format, &mut out)
}

/// Wait for SIGTERM or Ctrl+C
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
                }
            }
            Err(e) => {
                tracing::warn!("Could not register SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C");
    }
}
