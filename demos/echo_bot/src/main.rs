//! Echo Bot Demo
//!
//! Drives the dispatcher from the console: every line typed on stdin becomes a
//! text event from a direct chat, and every reply is printed back.
//!
//! # Registrations
//!
//! Registered oldest to newest; the newest matching rule wins:
//!
//! ```text
//! log       on_any()                      logs anything no other rule takes
//! commands  on_kind(Text)                 /echo, /ping, /help, /history
//! group     on_category(Group) (disabled) toggled with /group
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --chat alice
//! cargo run --package echo-bot -- --chat team --category group
//! ```

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use clap::Parser;
use courier::core::{RawEvent, channel_session};
use courier::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(about = "Console echo bot")]
struct Args {
    /// Configuration file (defaults to courier.toml in the current directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chat the console lines come from.
    #[arg(long, default_value = "console")]
    chat: String,

    /// Category of that chat: direct, group or broadcast.
    #[arg(long, default_value = "direct")]
    category: ChatCategory,
}

/// Shared handles the command handler needs.
struct Shared {
    dispatcher: Arc<Dispatcher>,
    group_handler: HandlerId,
}

static SHARED: OnceLock<Shared> = OnceLock::new();

// ============================================================================
// Handler Functions
// ============================================================================

/// Logs every event that no newer rule takes.
async fn log_handler(event: Arc<Event>) {
    info!("{event}");
}

/// Text commands.
async fn command_handler(event: Arc<Event>) -> Option<String> {
    let text = event.text()?.trim();
    let shared = SHARED.get()?;

    if let Some(content) = text.strip_prefix("/echo ") {
        return Some(content.to_string());
    }

    match text {
        "/ping" => Some("Pong!".to_string()),
        "/help" => Some(
            "/echo <text>  echo text\n\
             /ping         pong\n\
             /history <q>  search earlier messages\n\
             /group        toggle the group handler"
                .to_string(),
        ),
        "/group" => {
            let id = shared.group_handler;
            let enabled = shared.dispatcher.registrations().is_enabled(id)?;
            let result = if enabled {
                shared.dispatcher.disable(Some(id))
            } else {
                shared.dispatcher.enable(Some(id))
            };
            Some(match result {
                Ok(()) => format!("group handler enabled: {}", !enabled),
                Err(err) => format!("toggle failed: {err}"),
            })
        }
        _ => {
            let query = text.strip_prefix("/history ")?;
            let hits = shared.dispatcher.search(&HistoryQuery::new().text(query));
            let lines: Vec<String> = hits
                .iter()
                .filter(|hit| hit.text() != event.text())
                .map(|hit| hit.to_string())
                .collect();
            Some(if lines.is_empty() {
                format!("nothing matches '{query}'")
            } else {
                lines.join("\n")
            })
        }
    }
}

/// Answers group messages while enabled.
async fn group_handler(event: Arc<Event>) -> Result<String> {
    let member = event
        .member()
        .ok_or_else(|| anyhow::anyhow!("group event without member"))?;
    Ok(format!("{member} said something in {}", event.chat().display_name()))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (session, channels) = channel_session("echo_bot", 64);

    let mut builder = CourierRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    let runtime = builder.build(Arc::new(session))?;

    runtime.register(on_any().name("log").concurrent(false).handler(log_handler));
    runtime.register(on_kind(EventKind::Text).name("commands").handler(command_handler));
    let group = runtime.register(
        on_category(ChatCategory::Group)
            .kind(EventKind::Text)
            .name("group")
            .enabled(false)
            .handler(group_handler),
    );

    let shared = Shared {
        dispatcher: Arc::clone(runtime.dispatcher()),
        group_handler: group,
    };
    if SHARED.set(shared).is_err() {
        anyhow::bail!("shared state initialized twice");
    }

    // Console -> session. Dropping the feeder at EOF ends the session.
    let feeder = channels.inbound;
    let chat = args.chat.clone();
    let category = args.category;
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let raw = RawEvent::text(chat.as_str(), line).category(category);
                    if feeder.push(raw).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    // Session -> console.
    let mut outbound = channels.outbound;
    tokio::spawn(async move {
        while let Some(sent) = outbound.recv().await {
            println!("[{}] {}", sent.target, sent.text);
        }
    });

    runtime.run().await?;
    Ok(())
}
