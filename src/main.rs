#![deny(dead_code)]
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::LinesStream, StreamExt};

mod utils;

use chatsync::{
    config,
    session::{ChannelSink, Input, Session},
    wire::{self, Frame},
    ChatId, ChatOrder, Command, DeliveryStatus, Reconciler,
};

/// Command line arguments for chatsync
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "chatsync: replay chat socket events into a local chat state.",
    long_about = "Reads a JSON-lines script and folds it into a local chat state, then prints \
    the chat list.\n\n\
    Each line is either a socket frame, {\"event\": \"new_message\", \"data\": {...}},\n\
    or a local command, {\"command\": \"send\", \"chat\": {\"kind\": \"direct\", \"id\": \"bob\"}, \"text\": \"hi\"}.\n\
    Blank lines and lines starting with '#' are skipped."
)]
struct Args {
    /// Script to replay, stdin when omitted
    #[arg(value_name = "FILE")]
    script: Option<PathBuf>,

    /// Local user id (overrides the settings file)
    #[arg(short, long)]
    user: Option<String>,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Chat list ordering (overrides the settings file)
    #[arg(long, value_enum)]
    order: Option<ChatOrder>,

    /// Open this chat after the script, e.g. direct:bob or group:g1
    #[arg(long, value_name = "CHAT")]
    open: Option<ChatId>,

    /// Print outbound frames as they are produced
    #[arg(long)]
    show_outbound: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Turn one script line into a session input
fn parse_line(line: &str) -> Result<Input> {
    let value: Value = serde_json::from_str(line).context("line is not JSON")?;
    if value.get("command").is_some() {
        let command: Command = serde_json::from_value(value).context("invalid command")?;
        return Ok(Input::Local(command));
    }
    let frame: Frame = serde_json::from_value(value).context("invalid frame")?;
    let event = wire::decode(frame, chrono::Utc::now())?;
    Ok(Input::Remote(event))
}

fn status_mark(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Sent => "✓",
        DeliveryStatus::Delivered => "✓✓",
        DeliveryStatus::Read => "✓✓ read",
    }
}

fn print_state(reconciler: &Reconciler) {
    let chats = reconciler.chats();
    println!("=== Chats ({}, {} unread) ===", chats.len(), reconciler.total_unread());
    if chats.is_empty() {
        println!("(no conversations)");
    }
    for chat in &chats {
        let unread = if chat.unread_count > 0 {
            format!(" ({})", chat.unread_count)
        } else {
            String::new()
        };
        let presence = match chat.online {
            Some(true) => " •",
            _ => "",
        };
        println!("{}{}{} [{}]: {}", chat.name, presence, unread, chat.id, chat.preview);
    }

    if let Some(open) = reconciler.open_chat_id() {
        println!();
        println!("=== {} ===", open);
        let local = reconciler.local_user_id();
        for message in reconciler.open_messages() {
            let mine = message.sender_id == local;
            let who = if mine {
                "me".to_string()
            } else {
                reconciler.display_name(&message.sender_id)
            };
            let mark = if mine { status_mark(message.delivery_status) } else { "" };
            println!(
                "[{}] {}: {} {}",
                message.timestamp.format("%H:%M"),
                who,
                message.content,
                mark
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    utils::setup_logging(args.log_file.as_deref().and_then(|p| p.to_str()), level)?;

    if let Some(path) = &args.config {
        config::set_config_path_override(path.clone());
        info!("Settings path overridden to: {}", path.display());
    }
    let settings = config::load_settings()?;
    let mut sync_config = settings.into_sync_config(args.user.clone())?;
    if let Some(order) = args.order {
        sync_config = sync_config.with_chat_order(order);
    }
    info!("Replaying as {}", sync_config.local_user_id);

    let (input_tx, input_rx) = mpsc::channel::<Input>(100);
    let (out_tx, mut out_rx) = mpsc::channel::<Frame>(100);

    let session = Session::new(Reconciler::new(sync_config), ChannelSink::new(out_tx));
    let session_task = tokio::spawn(session.run(input_rx));

    let show_outbound = args.show_outbound;
    let outbound_task = tokio::spawn(async move {
        let mut sent = 0usize;
        while let Some(frame) = out_rx.recv().await {
            if show_outbound {
                println!("> {}", frame.to_json_line());
            }
            sent += 1;
        }
        sent
    });

    let reader: Box<dyn AsyncRead + Unpin + Send> = match &args.script {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let mut lines = LinesStream::new(BufReader::new(reader).lines());
    let mut line_no = 0usize;
    let mut rejected = 0usize;
    while let Some(line) = lines.next().await {
        let line = line?;
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match parse_line(trimmed) {
            Ok(input) => {
                debug!("Line {}: {:?}", line_no, input);
                input_tx
                    .send(input)
                    .await
                    .map_err(|_| anyhow!("Session stopped before the script ended"))?;
            }
            Err(e) => {
                rejected += 1;
                warn!("Skipping line {}: {:#}", line_no, e);
            }
        }
    }

    if let Some(chat) = args.open.clone() {
        input_tx
            .send(Input::Local(Command::Open { chat }))
            .await
            .map_err(|_| anyhow!("Session stopped before the script ended"))?;
    }

    // Closing the input ends the session, which drops the outbound sender
    drop(input_tx);
    let reconciler = session_task.await?;
    let sent = outbound_task.await?;
    info!("Replayed {} lines ({} rejected), {} outbound frames", line_no, rejected, sent);

    if show_outbound {
        println!();
    }
    print_state(&reconciler);
    Ok(())
}
