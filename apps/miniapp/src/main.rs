use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{ControllerEvent, SessionController, WebSocketHostChannel};
use storage::Storage;
use tokio::sync::broadcast;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod console;
mod settings;
mod view;

use commands::{parse_command, Command};
use console::{SharedLines, StdinConfirmation};
use settings::{load_settings, prepare_database_url};

/// Terminal front-end for the horse care bot.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "miniapp.toml")]
    config: PathBuf,
    /// Bot relay address, ws(s):// or http(s)://.
    #[arg(long)]
    host_url: Option<String>,
    /// Snapshot cache database, a sqlite url or a plain file path.
    #[arg(long)]
    cache_db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config)?;
    if let Some(host_url) = args.host_url {
        settings.host_url = host_url;
    }
    if let Some(cache_db) = args.cache_db {
        settings.cache_database_url = cache_db;
    }
    settings.validate()?;

    let cache_url = prepare_database_url(&settings.cache_database_url);
    let storage = Storage::new(&cache_url)
        .await
        .with_context(|| format!("failed to open snapshot cache '{cache_url}'"))?;
    storage.health_check().await?;

    let host = WebSocketHostChannel::connect(&settings.host_url).await?;
    info!(host_url = %host.url(), cache_url = %cache_url, "miniapp: starting");

    let lines = console::stdin_lines();
    let controller = SessionController::new_with_dependencies(
        Arc::new(host),
        Arc::new(StdinConfirmation::new(Arc::clone(&lines))),
        Arc::new(storage),
        settings.controller_settings(),
    );

    let render_task = tokio::spawn(render_events(controller.subscribe_events()));
    if let Err(err) = controller.start().await {
        error!(error = %err, "miniapp: session failed to start");
    }
    println!("{}", view::HELP);

    let loop_result = run_commands(&controller, &lines).await;
    let teardown_result = controller.teardown().await;
    render_task.abort();

    loop_result?;
    teardown_result.context("failed to save snapshot on exit")?;
    info!("miniapp: closed");
    Ok(())
}

async fn run_commands(controller: &Arc<SessionController>, lines: &SharedLines) -> Result<()> {
    while let Some(line) = console::next_line(lines).await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        let result = match command {
            Command::Quit => break,
            Command::Help => {
                println!("{}", view::HELP);
                Ok(())
            }
            Command::Show => {
                match controller.snapshot().await {
                    Some(snapshot) => println!("{}", view::render_snapshot(&snapshot)),
                    None => println!("no data yet, try 'refresh'"),
                }
                Ok(())
            }
            Command::Refresh => controller.request_snapshot().await,
            Command::Stat { kind, horse_id } => {
                controller.apply_default_increment(horse_id, kind).await
            }
            Command::Delete(horse_id) => controller
                .request_deletion(horse_id)
                .await
                .map(|sent| {
                    if !sent {
                        println!("deletion cancelled");
                    }
                }),
        };

        // Failures already reached the user as controller events.
        if let Err(err) = result {
            debug!(error = %err, "miniapp: command failed");
        }
    }
    Ok(())
}

async fn render_events(events: broadcast::Receiver<ControllerEvent>) {
    let mut events = BroadcastStream::new(events);
    while let Some(event) = events.next().await {
        match event {
            Ok(ControllerEvent::SnapshotReplaced(snapshot)) => {
                println!("{}", view::render_snapshot(&snapshot));
            }
            Ok(ControllerEvent::ModeChanged(mode)) => {
                if let Some(line) = view::render_mode(mode) {
                    println!("{line}");
                }
            }
            Ok(ControllerEvent::Error(err)) => println!("{}", view::render_error(&err)),
            Ok(ControllerEvent::Notice(notice)) => println!("ok: {notice}"),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "miniapp: view fell behind controller events");
            }
        }
    }
}
