use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use link_core::reconciler::ConnectionState;
use link_core::token_store::FileAuthTokenStore;
use link_core::{AuthTokenStore, EngineConfig, EngineEvent, LinkEngine, RequestOutcome};
use tokio::sync::broadcast;
use tokio::time::timeout;

mod settings;
mod sim;

use settings::Settings;
use sim::{SimLinkService, SimOptions};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "desktop.toml")]
    settings: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Demo,
    SetToken { token: String },
    ShowToken,
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    let settings = settings::load_settings(&args.settings);

    match args.command {
        Command::Demo => run_demo(&settings).await,
        Command::SetToken { token } => set_token(&settings, &token).await,
        Command::ShowToken => show_token(&settings).await,
        Command::Status => show_status(&settings).await,
    }
}

fn build_engine(settings: &Settings) -> Arc<LinkEngine> {
    let service = Arc::new(SimLinkService::new(SimOptions {
        connect_delay: Duration::from_millis(settings.connect_delay_ms),
        reject_start: settings.reject_start,
        status_outage_every: settings.status_outage_every,
    }));
    let tokens = Arc::new(FileAuthTokenStore::new(&settings.token_file));
    LinkEngine::new_with_config(
        service,
        tokens,
        EngineConfig {
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
        },
    )
}

async fn run_demo(settings: &Settings) -> Result<()> {
    let engine = build_engine(settings);
    let mut rx = engine.subscribe_events();

    engine.activate().await;
    let ack = engine.request_start().await;
    println!("start acknowledged: {ack:?}");
    if ack != RequestOutcome::Accepted {
        if ack == RequestOutcome::CredentialRequired {
            println!("no auth token stored; run `desktop set-token <token>` first");
        }
        engine.deactivate().await;
        return Ok(());
    }

    let settled = watch_until(&mut rx, Duration::from_secs(30), |state| {
        state != ConnectionState::Connecting
    })
    .await?;

    if settled == ConnectionState::Connected {
        // Hold the link up long enough to see steady polls go by.
        tokio::time::sleep(Duration::from_secs(2)).await;
        let ack = engine.request_stop().await;
        println!("stop acknowledged: {ack:?}");
        watch_until(&mut rx, Duration::from_secs(30), |state| {
            state == ConnectionState::Disconnected
        })
        .await?;
    } else if let Some(message) = engine.current_error().await {
        println!("link failed to start: {message}");
    }

    engine.deactivate().await;
    Ok(())
}

async fn set_token(settings: &Settings, token: &str) -> Result<()> {
    let store = FileAuthTokenStore::new(&settings.token_file);
    if store.load_token().await?.as_deref() == Some(token) {
        println!("token unchanged");
        return Ok(());
    }
    store.store_token(token).await?;
    println!("token stored in {}", settings.token_file.display());
    Ok(())
}

async fn show_token(settings: &Settings) -> Result<()> {
    let store = FileAuthTokenStore::new(&settings.token_file);
    match store.load_token().await? {
        Some(token) => println!("{token}"),
        None => println!("(none)"),
    }
    Ok(())
}

async fn show_status(settings: &Settings) -> Result<()> {
    let engine = build_engine(settings);
    engine.activate().await;
    // Give the immediate first poll a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = engine.snapshot().await;
    println!("state: {:?}", snapshot.state);
    if let Some(message) = snapshot.last_error {
        println!("error: {message}");
    }
    engine.deactivate().await;
    Ok(())
}

async fn watch_until(
    rx: &mut broadcast::Receiver<EngineEvent>,
    limit: Duration,
    settled: impl Fn(ConnectionState) -> bool,
) -> Result<ConnectionState> {
    timeout(limit, async {
        loop {
            match rx.recv().await {
                Ok(EngineEvent::StateChanged(state)) => {
                    println!("state: {state:?}");
                    if settled(state) {
                        break Ok(state);
                    }
                }
                Ok(EngineEvent::ErrorChanged(Some(message))) => println!("error: {message}"),
                Ok(EngineEvent::ErrorChanged(None)) => {}
                Ok(EngineEvent::CredentialRequired) => println!("auth token required"),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(err) => break Err(anyhow!("event stream closed: {err}")),
            }
        }
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for the link to settle"))?
}
