mod config;
mod console;
mod credentials;
mod http;
mod logging;
mod plugins;
mod router;
mod scheduler;
mod session;

use std::{collections::BTreeSet, sync::Arc};

use anyhow::{Context as _, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

use bot_core::{EventBus, Session};
use media_store::MediaStore;
use price_watch::{HttpFeed, Notifier, PriceWatcher};

use crate::{
    config::{Args, load_config},
    console::ConsoleTransport,
    credentials::CredentialStore,
    logging::init_tracing,
    plugins::PluginDeps,
    router::CommandRouter,
    session::SessionManager,
};

const INBOX_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present so clap can pick up env vars.
    let _ = dotenvy::dotenv();
    init_tracing()?;
    let args = Args::parse();
    let config = load_config(&args.config)?;

    let bus = EventBus::new();
    let tracker = TaskTracker::new();
    let shutdown = CancellationToken::new();
    let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);

    let console_sender = args
        .console_sender
        .clone()
        .unwrap_or_else(|| config.operator.address.clone());
    let transport = Arc::new(ConsoleTransport::new(&console_sender, config.known_groups()));
    let manager = Arc::new(SessionManager::new(
        transport,
        CredentialStore::new(&args.auth_dir),
        bus.clone(),
        config.operator.address.clone(),
        inbox_tx,
        tracker.clone(),
    ));
    let session: Arc<dyn Session> = Arc::clone(&manager) as Arc<dyn Session>;

    let feed = HttpFeed::new(config.price.url.clone()).context("building price feed")?;
    let watcher = PriceWatcher::new(
        Arc::new(feed),
        config.price.anchors.clone(),
        config.price.offset(),
    );
    let deps = PluginDeps {
        store: Arc::new(MediaStore::new(&args.uploads_dir)),
        board: watcher.board(),
        tracker: tracker.clone(),
    };
    let registry = plugins::build_registry(&config, &deps, &args.plugins_dir).await;
    let commands: BTreeSet<String> = registry
        .entries()
        .await
        .into_iter()
        .filter(|(_, entry)| entry.spec.enabled)
        .flat_map(|(_, entry)| entry.spec.triggers.commands)
        .map(|c| bot_core::normalize_cmd(&c))
        .collect();
    info!(commands = ?commands, "Registered plugin triggers");

    let router = CommandRouter::new(registry, Arc::clone(&session));
    tokio::spawn(router.run(inbox_rx));

    let notifier = Notifier::new(
        Arc::clone(&session),
        config.operator.address.clone(),
        config.price.label.clone(),
        config.price.offset(),
    );
    tokio::spawn(scheduler::run(watcher, notifier, config.price.interval()));

    http::spawn(
        &tracker,
        args.http_addr,
        bus,
        shutdown.clone().cancelled_owned(),
    );

    info!("Starting session... Press Ctrl+C to stop.");
    tokio::select! {
        res = manager.run() => {
            let closure = res?;
            info!(closure = ?closure, "Session ended");
        }
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    shutdown.cancel();
    tracker.close();
    tracker.wait().await;
    Ok(())
}
