//! discord-moderation - Discord bridge for Teeworlds server moderation
//!
//! Consumes game server events from the message broker, posts them into the
//! Discord channel linked to each server, and turns messages written in a
//! linked channel into command requests for that server.

mod bridge;
mod bus;
mod common;
mod config;
mod discord;
mod processors;
mod vpn;

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info, warn};

use bridge::{LinkRegistry, Service, Shutdown};
use bus::amqp::AmqpBus;
use bus::{BusPublisher, BROADCAST_TOPIC};
use common::messages::tags;
use common::AppError;
use config::{env::get_config_path, load_and_validate, load_links_file, parse_duration, save_links_file, Config};
use discord::client::{build_client, build_http, run_gateway};
use discord::{BotCommands, ChatSink, DiscordHandler, SerenityChat};
use processors::discord_log::DiscordLog;
use processors::vpn::VpnDetector;
use vpn::{BanPolicy, BanRequester, Ingestor, MemoryRangeStore, RangeStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("discord-moderation v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let modules = config.modules.enabled();
    info!("Configuration loaded successfully");
    info!("  Broker: {}", config.broker.address);
    info!("  Queue: {}", config.broker.queue);
    info!(
        "  Modules: {}",
        modules.iter().map(|m| m.name()).collect::<Vec<_>>().join(", ")
    );

    let registry = Arc::new(build_registry(&config)?);
    info!("Loaded {} links", registry.len());

    // The range store must be complete before any join event is checked.
    let store = if config.modules.vpn_detection {
        Some(open_store(&config).await?)
    } else {
        None
    };

    // ============================================================
    // Broker
    // ============================================================
    let bus = Arc::new(AmqpBus::connect(&config.broker).await?);
    let mut exchanges: Vec<&str> = tags::CONSUMED.to_vec();
    exchanges.push(BROADCAST_TOPIC);
    bus.declare_and_bind(&config.broker.queue, &exchanges)
        .await
        .map_err(AppError::from)?;

    // ============================================================
    // Service and processors
    // ============================================================
    let shutdown = Shutdown::new();
    let chat: Arc<dyn ChatSink> = Arc::new(SerenityChat::new(Arc::new(build_http(&config.discord.token)?)));
    let publisher: Arc<dyn BusPublisher> = bus.clone();
    let service = Arc::new(Service::new(registry.clone(), chat.clone(), publisher.clone(), shutdown.clone()));

    if config.modules.discord_logging {
        service.add_event_processor(Arc::new(DiscordLog::new(
            chat.clone(),
            config.discord.skip_join_leave,
            config.discord.skip_whisper,
        )));
    }
    if let Some(store) = &store {
        let policy = BanPolicy {
            command: config.vpn.ban_command.clone(),
            duration: parse_duration(&config.vpn.ban_duration)?,
            broadcast: config.vpn.broadcast_bans,
        };
        let store: Arc<dyn RangeStore> = store.clone();
        service.add_event_processor(Arc::new(VpnDetector::new(
            store,
            BanRequester::new(policy, publisher.clone()),
        )));
    }
    info!("Event processors: {}", service.processor_names().join(", "));

    // ============================================================
    // Discord
    // ============================================================
    let handler = DiscordHandler::new(service.clone(), BotCommands::new(service.clone(), modules));
    let client = build_client(&config.discord.token, handler).await?;

    service.start(bus.as_ref(), &config.broker.queue).await?;

    let mut discord_task = tokio::spawn(run_gateway(client, shutdown.subscribe()));

    tokio::select! {
        biased;
        _ = shutdown_signal() => info!("Shutdown signal received - stopping..."),
        _ = &mut discord_task => warn!("Discord client stopped, shutting down"),
    }

    // ============================================================
    // Graceful shutdown
    // ============================================================
    service.shutdown().await;
    if !discord_task.is_finished() {
        if let Err(e) = discord_task.await {
            warn!("Discord task panicked: {}", e);
        }
    }

    if let Some(store) = store {
        if let Err(e) = store.close().await {
            error!("Failed to save IP range store: {}", e);
        }
    }
    if let Some(path) = &config.discord.links_file {
        match save_links_file(path, &registry.snapshot()) {
            Ok(()) => info!("Saved {} links to {}", registry.len(), path),
            Err(e) => error!("Failed to save links: {}", e),
        }
    }
    bus.close().await;

    info!("Exiting...");
    Ok(())
}

/// Seed the registry from the links file and the configured links.
fn build_registry(config: &Config) -> Result<LinkRegistry> {
    let mut links = match &config.discord.links_file {
        Some(path) => load_links_file(path)?,
        None => Vec::new(),
    };
    for link in &config.discord.links {
        if !links.contains(link) {
            links.push(link.clone());
        }
    }

    let registry = LinkRegistry::from_links(links.iter().map(|l| (l.address.as_str(), l.channel)))
        .map_err(|e| AppError::StartupFatal {
            message: format!("invalid links: {}", e),
        })?;
    Ok(registry)
}

/// Open the range store and ingest the blacklist and whitelist folders.
async fn open_store(config: &Config) -> Result<Arc<MemoryRangeStore>> {
    let store = Arc::new(
        MemoryRangeStore::open(&config.vpn.store_file)
            .await
            .map_err(AppError::from)?,
    );
    info!("Opened IP range store with {} ranges", store.len());

    let ingestor = Ingestor::new(store.clone(), config.vpn.ban_reason.clone());
    let report = ingestor
        .run(&config.vpn.blacklist_root(), &config.vpn.whitelist_root())
        .await
        .map_err(AppError::from)?;
    info!(
        "Ingested {} files ({} unchanged, {} failed): {} ranges added, {} removed",
        report.files_ingested,
        report.files_unchanged,
        report.files_failed,
        report.ranges_inserted,
        report.ranges_removed
    );

    if let Err(e) = store.flush().await {
        warn!("Failed to save IP range store: {}", e);
    }
    Ok(store)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
