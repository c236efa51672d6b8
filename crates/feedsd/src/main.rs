//! feedsd: feeds service daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use feeds_core::config::FeedsConfig;
use feeds_core::obj::UserInfo;
use feeds_services::did::OWNER_USER_ID;
use feeds_services::service_method::{CloudDrive, FolderDrive};
use feeds_services::{
    CommandHandler, FeedsStore, ServiceContext, StaticTokenResolver, TokenResolver,
};

mod frame;
mod server;
mod transport;

use server::{Connections, PeerServer};
use transport::PeerTransport;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = FeedsConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = FeedsConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        FeedsConfig::default()
    });

    let listen_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.network.listen_addr.clone());
    tracing::info!(listen_addr = %listen_addr, service = %config.service.name, "feedsd starting");

    // Storage
    let database_path = &config.storage.database_path;
    let store = Arc::new(
        FeedsStore::open(database_path)
            .with_context(|| format!("failed to open {}", database_path.display()))?,
    );
    tracing::info!(path = %database_path.display(), "store opened");

    // DID layer
    let resolver = StaticTokenResolver::with_persistence(config.auth.tokens_path.clone())?;
    if !config.auth.owner_did.is_empty() {
        let declared = resolver
            .declare_owner(&config.auth.owner_did)
            .with_context(|| format!("cannot declare owner {}", config.auth.owner_did))?;
        if declared {
            store.upsert_user(&UserInfo {
                user_id: OWNER_USER_ID,
                did: config.auth.owner_did.clone(),
                is_owner: true,
                ..Default::default()
            })?;
        }
    }
    if resolver.owner_did().is_none() {
        tracing::warn!("no owner declared, waiting for declare_owner");
    }
    resolver.set_ready(config.auth.ready);
    if !config.auth.ready {
        tracing::warn!("did layer marked not ready, authenticated methods will be refused");
    }

    // Command handler
    let transport = PeerTransport::new();
    let backups = database_path
        .parent()
        .map(|p| p.join("backups"))
        .unwrap_or_else(|| PathBuf::from("backups"));
    let mut ctx = ServiceContext::new(store, Arc::new(resolver), Arc::new(transport.clone()));
    ctx.max_envelope_bytes = config.rpc.max_envelope_bytes;
    ctx.version_code = config.service.version_code;
    let local: Arc<dyn CloudDrive> = Arc::new(FolderDrive::new(backups.clone()));
    ctx.drives.push(("local".to_string(), local));
    tracing::info!(path = %backups.display(), "local backup drive");
    let handler = Arc::new(CommandHandler::new(ctx));

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, workers = config.workers(), "listening for peers");

    let connections = Connections::new(
        handler,
        transport,
        config.workers(),
        config.network.max_frame_bytes,
    );
    let server_task = tokio::spawn(PeerServer::new(listener, connections, shutdown_tx.subscribe()).run());

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = server_task        => tracing::error!("peer server exited: {:?}", r),
    }

    Ok(())
}
