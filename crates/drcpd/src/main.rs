mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use drcpd_config::ConfigStore;
use drcpd_dcp::{EventQueue, PipeTransport};
use drcpd_view::ViewManager;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    if cli.session_dbus || cli.system_dbus {
        tracing::warn!(
            "D-Bus UI command bus selected but not wired in this build; \
             UI events must be posted through the in-process event queue"
        );
    }

    // ========== PHASE 1: configuration ==========
    let config = ConfigStore::load_from_file(&cli.config_file);
    info!(path = %cli.config_file.display(), "configuration loaded");

    // ========== PHASE 2: DCP transport ==========
    let transport = Arc::new(PipeTransport::new(&cli.odcp, &cli.idcp));
    let dcp_queue = drcpd_dcp::DcpQueue::new(transport);
    info!(odcp = %cli.odcp.display(), idcp = %cli.idcp.display(), "DCP queue ready");

    // ========== PHASE 3: view manager + UI event routing ==========
    let view_manager = Arc::new(ViewManager::new());
    let (events, mut event_rx) = EventQueue::new();

    let dispatch_views = view_manager.clone();
    let dispatch_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !dispatch_views.dispatch(&event) {
                tracing::debug!(?event, "UI event not handled by any active view");
            }
        }
    });

    let _ = config;
    let _ = dcp_queue;
    let _ = events;

    info!("drcpd is ready");
    if !cli.fg {
        tracing::debug!("--fg not set; this build always runs attached to its controlling terminal");
    }

    tokio::signal::ctrl_c().await.context("failed to install ctrl-c handler")?;
    info!("shutdown signal received, stopping");

    dispatch_task.abort();
    Ok(())
}

fn init_logging(cli: &Cli) {
    let filter = cli.log_filter();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
