//! `gridmatch-node`: one matching engine, one settlement coordinator and
//! the API in front of them, against the in-process ledger.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use gridmatch_ingress::node::{init_logging, load_config, parse_group, shutdown_signal};
use gridmatch_ingress::{AppState, BroadcastHub, router};
use gridmatch_matchcore::{InMemoryOrderStore, MatchingEngine};
use gridmatch_settlement::{
    Control, InMemoryBlobStore, InMemoryLedger, InMemorySortedResultStore, LedgerGateway,
    RoundClock, SortingCoordinator,
};
use gridmatch_types::{GroupId, ParticipantId, constants};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gridmatch-node")]
#[command(version)]
#[command(about = "Energy trade matching and settlement sorting node", long_about = None)]
struct Cli {
    /// TOML config file; defaults apply when omitted
    #[arg(short, long, env = "GRIDMATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the API listen address
    #[arg(short, long, env = "GRIDMATCH_LISTEN")]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long, env = "GRIDMATCH_LOG_JSON")]
    log_json: bool,

    /// Register a settlement group with the local ledger: <id>=<addr>,<addr>...
    #[arg(long = "group", value_parser = parse_group)]
    groups: Vec<(GroupId, Vec<ParticipantId>)>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    config.validate()?;

    info!(
        version = constants::VERSION,
        market = %config.default_market,
        "Starting {}",
        constants::ENGINE_NAME
    );

    let hub = Arc::new(BroadcastHub::new(&config.broadcast));
    let engine = MatchingEngine::restore(Arc::new(InMemoryOrderStore::new()), hub.clone())
        .await?
        .with_default_market(config.default_market.clone());

    let ledger = Arc::new(InMemoryLedger::new());
    for (group, members) in cli.groups {
        info!(group = %group, members = members.len(), "Registering settlement group");
        ledger.register_group(group, members);
    }
    let coordinator = Arc::new(
        SortingCoordinator::new(
            ledger.clone(),
            Arc::new(InMemorySortedResultStore::new()),
            hub.clone(),
            &config.settlement,
        )
        .with_blob_store(Arc::new(InMemoryBlobStore::new())),
    );

    let events = ledger.subscribe(constants::SORTING_NEEDED_EVENT)?;
    let (control_tx, control_rx) = mpsc::channel(8);
    let coordinator_task = tokio::spawn(Arc::clone(&coordinator).run(events, control_rx));

    let (shutdown_tx, _) = broadcast::channel(1);
    let clock = RoundClock::new(ledger.clone(), &config.settlement);
    let clock_task = tokio::spawn(clock.run(shutdown_tx.subscribe()));

    let app = router(AppState::new(Arc::new(engine), coordinator, hub));
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    let _ = shutdown_tx.send(());
    let _ = control_tx.send(Control::Shutdown).await;
    let (coordinator_done, clock_done) = tokio::join!(coordinator_task, clock_task);
    coordinator_done?;
    clock_done?;
    info!("Shutdown complete");
    Ok(())
}
