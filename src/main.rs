use axum::Router;
use clap::{Parser, Subcommand};
use matching_core::instrument::SymbolRegistry;
use matching_core::snapshot::BookSnapshot;
use matching_core::state::AppState;
use matching_core::utils::shutdown_token;
use matching_core::{api, market_maker, simulate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "engine-cli")]
#[command(
    author = "Andrew Odiit",
    version = "0.1",
    about = "A demo of a price-time priority crypto matching engine"
)]
struct Cli {
    /// Optional JSON file of additional/overriding symbol configs
    /// (array of `SymbolConfig`), consulted in addition to the two
    /// built-in default pairs.
    #[arg(long, global = true)]
    symbols: Option<PathBuf>,

    /// Directory holding `{symbol}.json` warm-restart snapshots, both
    /// read on startup (if present) and written on graceful shutdown.
    #[arg(long, global = true, default_value = "snapshots")]
    snapshot_dir: PathBuf,

    /// Directory for the ParityDB-backed trade store.
    #[arg(long, global = true, default_value = "trade_store")]
    store_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WS server only.
    Server { port: u16 },
    /// Run the server plus a market-maker bot and a noisy-flow
    /// simulator against it, for `secs` seconds (0 = run forever).
    Simulate { port: u16, secs: u64 },
}

fn load_registry(symbols_path: &Option<PathBuf>) -> anyhow::Result<SymbolRegistry> {
    let mut registry = SymbolRegistry::with_default_pairs();
    if let Some(path) = symbols_path {
        let raw = std::fs::read_to_string(path)?;
        registry.load_from_json(&raw)?;
    }
    Ok(registry)
}

fn load_snapshots(dir: &Path, registry: &SymbolRegistry) -> HashMap<String, BookSnapshot> {
    let mut out = HashMap::new();
    for cfg in registry.symbols() {
        let path = dir.join(format!("{}.json", cfg.symbol));
        match BookSnapshot::load(&path) {
            Ok(snap) => {
                tracing::info!(symbol = %cfg.symbol, path = %path.display(), "restored warm-start snapshot");
                out.insert(cfg.symbol.clone(), snap);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(symbol = %cfg.symbol, error = %e, "failed to load snapshot"),
        }
    }
    out
}

async fn save_snapshots(dir: &Path, state: &AppState) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!(error = %e, "failed to create snapshot directory");
        return;
    }
    for (symbol, snapshot) in state.export_all_snapshots().await {
        let path = dir.join(format!("{symbol}.json"));
        if let Err(e) = snapshot.save(&path) {
            tracing::warn!(symbol, error = %e, "failed to save snapshot");
        } else {
            tracing::info!(symbol, path = %path.display(), "saved warm-start snapshot");
        }
    }
}

async fn wait_for_server(api_base: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    loop {
        match client.get(format!("{}/book/BTC-USD", api_base)).send().await {
            Ok(resp) if resp.status().is_success() => break,
            _ => tokio::time::sleep(Duration::from_millis(25)).await,
        };
    }
    Ok(())
}

async fn seed_book(api_base: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    for (side, price) in &[("buy", "48"), ("sell", "52")] {
        client
            .post(format!("{}/orders", api_base))
            .json(&serde_json::json!({
                "symbol": "BTC-USD",
                "side": side,
                "kind": "limit",
                "limit_price": price,
                "quantity": "10",
            }))
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(side, price, "seeded resting orders");
    }
    Ok(())
}

async fn get_app_listener(port: u16, state: AppState) -> anyhow::Result<(TcpListener, Router)> {
    let app = api::router(state);
    let ep = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(ep).await?;
    Ok((listener, app))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let registry = load_registry(&cli.symbols)?;
    let snapshots = load_snapshots(&cli.snapshot_dir, &registry);

    let token = shutdown_token();
    let server_token = token.clone();
    let mm_token = token.clone();
    let sim_token = token.clone();

    // Lanes get their own cancellation token rather than the ctrl-c one: a
    // lane must stay alive long enough for `save_snapshots` to drain it
    // after the server and bots have wound down, not race them to exit.
    let lane_token = tokio_util::sync::CancellationToken::new();
    let state = AppState::new(&cli.store_path, registry, lane_token.clone(), snapshots).await?;
    let snapshot_dir = cli.snapshot_dir.clone();
    let base = "http://127.0.0.1".to_string();

    match cli.command {
        Commands::Server { port } => {
            let (listener, app) = get_app_listener(port, state.clone()).await?;
            let svh = tokio::spawn(async move {
                tracing::info!("HTTP/WS server listening on 0.0.0.0:{port}");
                axum::serve(listener, app)
                    .with_graceful_shutdown(server_token.cancelled_owned())
                    .await
                    .unwrap();
            });
            svh.await?;
        }
        Commands::Simulate { port, secs } => {
            let mut handlers = tokio::task::JoinSet::new();
            let (listener, app) = get_app_listener(port, state.clone()).await?;
            tracing::warn!(port, secs, "spawning simulate run");
            handlers.spawn(async move {
                tracing::info!("HTTP/WS server listening on 0.0.0.0:{port}");
                axum::serve(listener, app)
                    .with_graceful_shutdown(server_token.cancelled_owned())
                    .await
                    .unwrap();
            });

            let ep = format!("{base}:{port}");
            wait_for_server(&ep).await?;
            seed_book(&ep).await?;

            let mmb = ep.clone();
            handlers.spawn(async move {
                if let Err(e) = market_maker::run_market_maker(&mmb, "BTC-USD".to_string(), mm_token).await
                {
                    tracing::error!(error = ?e, "market maker exited");
                }
            });

            let simb = ep.clone();
            handlers.spawn(async move {
                if let Err(e) = simulate::run_simulation(
                    simulate::SimConfig {
                        api_base: simb,
                        symbol: "BTC-USD".to_string(),
                        run_secs: if secs == 0 { None } else { Some(secs) },
                        attack_rate_hz: 5.0,
                        noise_sigma: 0.5,
                        mean_qty: 2.0,
                    },
                    sim_token,
                )
                .await
                {
                    tracing::error!(error = ?e, "simulation exited");
                }
            });

            handlers.join_all().await;
        }
    }

    save_snapshots(&snapshot_dir, &state).await;
    Ok(())
}
