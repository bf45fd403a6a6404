//! LONGSHOT — adaptive tail-betting engine for prediction markets.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores persisted state (or starts fresh), and runs the
//! scan→score→bet→resolve loop with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info};

use longshot::config::AppConfig;
use longshot::engine::{CycleReport, Engine};
use longshot::markets::GammaClient;
use longshot::store::{JsonFileStore, StateStore};

const BANNER: &str = r#"
 _     ___  _   _  ____ ____  _   _  ___ _____
| |   / _ \| \ | |/ ___/ ___|| | | |/ _ \_   _|
| |  | | | |  \| | |  _\___ \| |_| | | | || |
| |__| |_| | |\  | |_| |___) |  _  | |_| || |
|_____\___/|_| \_|\____|____/|_| |_|\___/ |_|

  Adaptive Tail-Betting Engine for Prediction Markets
  v0.1.0 (paper trading)
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    cfg.validate()?;

    init_logging();

    println!("{BANNER}");
    info!(
        scan_interval_secs = cfg.engine.scan_interval_secs,
        price_window = %format!("${}..${}", cfg.markets.price_floor, cfg.markets.price_ceiling),
        stake = %format!("${:.2}", cfg.scorer.stake_usd),
        data_dir = %cfg.engine.data_dir,
        "LONGSHOT starting up"
    );

    // -- Restore or create state -----------------------------------------

    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(&cfg.engine.data_dir));

    // One client per role; the scanner and the resolution source are
    // separate seams even when both talk to the same venue.
    let scanner = GammaClient::new(&cfg.markets.gamma_base_url, cfg.markets.scan_limit)?;
    let resolution = GammaClient::new(&cfg.markets.gamma_base_url, cfg.markets.scan_limit)?;

    let mut engine =
        Engine::from_config(&cfg, store, Box::new(scanner), Box::new(resolution))?;

    let stats = engine.ledger().stats();
    info!(
        bets = stats.total_bets,
        pending = stats.pending,
        trained = engine.scorer().is_trained(),
        buffered = engine.scorer().buffered(),
        "State restored"
    );

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.engine.scan_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.engine.scan_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match engine.run_cycle(Utc::now()).await {
                    Ok(report) => log_cycle_report(&report),
                    Err(e) => error!(error = %e, "Cycle failed, continuing to next"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // Save final state
    engine.save()?;
    let stats = engine.ledger().stats();
    info!(
        bets = stats.total_bets,
        pending = stats.pending,
        profit = %format!("${:.2}", stats.total_profit),
        hit_rate = %format!("{:.1}%", stats.hit_rate),
        "LONGSHOT shut down cleanly."
    );

    Ok(())
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle,
        scanned = report.scanned,
        candidates = report.candidates,
        placed = report.placed,
        watched = report.watched,
        skipped = report.skipped,
        resolved = report
            .resolution
            .as_ref()
            .map(|r| r.newly_resolved.len())
            .unwrap_or(0),
        retrained = report.retrained,
        elapsed_ms = report.elapsed_ms,
        "Cycle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("longshot=info"));

    let json_logging = std::env::var("LONGSHOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
