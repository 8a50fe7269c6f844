// Entry point for the wick rotation backtester

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wick_rotation_backtester::api::BybitApi;
use wick_rotation_backtester::config::CliConfig;
use wick_rotation_backtester::report::{summarize, write_score_table, write_summary, write_trade_ledger};
use wick_rotation_backtester::snapshot::SnapshotLoader;
use wick_rotation_backtester::strategies::{build_score_table, RotationStrategy};
use wick_rotation_backtester::simulation::Simulator;
use wick_rotation_backtester::{init_history_file, log_trading_event};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (tracing to stderr)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = CliConfig::parse();

    let history = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.history)
        .with_context(|| format!("Failed to open history file {}", cli.history.display()))?;
    init_history_file(history);

    let json_cfg = cli.load_json_config()?;
    let config = match cli.get_sim_config(&json_cfg) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("❌ Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };
    let base_url = cli.get_base_url(&json_cfg);

    info!("🚀 Starting wick rotation backtest");
    info!(
        "Venue: {} | quote={} | resolution={} | days={} | top_n={} | max_pairs={}",
        base_url, config.quote_asset, config.resolution, config.days, config.top_n, config.max_pairs
    );
    log_trading_event(&format!(
        "RUN START | venue={} | config={}",
        base_url,
        serde_json::to_string(&config)?
    ));

    let api = BybitApi::new(base_url, config.rate_limit())?;
    let loader = SnapshotLoader::new(Arc::new(api), config.clone());
    let now_ms = chrono::Utc::now().timestamp_millis();
    let snapshot = loader.load(now_ms).await?;

    let table = build_score_table(&snapshot, &config);
    for record in &table {
        info!(
            "📊 {:<14} score={:>6.3} retrace={}",
            record.symbol,
            record.score,
            record
                .retracement
                .map(|r| format!("{:.3}", r))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }
    if let Some(path) = &cli.scores_out {
        write_score_table(path, &table)?;
    }

    let simulator = Simulator::new(config.clone(), Box::new(RotationStrategy::new(config.max_pairs)));
    info!("🔁 Replaying with strategy {}", simulator.strategy_name());
    let outcome = simulator.run(&snapshot.pairs, &table);
    let summary = summarize(&outcome, config.start_capital);

    write_trade_ledger(&cli.trade_log, &outcome.trades)?;
    write_summary(&cli.summary, &summary)?;

    let msg = format!(
        "RUN DONE | start={} | end={:.4} | return_pct={:.4} | trades={} | wins={} | losses={} | open={}",
        summary.start, summary.end, summary.return_pct, summary.trades, summary.wins, summary.losses, summary.open_positions
    );
    info!("✅ {}", msg);
    log_trading_event(&msg);
    println!("Done. Summary: {}", serde_json::to_string(&summary)?);

    Ok(())
}
