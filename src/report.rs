// Run summary and output files: trade ledger (CSV), summary and score table (JSON)

use crate::config::serialize_decimal;
use crate::simulation::SimulationOutcome;
use crate::types::{ExitReason, ScoreRecord, Side, Trade};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs;
use std::path::Path;

const LEDGER_HEADER: [&str; 8] = ["symbol", "side", "ts", "price", "usdt", "qty", "pnl", "reason"];
const LEDGER_DP: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    #[serde(serialize_with = "serialize_decimal")]
    pub start: Decimal,
    /// Cash plus open positions marked to market
    #[serde(serialize_with = "serialize_decimal")]
    pub end: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub return_pct: Decimal,
    /// Completed round trips (SELL fills)
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub open_positions: usize,
}

pub fn summarize(outcome: &SimulationOutcome, start_capital: Decimal) -> Summary {
    let end = outcome.cash + outcome.unrealized_value;
    let return_pct = if start_capital.is_zero() {
        Decimal::ZERO
    } else {
        (end - start_capital) / start_capital * Decimal::ONE_HUNDRED
    };

    let sells: Vec<&Trade> = outcome.trades.iter().filter(|t| t.side == Side::Sell).collect();
    let wins = sells.iter().filter(|t| t.pnl.map_or(false, |p| p > Decimal::ZERO)).count();

    Summary {
        start: start_capital,
        end,
        return_pct,
        trades: sells.len(),
        wins,
        losses: sells.len() - wins,
        open_positions: outcome.open_positions.len(),
    }
}

#[derive(Debug, Serialize)]
struct LedgerRow<'a> {
    symbol: &'a str,
    side: Side,
    ts: i64,
    price: Decimal,
    usdt: Decimal,
    qty: Decimal,
    pnl: Option<Decimal>,
    reason: Option<ExitReason>,
}

fn tidy(d: Decimal) -> Decimal {
    d.round_dp(LEDGER_DP).normalize()
}

impl<'a> From<&'a Trade> for LedgerRow<'a> {
    fn from(t: &'a Trade) -> Self {
        Self {
            symbol: &t.symbol,
            side: t.side,
            ts: t.timestamp,
            price: tidy(t.price),
            usdt: tidy(t.notional),
            qty: tidy(t.quantity),
            pnl: t.pnl.map(tidy),
            reason: t.reason,
        }
    }
}

/// Write one CSV row per fill. The header is written even when there are no trades.
pub fn write_trade_ledger(path: &Path, trades: &[Trade]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create trade ledger {}", path.display()))?;

    writer.write_record(LEDGER_HEADER)?;
    for trade in trades {
        writer.serialize(LedgerRow::from(trade))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary(path: &Path, summary: &Summary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).with_context(|| format!("Failed to write summary {}", path.display()))
}

pub fn write_score_table(path: &Path, table: &[ScoreRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(table)?;
    fs::write(path, json).with_context(|| format!("Failed to write score table {}", path.display()))
}
