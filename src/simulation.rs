// Timeline replay with a simulated spot portfolio

use crate::config::SimConfig;
use crate::strategies::Strategy;
use crate::types::{ExitReason, PairSeries, Position, PriceBar, ScoreRecord, Side, Trade};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Mutable run state, owned by one replay and threaded through every tick
#[derive(Debug, Clone)]
pub struct SimulationContext {
    pub cash: Decimal,
    /// Open positions only, at most one per symbol
    pub positions: BTreeMap<String, Position>,
    pub enabled: Vec<String>,
    pub last_recalc: Option<i64>,
    pub trades: Vec<Trade>,
}

impl SimulationContext {
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
            enabled: Vec::new(),
            last_recalc: None,
            trades: Vec::new(),
        }
    }

    fn recalc_due(&self, ts: i64, interval_ms: i64) -> bool {
        match self.last_recalc {
            None => true,
            Some(last) => ts - last >= interval_ms,
        }
    }
}

/// Final state of a replay
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    pub trades: Vec<Trade>,
    pub cash: Decimal,
    /// Positions still open when the window ended
    pub open_positions: Vec<Position>,
    /// Open positions valued at their pair's last close
    pub unrealized_value: Decimal,
}

/// Sorted union of every bar timestamp across the candidate pairs
pub fn build_timeline(series: &[PairSeries]) -> Vec<i64> {
    series
        .iter()
        .flat_map(|s| s.bars.iter().map(|b| b.timestamp))
        .collect::<BTreeSet<i64>>()
        .into_iter()
        .collect()
}

pub struct Simulator {
    config: SimConfig,
    strategy: Box<dyn Strategy>,
}

impl Simulator {
    pub fn new(config: SimConfig, strategy: Box<dyn Strategy>) -> Self {
        Self { config, strategy }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Replay the whole window and mark leftover positions to market.
    pub fn run(&self, series: &[PairSeries], table: &[ScoreRecord]) -> SimulationOutcome {
        let by_symbol: HashMap<&str, &PairSeries> = series.iter().map(|s| (s.symbol.as_str(), s)).collect();
        let timeline = build_timeline(series);
        info!(
            "Replaying {} ticks over {} pairs with strategy {}",
            timeline.len(),
            series.len(),
            self.strategy.name()
        );

        let mut ctx = SimulationContext::new(self.config.start_capital);
        for &ts in &timeline {
            self.step(&mut ctx, ts, &by_symbol, table);
        }

        let unrealized_value = mark_to_market(&ctx.positions, &by_symbol);
        SimulationOutcome {
            trades: ctx.trades,
            cash: ctx.cash,
            open_positions: ctx.positions.into_values().collect(),
            unrealized_value,
        }
    }

    /// Process one timeline tick: reselect the enabled set if due, try
    /// entries, then evaluate exits.
    pub fn step(
        &self,
        ctx: &mut SimulationContext,
        ts: i64,
        series: &HashMap<&str, &PairSeries>,
        table: &[ScoreRecord],
    ) {
        if ctx.recalc_due(ts, self.config.recalc_interval_ms()) {
            ctx.enabled = self.strategy.select_enabled(table);
            ctx.last_recalc = Some(ts);
            debug!(ts, enabled = ?ctx.enabled, "recalculated enabled set");
        }

        let enabled = ctx.enabled.clone();
        for symbol in &enabled {
            if ctx.positions.contains_key(symbol) {
                continue;
            }
            if let Some(bar) = series.get(symbol.as_str()).and_then(|s| s.first_at_or_after(ts)) {
                self.try_enter(ctx, symbol, bar);
            }
        }

        let open: Vec<String> = ctx.positions.keys().cloned().collect();
        for symbol in &open {
            if let Some(bar) = series.get(symbol.as_str()).and_then(|s| s.first_at_or_after(ts)) {
                self.check_exit(ctx, symbol, bar);
            }
        }
    }

    /// Open a position at the bar's open. Returns false if cash is short or
    /// the bar is unusable.
    fn try_enter(&self, ctx: &mut SimulationContext, symbol: &str, bar: &PriceBar) -> bool {
        let cfg = &self.config;
        let available = ctx.cash.max(Decimal::ZERO);
        if available < cfg.per_trade_notional {
            return false;
        }

        let open = match Decimal::from_f64(bar.open) {
            Some(p) if p > Decimal::ZERO => p,
            _ => {
                warn!(symbol, ts = bar.timestamp, open = bar.open, "unusable open price, skipping entry");
                return false;
            }
        };

        let entry_price = open * (Decimal::ONE + cfg.slippage);
        let quantity = cfg.per_trade_notional * (Decimal::ONE - cfg.fee_rate) / entry_price;
        ctx.cash -= cfg.per_trade_notional;
        debug_assert!(ctx.cash >= Decimal::ZERO);

        ctx.positions.insert(
            symbol.to_string(),
            Position {
                symbol: symbol.to_string(),
                entry_ts: bar.timestamp,
                entry_price,
                notional: cfg.per_trade_notional,
                quantity,
            },
        );
        ctx.trades.push(Trade {
            symbol: symbol.to_string(),
            side: Side::Buy,
            timestamp: bar.timestamp,
            price: entry_price,
            notional: cfg.per_trade_notional,
            quantity,
            pnl: None,
            reason: None,
        });

        let msg = format!(
            "[SIM] BUY  | symbol={} | ts={} | price={:.8} | qty={:.8} | cash={:.4}",
            symbol, bar.timestamp, entry_price, quantity, ctx.cash
        );
        info!("{}", msg);
        crate::log_trading_event(&msg);
        true
    }

    /// Close the position if the bar crosses its target or stop. The target
    /// is checked first, so a bar crossing both closes as GAIN.
    fn check_exit(&self, ctx: &mut SimulationContext, symbol: &str, bar: &PriceBar) -> Option<ExitReason> {
        let cfg = &self.config;
        let position = ctx.positions.get(symbol)?;

        let (high, low) = match (Decimal::from_f64(bar.high), Decimal::from_f64(bar.low)) {
            (Some(h), Some(l)) => (h, l),
            _ => {
                warn!(symbol, ts = bar.timestamp, "unusable high/low, skipping exit check");
                return None;
            }
        };

        let target_price = position.entry_price * (Decimal::ONE + cfg.gain_target);
        let stop_price = position.entry_price * (Decimal::ONE + cfg.stop_loss);

        let (reason, level) = if high >= target_price {
            (ExitReason::Gain, target_price)
        } else if low <= stop_price {
            (ExitReason::Stop, stop_price)
        } else {
            return None;
        };

        let exit_price = level * (Decimal::ONE - cfg.slippage) * (Decimal::ONE - cfg.fee_rate);
        let position = ctx.positions.remove(symbol)?;
        let proceeds = position.quantity * exit_price;
        let pnl = proceeds - position.notional;
        ctx.cash += proceeds;

        ctx.trades.push(Trade {
            symbol: symbol.to_string(),
            side: Side::Sell,
            timestamp: bar.timestamp,
            price: exit_price,
            notional: proceeds,
            quantity: position.quantity,
            pnl: Some(pnl),
            reason: Some(reason),
        });

        let msg = format!(
            "[SIM] SELL | symbol={} | ts={} | reason={} | price={:.8} | pnl={:.4} | cash={:.4}",
            symbol, bar.timestamp, reason, exit_price, pnl, ctx.cash
        );
        info!("{}", msg);
        crate::log_trading_event(&msg);
        Some(reason)
    }
}

/// Value open positions at their pair's last known close. A position whose
/// series has no usable close is valued at its entry price.
pub fn mark_to_market(positions: &BTreeMap<String, Position>, series: &HashMap<&str, &PairSeries>) -> Decimal {
    positions
        .values()
        .map(|p| {
            let last_close = series
                .get(p.symbol.as_str())
                .and_then(|s| s.bars.iter().rev().map(|b| b.close).find(|c| c.is_finite()))
                .and_then(Decimal::from_f64);
            match last_close {
                Some(close) => p.quantity * close,
                None => {
                    warn!(symbol = %p.symbol, "no close price to mark position, using entry price");
                    p.quantity * p.entry_price
                }
            }
        })
        .sum()
}
