// Pair scoring and rotation selection

use crate::config::SimConfig;
use crate::indicators::{impulse_retrace, range_ratio, spread_bps, volume_spike, wick_ratio, TRAILING_BARS};
use crate::snapshot::{Fetched, MarketSnapshot};
use crate::types::{PairSeries, PriceBar, Quote, ScoreRecord, Signals};

pub const MAX_SCORE: f64 = 15.0;

const W_RETRACE: f64 = 0.35;
const W_PUMP: f64 = 0.25;
const W_SPIKE: f64 = 0.20;
const W_WICK: f64 = 0.15;

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// Treat None and NaN alike so one missing signal only zeroes its own term.
fn term(value: Option<f64>, rescale: impl Fn(f64) -> f64) -> f64 {
    match value {
        Some(v) if !v.is_nan() => {
            let t = rescale(v);
            if t.is_nan() {
                0.0
            } else {
                t
            }
        }
        _ => 0.0,
    }
}

/// Weighted 0..=15 score of a pair's signals.
///
/// Retracement peaks at 0.5 and falls to zero at 0 and 1; pump above 5%
/// counts linearly up to 105%; volume spike maps [1, 5] and wickiness maps
/// [0.2, 0.7] onto [0, 1]. Range and spread carry no weight.
pub fn score_signals(signals: &Signals) -> f64 {
    let s_retr = term(signals.retracement, |r| 1.0 - ((r - 0.5).abs() / 0.5).min(1.0));
    let s_pump = term(signals.pump, |p| clamp(p - 0.05, 0.0, 1.0));
    let s_spike = term(signals.volume_spike, |s| clamp((s - 1.0) / 4.0, 0.0, 1.0));
    let s_wick = term(signals.wick_ratio, |w| clamp((w - 0.20) / 0.50, 0.0, 1.0));

    let score_0_1 = W_RETRACE * s_retr + W_PUMP * s_pump + W_SPIKE * s_spike + W_WICK * s_wick;
    MAX_SCORE * clamp(score_0_1, 0.0, 1.0)
}

/// Compute every signal for one pair.
pub fn compute_signals(
    series: &PairSeries,
    daily: &Fetched<Vec<PriceBar>>,
    quote: Option<&Quote>,
    cfg: &SimConfig,
) -> Signals {
    let (pump, retracement) = match daily {
        Fetched::Ready(bars) => match impulse_retrace(bars, cfg.retrace_window_days) {
            Some((p, r)) => (Some(p), Some(r)),
            None => (None, None),
        },
        Fetched::Unavailable(_) => (None, None),
    };

    Signals {
        pump,
        retracement,
        volume_spike: cfg
            .resolution
            .bars_per_day()
            .and_then(|per_day| volume_spike(&series.bars, per_day)),
        wick_ratio: wick_ratio(&series.bars, TRAILING_BARS),
        range_ratio: range_ratio(&series.bars, TRAILING_BARS),
        spread_bps: quote.and_then(|q| spread_bps(q.bid, q.ask)),
    }
}

/// Score every loaded pair, best first. Ties keep the snapshot's volume order.
pub fn build_score_table(snapshot: &MarketSnapshot, cfg: &SimConfig) -> Vec<ScoreRecord> {
    let unavailable = Fetched::Unavailable("daily history not loaded".to_string());
    let mut table: Vec<ScoreRecord> = snapshot
        .pairs
        .iter()
        .map(|series| {
            let daily = snapshot.daily.get(&series.symbol).unwrap_or(&unavailable);
            let signals = compute_signals(series, daily, snapshot.quotes.get(&series.symbol), cfg);
            let score = score_signals(&signals);
            tracing::debug!(symbol = %series.symbol, score, ?signals, "scored pair");
            ScoreRecord {
                symbol: series.symbol.clone(),
                score,
                retracement: signals.retracement,
                signals,
            }
        })
        .collect();

    table.sort_by(|a, b| b.score.total_cmp(&a.score));
    table
}

/// Chooses which pairs may open new positions
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    fn select_enabled(&self, table: &[ScoreRecord]) -> Vec<String>;
}

/// Enables the top `max_pairs` entries of the (static) score table
pub struct RotationStrategy {
    max_pairs: usize,
}

impl RotationStrategy {
    pub fn new(max_pairs: usize) -> Self {
        Self { max_pairs }
    }
}

impl Strategy for RotationStrategy {
    fn name(&self) -> &str {
        "WickRotation"
    }

    fn select_enabled(&self, table: &[ScoreRecord]) -> Vec<String> {
        table
            .iter()
            .take(self.max_pairs)
            .map(|r| r.symbol.clone())
            .collect()
    }
}
