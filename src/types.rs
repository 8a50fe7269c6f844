// Core types used throughout the backtester

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// One fixed-duration OHLCV interval of a trading pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBar {
    pub timestamp: i64, // open time, ms since epoch
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }
}

/// Ordered bar history of one pair (ascending, unique timestamps)
#[derive(Debug, Clone)]
pub struct PairSeries {
    pub symbol: String,
    pub bars: Vec<PriceBar>,
}

impl PairSeries {
    /// Build a series, sorting bars and dropping duplicate timestamps.
    pub fn new(symbol: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    /// First bar whose open time is at or after `ts`
    pub fn first_at_or_after(&self, ts: i64) -> Option<&PriceBar> {
        let idx = self.bars.partition_point(|b| b.timestamp < ts);
        self.bars.get(idx)
    }
}

/// Best-bid/ask and 24h turnover for one pair, as reported by the venue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub quote_volume: Option<f64>,
}

/// Scalar signals derived from a pair's history. `None` means undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Signals {
    pub pump: Option<f64>,
    pub retracement: Option<f64>,
    pub volume_spike: Option<f64>,
    pub wick_ratio: Option<f64>,
    pub range_ratio: Option<f64>,
    pub spread_bps: Option<f64>,
}

/// Static ranking entry for one candidate pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub symbol: String,
    pub score: f64, // 0..=15
    pub retracement: Option<f64>,
    pub signals: Signals,
}

/// An open simulated position. Closed positions are removed, never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub entry_ts: i64,
    /// Fill price after slippage
    pub entry_price: Decimal,
    /// Cash committed to the position
    pub notional: Decimal,
    /// Quantity bought, net of the entry fee
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Why a position was closed during the replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitReason {
    Gain,
    Stop,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Gain => write!(f, "GAIN"),
            ExitReason::Stop => write!(f, "STOP"),
        }
    }
}

/// Ledger entry, one per fill
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub symbol: String,
    pub side: Side,
    pub timestamp: i64,
    pub price: Decimal,
    /// Cash spent (BUY) or received (SELL)
    pub notional: Decimal,
    pub quantity: Decimal,
    pub pnl: Option<Decimal>,
    pub reason: Option<ExitReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, close: f64) -> PriceBar {
        PriceBar {
            timestamp: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn series_is_sorted_and_deduplicated() {
        let series = PairSeries::new("BTCUSDT", vec![bar(3, 3.0), bar(1, 1.0), bar(3, 9.0), bar(2, 2.0)]);
        let ts: Vec<i64> = series.bars.iter().map(|b| b.timestamp).collect();
        assert_eq!(ts, vec![1, 2, 3]);
        assert_eq!(series.bars[2].close, 3.0);
    }

    #[test]
    fn first_at_or_after_finds_next_bar() {
        let series = PairSeries::new("ETHUSDT", vec![bar(10, 1.0), bar(20, 2.0), bar(40, 4.0)]);
        assert_eq!(series.first_at_or_after(0).map(|b| b.timestamp), Some(10));
        assert_eq!(series.first_at_or_after(20).map(|b| b.timestamp), Some(20));
        assert_eq!(series.first_at_or_after(21).map(|b| b.timestamp), Some(40));
        assert!(series.first_at_or_after(41).is_none());
    }

    #[test]
    fn wick_components() {
        let b = PriceBar {
            timestamp: 0,
            open: 10.0,
            high: 12.0,
            low: 7.0,
            close: 11.0,
            volume: 0.0,
        };
        assert_eq!(b.upper_wick(), 1.0);
        assert_eq!(b.lower_wick(), 3.0);
    }
}
