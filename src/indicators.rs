// Candle signals: impulse/retracement, volume spike, wickiness, range, spread
//
// Every function returns None when its input is too short or degenerate, so
// callers treat "undefined" uniformly.

use crate::types::PriceBar;

/// Minimum daily bars required for the impulse/retracement signal
pub const MIN_DAILY_BARS: usize = 10;

/// Trailing window (in bars) for wick and range ratios
pub const TRAILING_BARS: usize = 96;

/// Floor for a bar's range in the wick ratio
const RANGE_EPSILON: f64 = 1e-12;

/// Days compared against the most recent day in the volume spike
const SPIKE_BASELINE_DAYS: usize = 7;

fn trailing(bars: &[PriceBar], n: usize) -> &[PriceBar] {
    &bars[bars.len().saturating_sub(n)..]
}

/// Pump and retracement of the trailing `window_days` daily bars.
///
/// pump = (high - low) / low, retracement = (high - close) / (high - low),
/// where high/low span the window and close is the last bar's close.
/// Returns None if fewer than ten bars are available, if low <= 0 or if
/// high <= low.
pub fn impulse_retrace(daily: &[PriceBar], window_days: usize) -> Option<(f64, f64)> {
    if daily.len() < MIN_DAILY_BARS {
        return None;
    }
    let window = trailing(daily, window_days);
    let low = window.iter().map(|b| b.low).filter(|v| !v.is_nan()).fold(f64::INFINITY, f64::min);
    let high = window.iter().map(|b| b.high).filter(|v| !v.is_nan()).fold(f64::NEG_INFINITY, f64::max);
    let current = window.last()?.close;

    if !low.is_finite() || !high.is_finite() || !current.is_finite() {
        return None;
    }
    if low <= 0.0 || high <= low {
        return None;
    }
    let pump = (high - low) / low;
    let retr = (high - current) / (high - low);
    Some((pump, retr))
}

/// Most recent day's volume divided by the mean daily volume of the seven
/// days before it.
pub fn volume_spike(bars: &[PriceBar], bars_per_day: usize) -> Option<f64> {
    let bars_per_day = bars_per_day.max(1);
    let needed = bars_per_day * (SPIKE_BASELINE_DAYS + 1);
    if bars.len() < needed {
        return None;
    }
    let window = trailing(bars, needed);
    let (baseline, last_day) = window.split_at(bars_per_day * SPIKE_BASELINE_DAYS);

    let last24: f64 = last_day.iter().map(|b| b.volume).sum();
    let avg24 = baseline
        .chunks(bars_per_day)
        .map(|day| day.iter().map(|b| b.volume).sum::<f64>())
        .sum::<f64>()
        / SPIKE_BASELINE_DAYS as f64;

    if avg24 > 0.0 && last24.is_finite() {
        Some(last24 / avg24)
    } else {
        None
    }
}

/// Mean of (upper wick + lower wick) / range over the trailing `window` bars.
pub fn wick_ratio(bars: &[PriceBar], window: usize) -> Option<f64> {
    let values: Vec<f64> = trailing(bars, window)
        .iter()
        .map(|b| {
            let range = (b.high - b.low).max(RANGE_EPSILON);
            (b.upper_wick() + b.lower_wick()) / range
        })
        .filter(|v| !v.is_nan())
        .collect();

    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(mean.clamp(0.0, 1.0))
}

/// (max high - min low) / min low over the trailing `window` bars.
pub fn range_ratio(bars: &[PriceBar], window: usize) -> Option<f64> {
    let window = trailing(bars, window);
    if window.is_empty() {
        return None;
    }
    let hi = window.iter().map(|b| b.high).filter(|v| !v.is_nan()).fold(f64::NEG_INFINITY, f64::max);
    let lo = window.iter().map(|b| b.low).filter(|v| !v.is_nan()).fold(f64::INFINITY, f64::min);
    if !hi.is_finite() || !lo.is_finite() || lo <= 0.0 {
        return None;
    }
    Some(((hi - lo) / lo).max(0.0))
}

/// Bid/ask spread in basis points of the mid price.
pub fn spread_bps(bid: Option<f64>, ask: Option<f64>) -> Option<f64> {
    match (bid, ask) {
        (Some(bid), Some(ask)) if bid > 0.0 && ask > 0.0 => {
            let mid = (ask + bid) / 2.0;
            Some((ask - bid) / mid * 10_000.0)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ohlc(ts: i64, open: f64, high: f64, low: f64, close: f64) -> PriceBar {
        PriceBar {
            timestamp: ts,
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn with_volume(ts: i64, volume: f64) -> PriceBar {
        PriceBar {
            timestamp: ts,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume,
        }
    }

    #[test]
    fn retrace_needs_ten_bars() {
        let bars: Vec<PriceBar> = (0..9).map(|i| ohlc(i, 1.0, 2.0, 1.0, 1.5)).collect();
        assert!(impulse_retrace(&bars, 35).is_none());
    }

    #[test]
    fn retrace_half_way_back() {
        let mut bars: Vec<PriceBar> = (0..12).map(|i| ohlc(i, 10.0, 10.0, 10.0, 10.0)).collect();
        bars[5] = ohlc(5, 10.0, 20.0, 10.0, 20.0);
        bars[11] = ohlc(11, 15.0, 15.0, 15.0, 15.0);
        let (pump, retr) = impulse_retrace(&bars, 35).unwrap();
        assert!((pump - 1.0).abs() < 1e-12);
        assert!((retr - 0.5).abs() < 1e-12);
    }

    #[test]
    fn retrace_uses_only_trailing_window() {
        let mut bars: Vec<PriceBar> = (0..20).map(|i| ohlc(i, 10.0, 12.0, 10.0, 11.0)).collect();
        // outside a 10-day window
        bars[0] = ohlc(0, 10.0, 100.0, 1.0, 50.0);
        let (pump, _) = impulse_retrace(&bars, 10).unwrap();
        assert!((pump - 0.2).abs() < 1e-12);
    }

    #[test]
    fn retrace_flat_window_is_undefined() {
        let bars: Vec<PriceBar> = (0..15).map(|i| ohlc(i, 5.0, 5.0, 5.0, 5.0)).collect();
        assert!(impulse_retrace(&bars, 35).is_none());
    }

    #[test]
    fn volume_spike_compares_last_day_to_week() {
        let per_day = 4;
        let mut bars: Vec<PriceBar> = (0..(per_day * 7) as i64).map(|i| with_volume(i, 1.0)).collect();
        bars.extend((0..per_day as i64).map(|i| with_volume(100 + i, 3.0)));
        let spike = volume_spike(&bars, per_day).unwrap();
        assert!((spike - 3.0).abs() < 1e-12);
    }

    #[test]
    fn volume_spike_insufficient_history() {
        let bars: Vec<PriceBar> = (0..31).map(|i| with_volume(i, 1.0)).collect();
        assert!(volume_spike(&bars, 4).is_none());
        let silent: Vec<PriceBar> = (0..32).map(|i| with_volume(i, 0.0)).collect();
        assert!(volume_spike(&silent, 4).is_none());
    }

    #[test]
    fn wick_ratio_bounds() {
        let bars = vec![
            ohlc(0, 10.0, 12.0, 8.0, 11.0),  // wicks 1 + 2 over range 4
            ohlc(1, 10.0, 10.0, 10.0, 10.0), // zero range
            ohlc(2, 8.0, 12.0, 8.0, 12.0),   // full body
            ohlc(3, 10.0, 15.0, 5.0, 10.0),  // doji, all wick
        ];
        let w = wick_ratio(&bars, TRAILING_BARS).unwrap();
        assert!((0.0..=1.0).contains(&w));
        assert!((w - (0.75 + 0.0 + 0.0 + 1.0) / 4.0).abs() < 1e-12);
        assert!(wick_ratio(&[], TRAILING_BARS).is_none());
    }

    #[test]
    fn wick_ratio_uses_trailing_window() {
        let mut bars = vec![ohlc(0, 10.0, 15.0, 5.0, 10.0)];
        bars.extend((1..=3).map(|i| ohlc(i, 8.0, 12.0, 8.0, 12.0)));
        assert_eq!(wick_ratio(&bars, 3), Some(0.0));
    }

    #[test]
    fn range_ratio_non_negative() {
        let bars = vec![ohlc(0, 10.0, 11.0, 9.0, 10.0), ohlc(1, 10.0, 12.0, 10.0, 11.0)];
        let r = range_ratio(&bars, TRAILING_BARS).unwrap();
        assert!(r >= 0.0);
        assert!((r - 3.0 / 9.0).abs() < 1e-12);
        assert!(range_ratio(&[ohlc(0, 0.0, 1.0, 0.0, 1.0)], TRAILING_BARS).is_none());
    }

    #[test]
    fn spread_in_basis_points() {
        let s = spread_bps(Some(99.0), Some(101.0)).unwrap();
        assert!((s - 200.0).abs() < 1e-9);
        assert!(spread_bps(Some(0.0), Some(101.0)).is_none());
        assert!(spread_bps(None, Some(101.0)).is_none());
    }
}
