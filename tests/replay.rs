use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use wick_rotation_backtester::report::summarize;
use wick_rotation_backtester::simulation::Simulator;
use wick_rotation_backtester::strategies::RotationStrategy;
use wick_rotation_backtester::{ExitReason, PairSeries, PriceBar, ScoreRecord, Side, Signals, SimConfig};

const STEP: i64 = 15 * 60 * 1000;

fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> PriceBar {
    PriceBar {
        timestamp: 1_700_000_000_000 + i * STEP,
        open,
        high,
        low,
        close,
        volume: 1_000.0,
    }
}

fn table(symbols: &[&str]) -> Vec<ScoreRecord> {
    symbols
        .iter()
        .enumerate()
        .map(|(i, s)| ScoreRecord {
            symbol: s.to_string(),
            score: 10.0 - i as f64 * 0.5,
            retracement: Some(0.5),
            signals: Signals::default(),
        })
        .collect()
}

fn simulator(cfg: SimConfig) -> Simulator {
    let max_pairs = cfg.max_pairs;
    Simulator::new(cfg, Box::new(RotationStrategy::new(max_pairs)))
}

#[test]
fn third_bar_gain_closes_pair_once() {
    let quiet = |i| bar(i, 100.0, 100.5, 99.5, 100.0);
    let mut a_bars: Vec<PriceBar> = (0..8).map(quiet).collect();
    // entry is 100 * 1.002 = 100.2, target 100.2 * 1.025 = 102.705
    a_bars[2] = bar(2, 100.0, 104.0, 99.5, 103.0);
    let b_bars: Vec<PriceBar> = (0..8).map(|i| bar(i, 20.0, 20.1, 19.9, 20.0)).collect();

    let series = vec![PairSeries::new("AUSDT", a_bars), PairSeries::new("BUSDT", b_bars)];
    let outcome = simulator(SimConfig::default()).run(&series, &table(&["AUSDT", "BUSDT"]));

    let a_sells: Vec<_> = outcome
        .trades
        .iter()
        .filter(|t| t.symbol == "AUSDT" && t.side == Side::Sell)
        .collect();
    assert_eq!(a_sells.len(), 1);
    assert_eq!(a_sells[0].reason, Some(ExitReason::Gain));
    assert_eq!(a_sells[0].timestamp, 1_700_000_000_000 + 2 * STEP);
    assert!(outcome
        .trades
        .iter()
        .all(|t| t.reason != Some(ExitReason::Stop)));

    let expected_exit = dec!(100.2) * dec!(1.025) * dec!(0.998) * dec!(0.999);
    assert_eq!(a_sells[0].price, expected_exit);
}

#[test]
fn eight_pairs_enter_on_same_tick() {
    let symbols = ["P1", "P2", "P3", "P4", "P5", "P6", "P7", "P8"];
    let series: Vec<PairSeries> = symbols
        .iter()
        .map(|s| PairSeries::new(*s, (0..4).map(|i| bar(i, 10.0, 10.01, 9.99, 10.0)).collect()))
        .collect();
    let cfg = SimConfig {
        start_capital: dec!(1000),
        per_trade_notional: dec!(50),
        max_pairs: 8,
        ..SimConfig::default()
    };
    let outcome = simulator(cfg).run(&series, &table(&symbols));

    assert_eq!(outcome.cash, dec!(600));
    assert_eq!(outcome.open_positions.len(), 8);
    let first_tick = 1_700_000_000_000;
    assert!(outcome.trades.iter().all(|t| t.side == Side::Buy && t.timestamp == first_tick));
}

#[test]
fn ledger_invariants_hold_over_a_long_replay() {
    let wave = |phase: f64| -> Vec<PriceBar> {
        (0..400)
            .map(|i| {
                let mid = 100.0 + 8.0 * ((i as f64) * 0.21 + phase).sin();
                bar(i, mid, mid * 1.02, mid * 0.96, mid * 1.001)
            })
            .collect()
    };
    let symbols = ["AUSDT", "BUSDT", "CUSDT", "DUSDT"];
    let series: Vec<PairSeries> = symbols
        .iter()
        .enumerate()
        .map(|(k, s)| PairSeries::new(*s, wave(k as f64)))
        .collect();
    let cfg = SimConfig {
        start_capital: dec!(120),
        max_pairs: 3,
        ..SimConfig::default()
    };
    let start = cfg.start_capital;
    let outcome = simulator(cfg).run(&series, &table(&symbols));
    assert!(outcome.trades.iter().any(|t| t.side == Side::Sell));

    // replay the ledger: one open position per symbol, sells follow buys,
    // cash never negative
    let mut open: HashMap<&str, i64> = HashMap::new();
    let mut cash = start;
    for t in &outcome.trades {
        match t.side {
            Side::Buy => {
                assert!(open.insert(t.symbol.as_str(), t.timestamp).is_none());
                cash -= t.notional;
                assert!(cash >= Decimal::ZERO);
            }
            Side::Sell => {
                let bought_at = open.remove(t.symbol.as_str()).expect("sell without buy");
                assert!(bought_at <= t.timestamp);
                assert!(t.reason.is_some());
                cash += t.notional;
            }
        }
    }
    assert_eq!(cash, outcome.cash);
    assert_eq!(open.len(), outcome.open_positions.len());
    assert!(!symbols[3..].iter().any(|s| outcome.trades.iter().any(|t| t.symbol == *s)));

    let first = summarize(&outcome, start);
    let second = summarize(&outcome, start);
    assert_eq!(first, second);
    assert_eq!(first.trades, outcome.trades.iter().filter(|t| t.side == Side::Sell).count());
}
