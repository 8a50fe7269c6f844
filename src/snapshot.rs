// Market snapshot loading: rank pairs by volume, fetch their bar history

use crate::api::MarketVenue;
use crate::config::{Resolution, SimConfig};
use crate::types::{PairSeries, PriceBar, Quote};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

/// Extra daily bars requested beyond the retracement window
const DAILY_PADDING_DAYS: i64 = 20;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Outcome of a best-effort fetch
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> Fetched<T> {
    pub fn from_result<E: Display>(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(v) => Fetched::Ready(v),
            Err(e) => Fetched::Unavailable(e.to_string()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Fetched::Ready(_))
    }
}

/// Everything the score builder and simulator need from the venue
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    /// Candidate pairs with their replay-resolution history, highest volume first
    pub pairs: Vec<PairSeries>,
    /// Daily history per candidate, for the retracement signal
    pub daily: HashMap<String, Fetched<Vec<PriceBar>>>,
    pub quotes: HashMap<String, Quote>,
}

/// Top `n` pairs by 24h quote volume. Missing volume ranks as zero; ties keep
/// listing order.
pub fn rank_by_volume(pairs: &[String], quotes: &HashMap<String, Quote>, n: usize) -> Vec<String> {
    let volume = |symbol: &String| {
        quotes
            .get(symbol)
            .and_then(|q| q.quote_volume)
            .filter(|v| !v.is_nan())
            .unwrap_or(0.0)
    };
    let mut ranked: Vec<&String> = pairs.iter().collect();
    ranked.sort_by(|a, b| volume(*b).total_cmp(&volume(*a)));
    ranked.into_iter().take(n).cloned().collect()
}

pub struct SnapshotLoader {
    venue: Arc<dyn MarketVenue>,
    config: SimConfig,
}

impl SnapshotLoader {
    pub fn new(venue: Arc<dyn MarketVenue>, config: SimConfig) -> Self {
        Self { venue, config }
    }

    /// Load the candidate set ending at `now_ms`.
    ///
    /// Only the initial pair listing and ticker fetch are fatal; a pair whose
    /// bar history cannot be fetched is dropped from the candidates.
    pub async fn load(&self, now_ms: i64) -> Result<MarketSnapshot> {
        let cfg = &self.config;
        let pause = self.venue.min_request_interval();

        let symbols = self
            .venue
            .list_pairs(&cfg.quote_asset)
            .await
            .with_context(|| format!("Failed to list {} pairs", cfg.quote_asset))?;
        info!("Total {} symbols: {}", cfg.quote_asset, symbols.len());

        let quotes = self
            .venue
            .fetch_quotes()
            .await
            .context("Failed to fetch ticker snapshot")?;

        let top = rank_by_volume(&symbols, &quotes, cfg.top_n);
        info!("Top symbols by volume: {:?}", top);

        let start = now_ms - cfg.window_ms();
        let mut pairs = Vec::with_capacity(top.len());
        for symbol in &top {
            match self.venue.fetch_bars(symbol, cfg.resolution, start, now_ms).await {
                Ok(bars) if !bars.is_empty() => {
                    info!(symbol = %symbol, bars = bars.len(), "loaded {} history", cfg.resolution);
                    pairs.push(PairSeries::new(symbol.clone(), bars));
                    sleep(pause).await;
                }
                Ok(_) => warn!(symbol = %symbol, "no bars returned, excluding pair"),
                Err(e) => warn!(symbol = %symbol, error = %e, "fetch error, excluding pair"),
            }
        }

        if pairs.is_empty() {
            bail!("no candidate pairs loaded");
        }

        let daily_start = now_ms - (cfg.retrace_window_days as i64 + DAILY_PADDING_DAYS) * DAY_MS;
        let mut daily = HashMap::with_capacity(pairs.len());
        for series in &pairs {
            let fetched = Fetched::from_result(
                self.venue
                    .fetch_bars(&series.symbol, Resolution::Day1, daily_start, now_ms)
                    .await,
            );
            if let Fetched::Unavailable(reason) = &fetched {
                warn!(symbol = %series.symbol, %reason, "daily history unavailable, retracement undefined");
            }
            daily.insert(series.symbol.clone(), fetched);
            sleep(pause).await;
        }

        let with_daily = daily.values().filter(|d| d.is_ready()).count();
        info!("Daily history available for {}/{} pairs", with_daily, pairs.len());

        Ok(MarketSnapshot { pairs, daily, quotes })
    }
}
