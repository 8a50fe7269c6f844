// Bybit spot market-data client (public v5 REST, no authentication)

use crate::config::Resolution;
use crate::models::{BybitResponse, Instrument, KlineResult, KlineRow, ListResult, Ticker};
use crate::types::{PriceBar, Quote};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

/// Maximum rows the kline endpoint returns per request
const KLINE_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: StatusCode },

    #[error("venue rejected request (retCode {code}): {msg}")]
    Api { code: i64, msg: String },

    #[error("unexpected payload: {0}")]
    Payload(String),
}

/// Price-history source consumed by the snapshot loader
#[async_trait]
pub trait MarketVenue: Send + Sync {
    /// Symbols of trading spot pairs quoted in `quote_asset`, in listing order
    async fn list_pairs(&self, quote_asset: &str) -> Result<Vec<String>, VenueError>;

    /// Current ticker snapshot keyed by symbol
    async fn fetch_quotes(&self) -> Result<HashMap<String, Quote>, VenueError>;

    /// Bars opening in `[start_ms, end_ms]`, ascending
    async fn fetch_bars(
        &self,
        symbol: &str,
        resolution: Resolution,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<PriceBar>, VenueError>;

    /// Minimum pause between consecutive requests
    fn min_request_interval(&self) -> Duration;
}

pub struct BybitApi {
    client: Client,
    base_url: String,
    rate_limit: Duration,
}

impl BybitApi {
    pub fn new(base_url: impl Into<String>, rate_limit: Duration) -> Result<Self, VenueError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limit,
        })
    }

    /// GET a v5 endpoint and unwrap the `result` envelope
    async fn get_result<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, VenueError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VenueError::Status {
                endpoint: path.to_string(),
                status,
            });
        }

        let body: BybitResponse<T> = response.json().await?;
        if body.ret_code != 0 {
            return Err(VenueError::Api {
                code: body.ret_code,
                msg: body.ret_msg,
            });
        }
        body.result
            .ok_or_else(|| VenueError::Payload(format!("{} returned no result", path)))
    }
}

#[async_trait]
impl MarketVenue for BybitApi {
    async fn list_pairs(&self, quote_asset: &str) -> Result<Vec<String>, VenueError> {
        let mut instruments: Vec<Instrument> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("category", "spot".to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }
            let page: ListResult<Instrument> = self.get_result("/v5/market/instruments-info", &query).await?;
            instruments.extend(page.list);

            match page.next_page_cursor {
                Some(next) if !next.is_empty() && Some(&next) != cursor.as_ref() => {
                    cursor = Some(next);
                    sleep(self.rate_limit).await;
                }
                _ => break,
            }
        }

        Ok(filter_pairs(&instruments, quote_asset))
    }

    async fn fetch_quotes(&self) -> Result<HashMap<String, Quote>, VenueError> {
        let query = [("category", "spot".to_string())];
        let tickers: ListResult<Ticker> = self.get_result("/v5/market/tickers", &query).await?;

        Ok(tickers
            .list
            .iter()
            .map(|t| (t.symbol.clone(), ticker_to_quote(t)))
            .collect())
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        resolution: Resolution,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<PriceBar>, VenueError> {
        let mut pages: Vec<Vec<PriceBar>> = Vec::new();
        let mut page_end = end_ms;

        // Pages come back newest first; walk backwards until the window start.
        loop {
            let query = [
                ("category", "spot".to_string()),
                ("symbol", symbol.to_string()),
                ("interval", resolution.bybit_interval().to_string()),
                ("start", start_ms.to_string()),
                ("end", page_end.to_string()),
                ("limit", KLINE_PAGE_LIMIT.to_string()),
            ];
            let page: KlineResult = self.get_result("/v5/market/kline", &query).await?;
            let parsed = page
                .list
                .iter()
                .map(parse_kline_row)
                .collect::<Result<Vec<_>, _>>()?;
            let rows = parsed.len();
            let oldest = parsed.iter().map(|b| b.timestamp).min().unwrap_or(start_ms);
            pages.push(parsed);

            debug!(symbol, rows, oldest, "fetched kline page");
            match next_page_end(rows, oldest, start_ms) {
                Some(end) => {
                    page_end = end;
                    sleep(self.rate_limit).await;
                }
                None => break,
            }
        }

        Ok(merge_pages(pages, start_ms, end_ms))
    }

    fn min_request_interval(&self) -> Duration {
        self.rate_limit
    }
}

/// End of the next (older) kline page, or None once the window start is
/// covered. A short page means the venue has nothing older.
pub fn next_page_end(rows: usize, oldest: i64, start_ms: i64) -> Option<i64> {
    if rows < KLINE_PAGE_LIMIT || oldest <= start_ms {
        None
    } else {
        Some(oldest - 1)
    }
}

/// Flatten fetched pages into ascending bars inside `[start_ms, end_ms]`,
/// one per timestamp.
pub fn merge_pages(pages: Vec<Vec<PriceBar>>, start_ms: i64, end_ms: i64) -> Vec<PriceBar> {
    let mut bars: Vec<PriceBar> = pages
        .into_iter()
        .flatten()
        .filter(|b| b.timestamp >= start_ms && b.timestamp <= end_ms)
        .collect();
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    bars
}

/// Trading instruments quoted in `quote_asset`
pub fn filter_pairs(instruments: &[Instrument], quote_asset: &str) -> Vec<String> {
    instruments
        .iter()
        .filter(|i| i.is_trading() && i.quote_coin.eq_ignore_ascii_case(quote_asset))
        .map(|i| i.symbol.clone())
        .collect()
}

fn parse_price(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn ticker_to_quote(t: &Ticker) -> Quote {
    Quote {
        symbol: t.symbol.clone(),
        bid: parse_price(&t.bid1_price),
        ask: parse_price(&t.ask1_price),
        quote_volume: parse_price(&t.turnover_24h),
    }
}

pub fn parse_kline_row(row: &KlineRow) -> Result<PriceBar, VenueError> {
    if row.len() < 6 {
        return Err(VenueError::Payload(format!("kline row has {} fields, expected at least 6", row.len())));
    }
    let num = |i: usize| -> Result<f64, VenueError> {
        row[i]
            .parse::<f64>()
            .map_err(|e| VenueError::Payload(format!("bad kline field {} '{}': {}", i, row[i], e)))
    };
    let timestamp = row[0]
        .parse::<i64>()
        .map_err(|e| VenueError::Payload(format!("bad kline start time '{}': {}", row[0], e)))?;

    Ok(PriceBar {
        timestamp,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume: num(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> KlineRow {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_kline_rows() {
        let bar = parse_kline_row(&row(&["1700000000000", "1.5", "2", "1", "1.75", "1234.5", "999"])).unwrap();
        assert_eq!(bar.timestamp, 1_700_000_000_000);
        assert_eq!(bar.open, 1.5);
        assert_eq!(bar.high, 2.0);
        assert_eq!(bar.low, 1.0);
        assert_eq!(bar.close, 1.75);
        assert_eq!(bar.volume, 1234.5);
    }

    #[test]
    fn rejects_malformed_kline_rows() {
        assert!(matches!(parse_kline_row(&row(&["1", "2"])), Err(VenueError::Payload(_))));
        assert!(parse_kline_row(&row(&["x", "1", "1", "1", "1", "1"])).is_err());
        assert!(parse_kline_row(&row(&["1", "1", "abc", "1", "1", "1"])).is_err());
    }

    #[test]
    fn ticker_blank_fields_are_missing() {
        let t = Ticker {
            symbol: "BTCUSDT".to_string(),
            bid1_price: "64000.1".to_string(),
            ask1_price: String::new(),
            last_price: "64000".to_string(),
            turnover_24h: "123456789.5".to_string(),
        };
        let q = ticker_to_quote(&t);
        assert_eq!(q.bid, Some(64000.1));
        assert_eq!(q.ask, None);
        assert_eq!(q.quote_volume, Some(123456789.5));
    }

    #[test]
    fn filters_by_quote_and_status() {
        let inst = |symbol: &str, quote: &str, status: &str| Instrument {
            symbol: symbol.to_string(),
            base_coin: symbol.trim_end_matches(quote).to_string(),
            quote_coin: quote.to_string(),
            status: status.to_string(),
        };
        let instruments = vec![
            inst("BTCUSDT", "USDT", "Trading"),
            inst("ETHBTC", "BTC", "Trading"),
            inst("OLDUSDT", "USDT", "Closed"),
            inst("SOLUSDT", "USDT", "Trading"),
        ];
        assert_eq!(filter_pairs(&instruments, "usdt"), vec!["BTCUSDT", "SOLUSDT"]);
    }

    #[test]
    fn full_page_continues_below_oldest_bar() {
        assert_eq!(next_page_end(KLINE_PAGE_LIMIT, 5_000, 1_000), Some(4_999));
    }

    #[test]
    fn short_or_covering_page_stops_the_walk() {
        assert_eq!(next_page_end(KLINE_PAGE_LIMIT - 1, 5_000, 1_000), None);
        assert_eq!(next_page_end(0, 1_000, 1_000), None);
        assert_eq!(next_page_end(KLINE_PAGE_LIMIT, 1_000, 1_000), None);
        assert_eq!(next_page_end(KLINE_PAGE_LIMIT, 500, 1_000), None);
    }

    #[test]
    fn overlapping_pages_merge_ascending_without_duplicates() {
        let bar = |ts: i64| PriceBar {
            timestamp: ts,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        };
        // newest page first, each page newest-first, one shared bar at 300
        let pages = vec![
            vec![bar(500), bar(400), bar(300)],
            vec![bar(300), bar(200), bar(100), bar(0)],
        ];
        let merged = merge_pages(pages, 100, 400);
        let ts: Vec<i64> = merged.iter().map(|b| b.timestamp).collect();
        assert_eq!(ts, vec![100, 200, 300, 400]);
    }

    #[test]
    fn envelope_deserializes() {
        let json = r#"{"retCode":0,"retMsg":"OK","result":{"category":"spot","symbol":"BTCUSDT",
            "list":[["1700000900000","2","3","1","2.5","10","25"],["1700000000000","1","2","1","2","5","10"]]}}"#;
        let body: BybitResponse<KlineResult> = serde_json::from_str(json).unwrap();
        assert_eq!(body.ret_code, 0);
        let list = body.result.unwrap().list;
        assert_eq!(list.len(), 2);
        assert_eq!(parse_kline_row(&list[1]).unwrap().timestamp, 1_700_000_000_000);
    }
}
