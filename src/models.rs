// Bybit v5 REST response models

use serde::{Deserialize, Serialize};

/// Common v5 envelope: `{"retCode":0,"retMsg":"OK","result":{...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct BybitResponse<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg")]
    pub ret_msg: String,
    pub result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListResult<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
    #[serde(rename = "nextPageCursor")]
    pub next_page_cursor: Option<String>,
}

/// Spot instrument from `/v5/market/instruments-info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    #[serde(rename = "baseCoin")]
    pub base_coin: String,
    #[serde(rename = "quoteCoin")]
    pub quote_coin: String,
    pub status: String,
}

impl Instrument {
    pub fn is_trading(&self) -> bool {
        self.status == "Trading"
    }
}

/// Ticker from `/v5/market/tickers`. Numeric fields arrive as strings and
/// may be empty for illiquid pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    #[serde(rename = "bid1Price", default)]
    pub bid1_price: String,
    #[serde(rename = "ask1Price", default)]
    pub ask1_price: String,
    #[serde(rename = "lastPrice", default)]
    pub last_price: String,
    /// 24h turnover in the quote asset
    #[serde(rename = "turnover24h", default)]
    pub turnover_24h: String,
}

/// Kline row: `[startTime, open, high, low, close, volume, turnover]`, all strings
pub type KlineRow = Vec<String>;

#[derive(Debug, Clone, Deserialize)]
pub struct KlineResult {
    pub symbol: Option<String>,
    pub category: Option<String>,
    #[serde(default = "Vec::new")]
    pub list: Vec<KlineRow>,
}
