// Run configuration: simulation parameters, bar resolution, CLI and config.json

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.bybit.com";

/// Upper bound for the reselection interval (one year)
pub const MAX_RECALC_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Bar resolution supported by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Hour4,
    Day1,
    Week1,
}

impl Resolution {
    /// Bar duration in milliseconds
    pub fn millis(&self) -> i64 {
        let minutes: i64 = match self {
            Resolution::Minute1 => 1,
            Resolution::Minute5 => 5,
            Resolution::Minute15 => 15,
            Resolution::Minute30 => 30,
            Resolution::Hour1 => 60,
            Resolution::Hour4 => 4 * 60,
            Resolution::Day1 => 24 * 60,
            Resolution::Week1 => 7 * 24 * 60,
        };
        minutes * 60 * 1000
    }

    /// Number of bars covering one day, or None when a bar spans more than a day
    pub fn bars_per_day(&self) -> Option<usize> {
        let per_day = (24 * 60 * 60 * 1000) / self.millis();
        (per_day >= 1).then_some(per_day as usize)
    }

    /// Interval code used by the Bybit kline endpoint
    pub fn bybit_interval(&self) -> &'static str {
        match self {
            Resolution::Minute1 => "1",
            Resolution::Minute5 => "5",
            Resolution::Minute15 => "15",
            Resolution::Minute30 => "30",
            Resolution::Hour1 => "60",
            Resolution::Hour4 => "240",
            Resolution::Day1 => "D",
            Resolution::Week1 => "W",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resolution::Minute1 => "1m",
            Resolution::Minute5 => "5m",
            Resolution::Minute15 => "15m",
            Resolution::Minute30 => "30m",
            Resolution::Hour1 => "1h",
            Resolution::Hour4 => "4h",
            Resolution::Day1 => "1d",
            Resolution::Week1 => "1w",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let res = match s.trim().to_lowercase().as_str() {
            "1m" => Resolution::Minute1,
            "5m" => Resolution::Minute5,
            "15m" => Resolution::Minute15,
            "30m" => Resolution::Minute30,
            "1h" | "60m" => Resolution::Hour1,
            "4h" => Resolution::Hour4,
            "1d" | "d" => Resolution::Day1,
            "1w" | "w" => Resolution::Week1,
            other => bail!("Unsupported resolution '{}'. Use 1m, 5m, 15m, 30m, 1h, 4h, 1d or 1w", other),
        };
        Ok(res)
    }
}

/// Fixed parameters of one backtest run
#[derive(Debug, Clone, Serialize)]
pub struct SimConfig {
    #[serde(serialize_with = "serialize_decimal")]
    pub start_capital: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub per_trade_notional: Decimal,
    /// Size of the enabled set
    pub max_pairs: usize,
    #[serde(serialize_with = "serialize_decimal")]
    pub fee_rate: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub slippage: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub gain_target: Decimal,
    /// Negative fraction, e.g. -0.05
    #[serde(serialize_with = "serialize_decimal")]
    pub stop_loss: Decimal,
    /// Replay window length in days
    pub days: u32,
    pub resolution: Resolution,
    /// Candidate pool size (pairs ranked by volume)
    pub top_n: usize,
    pub recalc_interval_secs: u64,
    /// Daily lookback for the pump/retracement signal
    pub retrace_window_days: usize,
    pub quote_asset: String,
    /// Politeness delay between venue requests
    pub rate_limit_ms: u64,
}

/// Helper function to serialize Decimal as f64
pub fn serialize_decimal<S>(decimal: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(decimal.to_f64().unwrap_or(0.0))
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_capital: dec!(1000.0),
            per_trade_notional: dec!(50.0),
            max_pairs: 8,
            fee_rate: dec!(0.001),
            slippage: dec!(0.002),
            gain_target: dec!(0.025),
            stop_loss: dec!(-0.05),
            days: 30,
            resolution: Resolution::Minute15,
            top_n: 5,
            recalc_interval_secs: 4 * 60 * 60,
            retrace_window_days: 35,
            quote_asset: "USDT".to_string(),
            rate_limit_ms: 100,
        }
    }
}

impl SimConfig {
    pub fn recalc_interval_ms(&self) -> i64 {
        (self.recalc_interval_secs.min(MAX_RECALC_INTERVAL_SECS) as i64).saturating_mul(1000)
    }

    pub fn window_ms(&self) -> i64 {
        self.days as i64 * 24 * 60 * 60 * 1000
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_capital <= Decimal::ZERO {
            bail!("start_capital must be positive (got {})", self.start_capital);
        }
        if self.per_trade_notional <= Decimal::ZERO {
            bail!("per_trade_notional must be positive (got {})", self.per_trade_notional);
        }
        if self.max_pairs == 0 {
            bail!("max_pairs must be at least 1");
        }
        if self.top_n == 0 {
            bail!("top_n must be at least 1");
        }
        if self.fee_rate < Decimal::ZERO || self.fee_rate >= Decimal::ONE {
            bail!("fee_rate must be in [0, 1) (got {})", self.fee_rate);
        }
        if self.slippage < Decimal::ZERO || self.slippage >= Decimal::ONE {
            bail!("slippage must be in [0, 1) (got {})", self.slippage);
        }
        if self.gain_target <= Decimal::ZERO {
            bail!("gain_target must be positive (got {})", self.gain_target);
        }
        if self.stop_loss >= Decimal::ZERO || self.stop_loss <= -Decimal::ONE {
            bail!("stop_loss must be in (-1, 0) (got {})", self.stop_loss);
        }
        if self.days == 0 {
            bail!("days must be at least 1");
        }
        if self.recalc_interval_secs > MAX_RECALC_INTERVAL_SECS {
            bail!(
                "recalc_interval_secs must be at most {} (got {})",
                MAX_RECALC_INTERVAL_SECS,
                self.recalc_interval_secs
            );
        }
        Ok(())
    }
}

/// CLI Configuration
#[derive(Parser, Debug)]
#[command(name = "wick-rotation-sim")]
#[command(about = "Backtest a wick rotation strategy against Bybit spot candles")]
pub struct CliConfig {
    /// Starting capital in the quote asset
    #[arg(long)]
    pub start_capital: Option<f64>,

    /// Cash committed per BUY
    #[arg(long)]
    pub per_trade: Option<f64>,

    /// Number of top-scored pairs enabled for entries
    #[arg(long)]
    pub max_pairs: Option<usize>,

    /// Taker fee rate (e.g. 0.001 for 0.1%)
    #[arg(long)]
    pub fee_rate: Option<f64>,

    /// Slippage fraction (e.g. 0.002 for 0.2%)
    #[arg(long)]
    pub slippage: Option<f64>,

    /// Take-profit fraction (e.g. 0.025)
    #[arg(long)]
    pub gain_target: Option<f64>,

    /// Stop-loss fraction, negative (e.g. -0.05)
    #[arg(long, allow_hyphen_values = true)]
    pub stop_loss: Option<f64>,

    /// Replay window in days
    #[arg(long)]
    pub days: Option<u32>,

    /// Bar resolution (1m, 5m, 15m, 30m, 1h, 4h, 1d, 1w)
    #[arg(long)]
    pub resolution: Option<String>,

    /// Candidate pool size
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Quote asset filter
    #[arg(long)]
    pub quote_asset: Option<String>,

    /// Venue REST base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Trade ledger output (CSV)
    #[arg(long, default_value = "trade_log.csv")]
    pub trade_log: PathBuf,

    /// Run summary output (JSON)
    #[arg(long, default_value = "summary.json")]
    pub summary: PathBuf,

    /// Optional dump of the candidate score table (JSON)
    #[arg(long)]
    pub scores_out: Option<PathBuf>,

    /// Append-only event history file
    #[arg(long, default_value = "history.log")]
    pub history: PathBuf,

    /// Configuration file path (JSON format)
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,
}

/// JSON configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonConfig {
    pub venue: Option<VenueConfigJson>,
    pub simulation: Option<SimulationConfigJson>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VenueConfigJson {
    pub base_url: Option<String>,
    pub rate_limit_ms: Option<u64>,
    pub quote_asset: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationConfigJson {
    pub start_capital: Option<f64>,
    pub per_trade: Option<f64>,
    pub max_pairs: Option<usize>,
    pub fee_rate: Option<f64>,
    pub slippage: Option<f64>,
    pub gain_target: Option<f64>,
    pub stop_loss: Option<f64>,
    pub days: Option<u32>,
    pub resolution: Option<String>,
    pub top_n: Option<usize>,
    pub recalc_interval_secs: Option<u64>,
    pub retrace_window_days: Option<usize>,
}

fn to_decimal(name: &str, value: f64) -> Result<Decimal> {
    Decimal::try_from(value).with_context(|| format!("{} is not a finite number: {}", name, value))
}

impl CliConfig {
    /// Load configuration from JSON file. A missing file yields an empty config.
    pub fn load_json_config(&self) -> Result<JsonConfig> {
        let config_path = &self.config;

        if !config_path.exists() {
            return Ok(JsonConfig::default());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))
    }

    /// Get venue base URL from CLI arg or config file (with default fallback)
    pub fn get_base_url(&self, json_cfg: &JsonConfig) -> String {
        if self.base_url != DEFAULT_BASE_URL {
            return self.base_url.clone();
        }
        json_cfg
            .venue
            .as_ref()
            .and_then(|v| v.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Resolve the run configuration: CLI flag, then config.json, then default.
    pub fn get_sim_config(&self, json_cfg: &JsonConfig) -> Result<SimConfig> {
        let mut config = SimConfig::default();
        let sim = json_cfg.simulation.clone().unwrap_or_default();
        let venue = json_cfg.venue.clone().unwrap_or_default();

        if let Some(v) = self.start_capital.or(sim.start_capital) {
            config.start_capital = to_decimal("start_capital", v)?;
        }
        if let Some(v) = self.per_trade.or(sim.per_trade) {
            config.per_trade_notional = to_decimal("per_trade", v)?;
        }
        if let Some(v) = self.fee_rate.or(sim.fee_rate) {
            config.fee_rate = to_decimal("fee_rate", v)?;
        }
        if let Some(v) = self.slippage.or(sim.slippage) {
            config.slippage = to_decimal("slippage", v)?;
        }
        if let Some(v) = self.gain_target.or(sim.gain_target) {
            config.gain_target = to_decimal("gain_target", v)?;
        }
        if let Some(v) = self.stop_loss.or(sim.stop_loss) {
            config.stop_loss = to_decimal("stop_loss", v)?;
        }
        if let Some(v) = self.max_pairs.or(sim.max_pairs) {
            config.max_pairs = v;
        }
        if let Some(v) = self.days.or(sim.days) {
            config.days = v;
        }
        if let Some(v) = self.top_n.or(sim.top_n) {
            config.top_n = v;
        }
        if let Some(res) = self.resolution.as_ref().or(sim.resolution.as_ref()) {
            config.resolution = res.parse()?;
        }
        if let Some(v) = sim.recalc_interval_secs {
            config.recalc_interval_secs = v;
        }
        if let Some(v) = sim.retrace_window_days {
            config.retrace_window_days = v;
        }
        if let Some(q) = self.quote_asset.clone().or(venue.quote_asset) {
            config.quote_asset = q.to_uppercase();
        }
        if let Some(ms) = venue.rate_limit_ms {
            config.rate_limit_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}
