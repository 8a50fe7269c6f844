// Wick rotation backtester library
// Snapshot loading, pair scoring, timeline replay and reporting

pub mod types;
pub mod config;
pub mod models;
pub mod api;
pub mod indicators;
pub mod snapshot;
pub mod strategies;
pub mod simulation;
pub mod report;

// Re-export commonly used types
pub use types::*;
pub use config::{CliConfig, Resolution, SimConfig};
pub use api::{BybitApi, MarketVenue, VenueError};
pub use snapshot::{Fetched, MarketSnapshot, SnapshotLoader};
pub use strategies::{build_score_table, RotationStrategy, Strategy};
pub use simulation::{SimulationOutcome, Simulator};
pub use report::{summarize, Summary};

// Global run-history logger
use std::fs::File;
use std::io::Write;
use std::sync::{Mutex, OnceLock};

static HISTORY_FILE: OnceLock<Mutex<File>> = OnceLock::new();

/// Initialize the global history file writer (called by main.rs)
pub fn init_history_file(file: File) {
    // Ignore error if already initialized; this crate only has one main
    let _ = HISTORY_FILE.set(Mutex::new(file));
}

/// Append a message to the history file. No-op until initialized.
pub fn log_to_history(message: &str) {
    if let Some(file_mutex) = HISTORY_FILE.get() {
        if let Ok(mut file) = file_mutex.lock() {
            let _ = write!(file, "{}", message);
            let _ = file.flush();
        }
    }
}

/// Log a structured simulation event to the history file with timestamp
pub fn log_trading_event(event: &str) {
    use chrono::Utc;
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    log_to_history(&format!("[{}] {}\n", timestamp, event));
}
