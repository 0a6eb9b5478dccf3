//! Crypto futures momentum screener.
//!
//! Lists the exchange's futures pairs, pulls a bounded window of recent
//! candles per pair, derives RSI and close-to-close percent change, and flags
//! overbought, oversold and fast-moving candles against operator thresholds.

pub mod analysis;
pub mod candles;
pub mod comfy_table;
pub mod error;
pub mod exchange;
pub mod filter_utils;
pub mod find_tickers;
pub mod indicators;
pub mod klines;
pub mod screener;
pub mod storage_utils;
pub mod tui;

pub use analysis::{FailedSymbol, ScanReport, SymbolResult, run_scan, run_scan_with};
pub use candles::{Candle, CandleTable, Interval, Symbol};
pub use error::{Result, ScreenerError};
pub use exchange::{Category, Exchange};
pub use screener::{ScreenedRow, Screener, ScreenerSettings, ScreeningResult, Thresholds, screen};
pub use storage_utils::AppConfig;
