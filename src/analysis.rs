//! This module contains the scan pipeline: list pairs, fetch candles, screen.

use crate::candles::Symbol;
use crate::error::{Result, ScreenerError};
use crate::exchange::Exchange;
use crate::filter_utils::SymbolFilter;
use crate::find_tickers::{self, Instrument};
use crate::klines;
use crate::screener::{ScreenedRow, Screener, ScreeningResult, Thresholds};
use crate::storage_utils::{AppConfig, KlineConfig};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolResult {
    pub symbol: Symbol,
    pub candles: usize,
    /// Most recent candle with its indicators, for at-a-glance display.
    pub latest: Option<ScreenedRow>,
    pub screening: ScreeningResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedSymbol {
    pub symbol: Symbol,
    pub kind: &'static str,
    pub message: String,
}

impl FailedSymbol {
    fn new(symbol: Symbol, err: &ScreenerError) -> Self {
        Self {
            symbol,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub scanned_at: DateTime<Utc>,
    pub thresholds: Thresholds,
    /// Instruments the exchange listed before filtering.
    pub total_listed: usize,
    pub results: Vec<SymbolResult>,
    pub failures: Vec<FailedSymbol>,
}

impl ScanReport {
    pub fn scanned(&self) -> usize {
        self.results.len() + self.failures.len()
    }
}

/// Applies the filter and keeps the first `max_symbols` survivors, in listing order.
pub fn select_symbols(instruments: Vec<Instrument>, filter: &SymbolFilter, max_symbols: usize) -> Vec<Symbol> {
    instruments
        .into_iter()
        .filter(|i| filter.matches(i))
        .take(max_symbols)
        .map(|i| i.symbol)
        .collect()
}

async fn scan_symbol(
    exchange: &Exchange,
    symbol: &str,
    klines: &KlineConfig,
    screener: &Screener,
    thresholds: &Thresholds,
) -> Result<SymbolResult> {
    let table = klines::fetch_klines(exchange, symbol, klines.interval, klines.limit).await?;
    let rows = screener.derive(&table);
    let screening = screener.partition(&rows, thresholds);

    Ok(SymbolResult {
        symbol: symbol.to_string(),
        candles: table.len(),
        latest: rows.last().cloned(),
        screening,
    })
}

/// Fetches and screens each symbol. One symbol failing never stops the others;
/// failures are returned next to the results, both in input order.
pub async fn scan_symbols(
    exchange: &Exchange,
    symbols: Vec<Symbol>,
    klines: &KlineConfig,
    screener: &Screener,
    thresholds: &Thresholds,
    concurrency: usize,
) -> (Vec<SymbolResult>, Vec<FailedSymbol>) {
    let outcomes: Vec<(Symbol, Result<SymbolResult>)> = stream::iter(symbols)
        .map(|symbol| async move {
            info!(%symbol, "Processing");
            let outcome = scan_symbol(exchange, &symbol, klines, screener, thresholds).await;
            (symbol, outcome)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (symbol, outcome) in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!(%symbol, kind = e.kind(), "Error fetching data: {}", e);
                failures.push(FailedSymbol::new(symbol, &e));
            }
        }
    }
    (results, failures)
}

/// Runs the full scan against the configured exchange:
/// 1. Lists the tradable instruments of the configured category.
/// 2. Narrows them with the configured filters and `max_symbols_per_scan`.
/// 3. Fetches and screens each remaining symbol.
///
/// Only a failure to list instruments fails the scan as a whole.
pub async fn run_scan(config: &AppConfig, thresholds: Thresholds) -> Result<ScanReport> {
    let exchange = Exchange::new(
        &config.exchange.base_url,
        config.exchange.category,
        config.exchange.timeout(),
    )?;
    run_scan_with(&exchange, config, thresholds).await
}

/// Same as [`run_scan`] with an already built exchange client.
pub async fn run_scan_with(exchange: &Exchange, config: &AppConfig, thresholds: Thresholds) -> Result<ScanReport> {
    thresholds.validate()?;
    let screener = Screener::new(config.screener)?;
    let filter = SymbolFilter::new(config.scan.filters.clone(), config.scan.symbol_pattern.as_deref())?;

    let instruments = find_tickers::list_instruments(exchange).await?;
    let total_listed = instruments.len();
    let symbols = select_symbols(instruments, &filter, config.scan.max_symbols_per_scan);
    info!(total_listed, selected = symbols.len(), "Processing pairs");

    let (results, failures) = scan_symbols(
        exchange,
        symbols,
        &config.klines,
        &screener,
        &thresholds,
        config.scan.concurrency,
    )
    .await;

    info!(
        screened = results.len(),
        failed = failures.len(),
        "Scan finished"
    );

    Ok(ScanReport {
        scanned_at: Utc::now(),
        thresholds,
        total_listed,
        results,
        failures,
    })
}
