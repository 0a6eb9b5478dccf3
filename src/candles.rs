//! Candle model shared by the fetcher and the screener.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Symbol = String;

/// Epoch values at or above this are treated as milliseconds, below it as seconds.
/// 10^11 seconds is the year 5138, 10^11 milliseconds is March 1973.
const MILLIS_CUTOFF: i64 = 100_000_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: Option<f64>,
}

impl ta::Close for Candle {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ta::Volume for Candle {
    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Kline granularities accepted by the exchange.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    #[serde(rename = "1")]
    OneMinute,
    #[serde(rename = "3")]
    ThreeMinutes,
    #[serde(rename = "5")]
    FiveMinutes,
    #[serde(rename = "15")]
    FifteenMinutes,
    #[serde(rename = "30")]
    ThirtyMinutes,
    #[serde(rename = "60")]
    OneHour,
    #[serde(rename = "120")]
    TwoHours,
    #[serde(rename = "240")]
    FourHours,
    #[serde(rename = "360")]
    SixHours,
    #[serde(rename = "720")]
    TwelveHours,
    #[serde(rename = "D")]
    Day,
    #[serde(rename = "W")]
    Week,
    #[serde(rename = "M")]
    Month,
}

impl Interval {
    /// Wire form used in the `interval` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1",
            Interval::ThreeMinutes => "3",
            Interval::FiveMinutes => "5",
            Interval::FifteenMinutes => "15",
            Interval::ThirtyMinutes => "30",
            Interval::OneHour => "60",
            Interval::TwoHours => "120",
            Interval::FourHours => "240",
            Interval::SixHours => "360",
            Interval::TwelveHours => "720",
            Interval::Day => "D",
            Interval::Week => "W",
            Interval::Month => "M",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candles for one symbol and interval, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleTable {
    pub symbol: Symbol,
    pub interval: Interval,
    pub candles: Vec<Candle>,
}

impl CandleTable {
    /// Builds a table from candles in any order. The sort is stable, so
    /// duplicate timestamps keep their relative wire order.
    pub fn new(symbol: impl Into<Symbol>, interval: Interval, mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        Self {
            symbol: symbol.into(),
            interval,
            candles,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.candles.iter().map(|c| c.close)
    }
}

/// Converts an integer epoch in seconds or milliseconds to UTC.
pub fn timestamp_from_epoch(raw: i64) -> Option<DateTime<Utc>> {
    if raw.unsigned_abs() >= MILLIS_CUTOFF.unsigned_abs() {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}
