//! Threshold screening over a candle table.

use crate::candles::{Candle, CandleTable};
use crate::error::{Result, ScreenerError};
use crate::indicators::{DEFAULT_RSI_PERIOD, PercentChange, WilderRsi};
use serde::{Deserialize, Serialize};
use ta::{Next, Volume};

pub const DEFAULT_VOLUME_THRESHOLD: f64 = 1_000_000.0;
pub const DEFAULT_PRICE_CHANGE_THRESHOLD: f64 = 1.0;

/// Operator-supplied limits. Both are compared strictly (`>`).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    pub volume_threshold: f64,
    /// Compared against the absolute percent change.
    pub price_change_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            volume_threshold: DEFAULT_VOLUME_THRESHOLD,
            price_change_threshold: DEFAULT_PRICE_CHANGE_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn new(volume_threshold: f64, price_change_threshold: f64) -> Result<Self> {
        let thresholds = Self {
            volume_threshold,
            price_change_threshold,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("volume threshold", self.volume_threshold),
            ("price change threshold", self.price_change_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ScreenerError::InvalidParameter(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ScreenerSettings {
    pub rsi_period: usize,
    pub overbought_level: f64,
    pub oversold_level: f64,
}

impl Default for ScreenerSettings {
    fn default() -> Self {
        Self {
            rsi_period: DEFAULT_RSI_PERIOD,
            overbought_level: 70.0,
            oversold_level: 30.0,
        }
    }
}

/// A candle with its derived columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenedRow {
    pub candle: Candle,
    pub rsi: Option<f64>,
    pub percent_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScreeningResult {
    pub overbought: Vec<ScreenedRow>,
    pub oversold: Vec<ScreenedRow>,
    pub significant_change: Vec<ScreenedRow>,
}

impl ScreeningResult {
    pub fn is_empty(&self) -> bool {
        self.overbought.is_empty() && self.oversold.is_empty() && self.significant_change.is_empty()
    }

    pub fn hit_count(&self) -> usize {
        self.overbought.len() + self.oversold.len() + self.significant_change.len()
    }
}

#[derive(Debug, Clone)]
pub struct Screener {
    settings: ScreenerSettings,
    rsi: WilderRsi,
}

impl Default for Screener {
    fn default() -> Self {
        Self {
            settings: ScreenerSettings::default(),
            rsi: WilderRsi::default(),
        }
    }
}

impl Screener {
    pub fn new(settings: ScreenerSettings) -> Result<Self> {
        if settings.oversold_level > settings.overbought_level {
            return Err(ScreenerError::InvalidParameter(format!(
                "oversold level {} is above overbought level {}",
                settings.oversold_level, settings.overbought_level
            )));
        }
        let rsi = WilderRsi::new(settings.rsi_period).map_err(|e| {
            ScreenerError::InvalidParameter(format!("rsi period {}: {e:?}", settings.rsi_period))
        })?;
        Ok(Self { settings, rsi })
    }

    pub fn settings(&self) -> &ScreenerSettings {
        &self.settings
    }

    /// Attaches RSI and percent change to every candle, oldest first.
    pub fn derive(&self, table: &CandleTable) -> Vec<ScreenedRow> {
        let mut rsi = self.rsi.clone();
        let mut change = PercentChange::new();

        table
            .candles
            .iter()
            .map(|candle| ScreenedRow {
                rsi: rsi.next(candle),
                percent_change: change.next(candle),
                candle: candle.clone(),
            })
            .collect()
    }

    /// Splits derived rows into the three subsets. A row may land in more than one.
    pub fn partition(&self, rows: &[ScreenedRow], thresholds: &Thresholds) -> ScreeningResult {
        let mut result = ScreeningResult::default();

        for row in rows {
            let high_volume = row.candle.volume() > thresholds.volume_threshold;

            if let Some(rsi) = row.rsi.filter(|_| high_volume) {
                if rsi > self.settings.overbought_level {
                    result.overbought.push(row.clone());
                } else if rsi < self.settings.oversold_level {
                    result.oversold.push(row.clone());
                }
            }

            // No volume condition here.
            if row
                .percent_change
                .is_some_and(|pct| pct.abs() > thresholds.price_change_threshold)
            {
                result.significant_change.push(row.clone());
            }
        }

        result
    }

    pub fn screen(&self, table: &CandleTable, thresholds: &Thresholds) -> ScreeningResult {
        let rows = self.derive(table);
        self.partition(&rows, thresholds)
    }
}

/// Screens with the textbook settings (RSI-14, 70/30).
pub fn screen(table: &CandleTable, thresholds: &Thresholds) -> ScreeningResult {
    Screener::default().screen(table, thresholds)
}
