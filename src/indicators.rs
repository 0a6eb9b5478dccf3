//! Streaming indicators used by the screener.
//!
//! Both indicators follow the `ta` crate conventions: they are fed one value at a
//! time through [`Next`] and can be reused after a [`Reset`]. Unlike the `ta`
//! indicators they yield `None` until enough observations have been seen, so
//! the warm-up rows are never mistaken for real readings.

use ta::errors::{Result as TaResult, TaError};
use ta::{Close, Next, Reset};

pub const DEFAULT_RSI_PERIOD: usize = 14;

/// Relative Strength Index with Wilder smoothing.
///
/// The first reading is produced once `period` close-to-close changes have
/// been observed (the `period + 1`-th close) and is seeded with the simple
/// mean of those changes. Later readings use
/// `avg = (avg * (period - 1) + current) / period`.
#[derive(Debug, Clone)]
pub struct WilderRsi {
    period: usize,
    prev_close: Option<f64>,
    changes_seen: usize,
    gain_sum: f64,
    loss_sum: f64,
    avg_gain: f64,
    avg_loss: f64,
}

impl WilderRsi {
    pub fn new(period: usize) -> TaResult<Self> {
        if period == 0 {
            return Err(TaError::InvalidParameter);
        }
        Ok(Self {
            period,
            prev_close: None,
            changes_seen: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Default for WilderRsi {
    fn default() -> Self {
        Self {
            period: DEFAULT_RSI_PERIOD,
            prev_close: None,
            changes_seen: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // Flat series sits in the middle of the band.
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

impl Next<f64> for WilderRsi {
    type Output = Option<f64>;

    fn next(&mut self, close: f64) -> Self::Output {
        let prev = self.prev_close.replace(close)?;

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        self.changes_seen += 1;

        let period = self.period as f64;
        if self.changes_seen < self.period {
            self.gain_sum += gain;
            self.loss_sum += loss;
            return None;
        }

        if self.changes_seen == self.period {
            self.avg_gain = (self.gain_sum + gain) / period;
            self.avg_loss = (self.loss_sum + loss) / period;
        } else {
            self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        }

        Some(rsi_from_averages(self.avg_gain, self.avg_loss))
    }
}

impl<T: Close> Next<&T> for WilderRsi {
    type Output = Option<f64>;

    fn next(&mut self, input: &T) -> Self::Output {
        self.next(input.close())
    }
}

impl Reset for WilderRsi {
    fn reset(&mut self) {
        self.prev_close = None;
        self.changes_seen = 0;
        self.gain_sum = 0.0;
        self.loss_sum = 0.0;
        self.avg_gain = 0.0;
        self.avg_loss = 0.0;
    }
}

/// Close-to-close change in percent: `(close - prev) / prev * 100`.
///
/// Yields `None` for the first close and when the previous close is zero.
#[derive(Debug, Clone, Default)]
pub struct PercentChange {
    prev_close: Option<f64>,
}

impl PercentChange {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Next<f64> for PercentChange {
    type Output = Option<f64>;

    fn next(&mut self, close: f64) -> Self::Output {
        let prev = self.prev_close.replace(close)?;
        if prev == 0.0 {
            return None;
        }
        Some((close - prev) / prev * 100.0)
    }
}

impl<T: Close> Next<&T> for PercentChange {
    type Output = Option<f64>;

    fn next(&mut self, input: &T) -> Self::Output {
        self.next(input.close())
    }
}

impl Reset for PercentChange {
    fn reset(&mut self) {
        self.prev_close = None;
    }
}

/// RSI for every close, `None` during warm-up.
pub fn rsi_series<I>(closes: I, period: usize) -> TaResult<Vec<Option<f64>>>
where
    I: IntoIterator<Item = f64>,
{
    let mut rsi = WilderRsi::new(period)?;
    Ok(closes.into_iter().map(|close| rsi.next(close)).collect())
}

pub fn percent_change_series<I>(closes: I) -> Vec<Option<f64>>
where
    I: IntoIterator<Item = f64>,
{
    let mut change = PercentChange::new();
    closes.into_iter().map(|close| change.next(close)).collect()
}
