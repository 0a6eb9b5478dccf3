use crate::candles::{Candle, CandleTable, Interval, timestamp_from_epoch};
use crate::error::{Result, ScreenerError};
use crate::exchange::Exchange;
use serde::Deserialize;
use serde::Deserializer;
use serde::de::{self, Visitor};
use serde_json::Value;
use std::fmt;
use tracing::debug;

pub const DEFAULT_KLINE_LIMIT: u32 = 200;
pub const MAX_KLINE_LIMIT: u32 = 1000;

/// Wire order of a kline row. Turnover is optional.
const KLINE_KEYS: &[&str] = &["timestamp", "open", "high", "low", "close", "volume", "turnover"];
const REQUIRED_FIELDS: usize = 6;

#[derive(Deserialize, Debug)]
struct KlinePage {
    #[serde(default)]
    list: Vec<Vec<Value>>,
}

// --- Lenient number coercion ---

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.trim().is_empty() {
            Ok(None)
        } else {
            v.trim().parse::<f64>().map(Some).map_err(E::custom)
        }
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }
}

/// Number, numeric string, blank string or null. Blank and null mean absent.
pub fn lenient_f64(value: &Value) -> std::result::Result<Option<f64>, serde_json::Error> {
    value.deserialize_any(LenientF64Visitor)
}

/// Integer epoch sent either as a JSON number or as a decimal string.
fn lenient_epoch(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// --- Normalization ---

fn field_error(row: usize, key: &str, detail: impl fmt::Display) -> ScreenerError {
    ScreenerError::DataFormat(format!("kline row {row}: field `{key}` {detail}"))
}

fn candle_from_row(row_index: usize, row: &[Value]) -> Result<Candle> {
    if row.len() < REQUIRED_FIELDS {
        return Err(ScreenerError::DataFormat(format!(
            "kline row {row_index}: expected at least {REQUIRED_FIELDS} fields, got {}",
            row.len()
        )));
    }

    let timestamp = lenient_epoch(&row[0])
        .and_then(timestamp_from_epoch)
        .ok_or_else(|| field_error(row_index, KLINE_KEYS[0], format!("is not an epoch: {}", row[0])))?;

    let number = |field: usize| -> Result<f64> {
        lenient_f64(&row[field])
            .map_err(|e| field_error(row_index, KLINE_KEYS[field], e))?
            .ok_or_else(|| field_error(row_index, KLINE_KEYS[field], "is missing"))
    };

    let turnover = match row.get(6) {
        Some(value) => lenient_f64(value).map_err(|e| field_error(row_index, KLINE_KEYS[6], e))?,
        None => None,
    };

    Ok(Candle {
        timestamp,
        open: number(1)?,
        high: number(2)?,
        low: number(3)?,
        close: number(4)?,
        volume: number(5)?,
        turnover,
    })
}

/// Turns raw kline rows, in whatever order the exchange sent them, into an
/// ascending candle table.
pub fn table_from_rows(symbol: &str, interval: Interval, rows: &[Vec<Value>]) -> Result<CandleTable> {
    let candles = rows
        .iter()
        .enumerate()
        .map(|(i, row)| candle_from_row(i, row))
        .collect::<Result<Vec<_>>>()?;
    Ok(CandleTable::new(symbol, interval, candles))
}

/// Fetches the `limit` most recent candles for one symbol in a single request.
pub async fn fetch_klines(exchange: &Exchange, symbol: &str, interval: Interval, limit: u32) -> Result<CandleTable> {
    if !(1..=MAX_KLINE_LIMIT).contains(&limit) {
        return Err(ScreenerError::InvalidParameter(format!(
            "kline limit must be between 1 and {MAX_KLINE_LIMIT}, got {limit}"
        )));
    }

    let query = [
        ("symbol", symbol.to_string()),
        ("interval", interval.as_str().to_string()),
        ("limit", limit.to_string()),
    ];
    let page: KlinePage = exchange.get("kline", &query).await?;
    let table = table_from_rows(symbol, interval, &page.list)?;

    debug!(symbol, %interval, candles = table.len(), "Fetched klines");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_f64_accepts_mixed_encodings() {
        assert_eq!(lenient_f64(&json!("42.5")).unwrap(), Some(42.5));
        assert_eq!(lenient_f64(&json!(7)).unwrap(), Some(7.0));
        assert_eq!(lenient_f64(&json!(0.25)).unwrap(), Some(0.25));
        assert_eq!(lenient_f64(&json!("  ")).unwrap(), None);
        assert_eq!(lenient_f64(&Value::Null).unwrap(), None);
        assert!(lenient_f64(&json!("abc")).is_err());
        assert!(lenient_f64(&json!(true)).is_err());
    }

    #[test]
    fn newest_first_rows_come_back_oldest_first() {
        let rows = vec![
            vec![json!("1700000600000"), json!("3"), json!("3"), json!("3"), json!("3"), json!("30"), json!("90")],
            vec![json!("1700000300000"), json!("2"), json!("2"), json!("2"), json!("2"), json!("20"), json!("40")],
            vec![json!("1700000000000"), json!("1"), json!("1"), json!("1"), json!("1"), json!("10"), json!("10")],
        ];
        let table = table_from_rows("BTCUSDT", Interval::FiveMinutes, &rows).unwrap();
        let closes: Vec<f64> = table.closes().collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
        assert!(table.candles.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(table.candles[0].turnover, Some(10.0));
    }

    #[test]
    fn numeric_rows_and_missing_turnover_are_accepted() {
        let rows = vec![vec![json!(1_700_000_000), json!(1.5), json!(2), json!(1), json!(1.75), json!(100)]];
        let table = table_from_rows("ETHUSDT", Interval::OneHour, &rows).unwrap();
        let candle = &table.candles[0];
        assert_eq!(candle.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(candle.high, 2.0);
        assert_eq!(candle.turnover, None);
    }

    #[test]
    fn malformed_candles_pass_through_unchanged() {
        // high below low is not our business
        let rows = vec![vec![json!("1700000000000"), json!("5"), json!("1"), json!("9"), json!("5"), json!("0")]];
        let table = table_from_rows("XRPUSDT", Interval::OneMinute, &rows).unwrap();
        assert_eq!(table.candles[0].high, 1.0);
        assert_eq!(table.candles[0].low, 9.0);
    }

    #[test]
    fn short_row_is_a_data_format_error() {
        let rows = vec![
            vec![json!("1700000000000"), json!("1"), json!("1"), json!("1"), json!("1"), json!("1")],
            vec![json!("1700000300000"), json!("1"), json!("1")],
        ];
        let err = table_from_rows("BTCUSDT", Interval::FiveMinutes, &rows).unwrap_err();
        assert!(matches!(&err, ScreenerError::DataFormat(msg) if msg.contains("row 1")), "{err}");
    }

    #[test]
    fn bad_field_names_the_column() {
        let rows = vec![vec![json!("1700000000000"), json!("1"), json!("1"), json!("1"), json!("n/a"), json!("1")]];
        let err = table_from_rows("BTCUSDT", Interval::FiveMinutes, &rows).unwrap_err();
        assert!(matches!(&err, ScreenerError::DataFormat(msg) if msg.contains("close")), "{err}");

        let rows = vec![vec![json!("yesterday"), json!("1"), json!("1"), json!("1"), json!("1"), json!("1")]];
        let err = table_from_rows("BTCUSDT", Interval::FiveMinutes, &rows).unwrap_err();
        assert!(matches!(&err, ScreenerError::DataFormat(msg) if msg.contains("timestamp")), "{err}");

        let rows = vec![vec![
            json!("-9223372036854775808"),
            json!("1"),
            json!("1"),
            json!("1"),
            json!("1"),
            json!("1"),
        ]];
        let err = table_from_rows("BTCUSDT", Interval::FiveMinutes, &rows).unwrap_err();
        assert!(matches!(&err, ScreenerError::DataFormat(msg) if msg.contains("timestamp")), "{err}");
    }

    #[test]
    fn empty_page_is_an_empty_table() {
        let table = table_from_rows("BTCUSDT", Interval::FiveMinutes, &[]).unwrap();
        assert!(table.is_empty());
    }
}
