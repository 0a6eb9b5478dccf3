use crate::error::{Result, ScreenerError};
use crate::find_tickers::Instrument;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// Narrows the listed instruments down to the ones a scan should visit.
#[derive(Debug, Clone, Default)]
pub struct SymbolFilter {
    fields: HashMap<String, String>,
    pattern: Option<Regex>,
}

impl SymbolFilter {
    pub fn new(fields: HashMap<String, String>, pattern: Option<&str>) -> Result<Self> {
        let pattern = pattern
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                Regex::new(p).map_err(|e| ScreenerError::InvalidParameter(format!("symbol pattern `{p}`: {e}")))
            })
            .transpose()?;
        Ok(Self { fields, pattern })
    }

    pub fn matches(&self, instrument: &Instrument) -> bool {
        if let Some(re) = &self.pattern {
            if !re.is_match(&instrument.symbol) {
                return false;
            }
        }
        matches_filters(&instrument.fields, &self.fields)
    }
}

pub fn matches_filters(fields: &serde_json::Map<String, Value>, filters: &HashMap<String, String>) -> bool {
    filters.iter().all(|(key, required_value)| match fields.get(key) {
        // e.g. "status": "Trading"
        Some(Value::String(s)) => s == required_value,
        // array fields match when any element does
        Some(Value::Array(arr)) => arr.iter().any(|v| v.as_str() == Some(required_value.as_str())),
        // numbers and booleans compare by their JSON text
        Some(v) => v.to_string() == *required_value,
        None => false,
    })
}
