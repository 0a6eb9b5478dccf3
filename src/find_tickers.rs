use crate::candles::Symbol;
use crate::error::Result;
use crate::exchange::Exchange;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

/// Largest page the instruments endpoint serves. Further pages are not requested.
const INSTRUMENTS_PAGE_LIMIT: u32 = 1000;

/// One listed instrument. Every field besides `symbol` is kept as raw JSON so
/// the scan filters can match on whatever the exchange reports.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Instrument {
    pub symbol: Symbol,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Deserialize, Debug)]
struct InstrumentsPage {
    #[serde(default)]
    list: Vec<Instrument>,
}

/// Lists every instrument of the exchange's configured category, in exchange order.
pub async fn list_instruments(exchange: &Exchange) -> Result<Vec<Instrument>> {
    let query = [("limit", INSTRUMENTS_PAGE_LIMIT.to_string())];
    let page: InstrumentsPage = exchange.get("instruments-info", &query).await?;

    info!(
        category = %exchange.category(),
        count = page.list.len(),
        "Fetched instrument list"
    );
    Ok(page.list)
}

pub async fn list_symbols(exchange: &Exchange) -> Result<Vec<Symbol>> {
    let instruments = list_instruments(exchange).await?;
    Ok(instruments.into_iter().map(|i| i.symbol).collect())
}
