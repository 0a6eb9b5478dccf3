//! Bybit v5 market-data client and response envelope.

use crate::error::{Result, ScreenerError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.bybit.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Instrument classes accepted by the market endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Linear,
    Inverse,
    Spot,
    #[serde(rename = "option")]
    Options,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Linear => "linear",
            Category::Inverse => "inverse",
            Category::Spot => "spot",
            Category::Options => "option",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{"retCode": 0, "retMsg": "OK", "result": {...}}`
///
/// Older gateways spell the status fields `ret_code`/`ret_msg`.
#[derive(Deserialize, Debug)]
struct Envelope {
    #[serde(rename = "retCode", alias = "ret_code")]
    ret_code: i64,
    #[serde(rename = "retMsg", alias = "ret_msg", default)]
    ret_msg: String,
    result: Option<Value>,
}

/// Decodes an envelope body. `retCode` is the only success signal.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    // Error responses carry `"result": {}`, so the payload is only typed after the code check.
    let envelope: Envelope = serde_json::from_slice(body)?;
    if envelope.ret_code != 0 {
        return Err(ScreenerError::Upstream {
            code: envelope.ret_code,
            message: envelope.ret_msg,
        });
    }
    let result = envelope
        .result
        .ok_or_else(|| ScreenerError::DataFormat("successful response without a result".to_string()))?;
    Ok(serde_json::from_value(result)?)
}

#[derive(Debug, Clone)]
pub struct Exchange {
    client: Client,
    base_url: String,
    category: Category,
}

impl Exchange {
    pub fn new(base_url: &str, category: Category, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, category))
    }

    /// Uses a preconfigured client, e.g. one with a different timeout or proxy setup.
    pub fn with_client(client: Client, base_url: &str, category: Category) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            category,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues one GET against `/v5/market/{path}` and decodes the envelope.
    ///
    /// The body is read whatever the HTTP status, since the exchange reports
    /// failures inside the envelope. A body that is not an envelope at all is
    /// a transport problem when the status was an error, and a format problem
    /// otherwise.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/v5/market/{}", self.base_url, path);
        let mut params = vec![("category", self.category.as_str().to_string())];
        params.extend(query.iter().cloned());

        debug!(%url, ?params, "GET");
        let response = self.client.get(&url).query(&params).send().await?;
        let status_error = response.error_for_status_ref().err();
        let body = response.bytes().await?;

        match (decode_envelope(&body), status_error) {
            (Err(ScreenerError::DataFormat(_)), Some(err)) => Err(ScreenerError::Transport(err)),
            (decoded, _) => decoded,
        }
    }
}
