use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScreenerError>;

#[derive(Error, Debug)]
pub enum ScreenerError {
    /// The request never produced a usable body (timeout, DNS, refused connection, non-JSON body).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The exchange answered but reported a non-zero status code.
    #[error("Exchange error {code}: {message}")]
    Upstream { code: i64, message: String },

    #[error("Data format error: {0}")]
    DataFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ScreenerError {
    /// Short label shown next to a failed symbol.
    pub fn kind(&self) -> &'static str {
        match self {
            ScreenerError::Transport(_) => "transport",
            ScreenerError::Upstream { .. } => "upstream",
            ScreenerError::DataFormat(_) => "data format",
            ScreenerError::InvalidParameter(_) => "invalid parameter",
        }
    }
}

impl From<serde_json::Error> for ScreenerError {
    fn from(err: serde_json::Error) -> Self {
        ScreenerError::DataFormat(err.to_string())
    }
}
