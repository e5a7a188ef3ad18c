use thiserror::Error;

/* Errors of the market data provider. Only RateLimited is worth retrying. */
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("symbol not found: {symbol}")]
    NotFound { symbol: String },

    #[error("rate limited while fetching {symbol}")]
    RateLimited { symbol: String },

    #[error("provider error for {symbol}: {message}")]
    Provider { symbol: String, message: String },

    #[error("error during deserialisation of {symbol}: {message}")]
    Decode { symbol: String, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}
