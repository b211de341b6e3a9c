use thiserror::Error;

/// Errors raised while decoding a feed frame.
///
/// Frame-level variants reject the whole message; market-level variants
/// reject only the offending market and leave its siblings intact.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid json: {0}")]
    SimdJson(#[from] simd_json::Error),

    #[error("frame root is not an object")]
    RootNotObject,

    #[error("market collection is not an object")]
    CollectionNotObject,

    #[error("market {market_id}: field map is not an object")]
    MarketNotObject { market_id: String },

    #[error("market {market_id}: bad quote for {entity_id}: {source}")]
    Quote {
        market_id: String,
        entity_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("market {market_id}: bad metadata {key}: {reason}")]
    Metadata {
        market_id: String,
        key: String,
        reason: String,
    },
}

impl ParseError {
    /// Market the error is confined to, if any.
    pub fn market_id(&self) -> Option<&str> {
        match self {
            ParseError::MarketNotObject { market_id }
            | ParseError::Quote { market_id, .. }
            | ParseError::Metadata { market_id, .. } => Some(market_id),
            _ => None,
        }
    }
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Errors surfaced by the feed task and the HTTP collaborators. Parse and
/// config failures keep their own types and never reach here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
