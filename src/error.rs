use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Missing required environment variable: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid value for {key}: {message}")]
    ConfigInvalid { key: String, message: String },

    // Store errors
    #[error("Failed to load store '{path}': {source}")]
    StoreLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse store '{path}': {source}")]
    StoreParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to save store '{path}': {source}")]
    StoreSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Outbound HTTP errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream {endpoint} returned {status}")]
    Upstream { endpoint: String, status: u16 },

    // OAuth errors
    #[error("OAuth failure: {message}")]
    OAuth { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
