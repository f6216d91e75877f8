use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed for {path}: {message}")]
    Authentication { path: String, message: String },

    #[error("Request to {path} failed with status {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("Request to {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest_middleware::Error,
    },

    #[error("Could not parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Destination error: {0}")]
    Destination(#[from] mongodb::error::Error),

    #[error("Could not convert record to BSON: {0}")]
    Bson(#[from] bson::ser::Error),

    #[error("Registry error: {0}")]
    Registry(String),
}

impl Error {
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
