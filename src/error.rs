use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] axum::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("Invalid image payload: {0}")]
    InvalidImage(String),

    #[error("Invalid state transition: {current} -> {requested}")]
    InvalidTransition { current: String, requested: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Analysis not found: {analysis_id}")]
    AnalysisNotFound { analysis_id: String },

    #[error("Post not found: {post_id}")]
    PostNotFound { post_id: String },

    #[error("Content rejected by moderation")]
    ContentRejected,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
