use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    UnsupportedPage(String),

    #[error("page fetch error: {0}")]
    PageFetch(String),

    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("{0}")]
    Fill(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("{0}")]
    Generation(String),

    #[error("{0}")]
    Api(String),

    #[error("{0}")]
    Settings(String),

    #[error("state error: {0}")]
    State(String),
}

pub type Result<T> = std::result::Result<T, Error>;
