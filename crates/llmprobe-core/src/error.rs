use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Could not connect to endpoint: {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Server returned HTTP {status}: {body}")]
    Server { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProbeError {
    /// Short machine-friendly kind, used in failure diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Connection(_) => "connection",
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Server { .. } => "server",
            ProbeError::Http(_) => "http",
            ProbeError::InvalidEndpoint(_) => "endpoint",
            ProbeError::Config(_) => "config",
            ProbeError::Io(_) => "io",
            ProbeError::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;
