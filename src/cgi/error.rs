use thiserror::Error;

/// Failures of a single CGI invocation
#[derive(Debug, Error)]
pub enum CgiError {
    #[error("invalid CONTENT_LENGTH value: '{value}'")]
    InvalidContentLength { value: String },
    #[error("request body too large: {length} bytes (max: {limit})")]
    BodyTooLarge { length: u64, limit: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CgiError {
    /// HTTP status the gateway answers with for this failure
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidContentLength { .. } => 400,
            Self::BodyTooLarge { .. } => 413,
            Self::Io(_) => 500,
        }
    }
}
