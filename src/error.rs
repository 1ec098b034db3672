use thiserror::Error;

/// Core error taxonomy shared by every pipeline stage.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Identity, optical reference or an expected region is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identity resolved but no strategy is registered for it.
    #[error("No extraction strategy registered for lab '{0}'")]
    Unsupported(String),

    /// Expected field or table shape is absent.
    #[error("Unexpected document shape: {0}")]
    ParseMismatch(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// OCR or optical-code decoding failed.
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Hash error: {0}")]
    Hash(String),
}

impl ParseError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unsupported(_) => "unsupported",
            Self::ParseMismatch(_) => "parse_mismatch",
            Self::NetworkFailure(_) => "network_failure",
            Self::DecodeFailure(_) => "decode_failure",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Hash(_) => "hash",
        }
    }
}
