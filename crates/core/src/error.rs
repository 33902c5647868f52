use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid key hex: expected {expected} hex characters, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid key hex: {0}")]
    InvalidKeyHex(String),

    #[error("Payload too large: {size} bytes exceeds {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, CoreError>;
