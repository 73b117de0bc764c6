//! Error types for the bridge core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authorization error: {0}")]
    Authorization(String),

    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("state error: {0}")]
    State(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("hex encoding error: {0}")]
    Hex(#[from] hex::FromHexError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
