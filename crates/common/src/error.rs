//! Common error types

use protocol::ResetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration reset failed: {0}")]
    Reset(#[from] ResetError),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
