//! Host stack error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no configuration record with value {value}")]
    UnknownConfiguration { value: u8 },

    #[error("configuration value {value} is already registered")]
    DuplicateConfiguration { value: u8 },

    #[error("configuration {configuration} has no active interface {interface}")]
    UnknownInterface { configuration: u8, interface: u8 },

    #[error("configuration {value} is not instantiated")]
    NotInstantiated { value: u8 },

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;
