//! USB host stack type definitions
//!
//! This module defines the device lifecycle, completion status and error
//! types shared between the host stack, the worker bridge and callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique device identifier (host-assigned)
///
/// Assigned by the device manager when a device is attached. Stable for the
/// lifetime of the attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Device lifecycle state
///
/// Variant order reflects enumeration progress, so states compare with
/// `<` / `>` the way the USB device framework orders them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum DeviceState {
    /// Not connected to the bus
    #[default]
    Detached,
    /// Connected and powered, default address
    Attached,
    /// Assigned a unique bus address
    Addressed,
    /// A configuration has been selected
    Configured,
}

/// Completion status reported by the host controller transport
///
/// Maps to the outcomes a control transfer can have on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    /// The device acknowledged the request
    Success,
    /// The device returned STALL
    Stall,
    /// No response before the transport's deadline
    Timeout,
    /// CRC, bit-stuffing, babble or other bus-level failure
    TransactionError,
    /// The device went away while the request was pending
    NoDevice,
    /// Transport-specific failure with message
    Other { message: String },
}

impl CompletionStatus {
    /// Whether the transfer completed successfully
    pub fn is_success(&self) -> bool {
        matches!(self, CompletionStatus::Success)
    }
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionStatus::Success => write!(f, "success"),
            CompletionStatus::Stall => write!(f, "stall"),
            CompletionStatus::Timeout => write!(f, "timeout"),
            CompletionStatus::TransactionError => write!(f, "transaction error"),
            CompletionStatus::NoDevice => write!(f, "no device"),
            CompletionStatus::Other { message } => write!(f, "{}", message),
        }
    }
}

/// Configuration reset error
///
/// Returned when unconfiguring a device does not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ResetError {
    /// The SET_CONFIGURATION(0) request did not succeed.
    ///
    /// The device is already ATTACHED locally when this is reported.
    #[error("SET_CONFIGURATION(0) failed: {status}")]
    Transport { status: CompletionStatus },

    /// The device claims to be configured with a value that has no record
    #[error("no configuration record with value {value}")]
    ConfigurationNotFound { value: u8 },

    /// No attached device carries this ID
    #[error("{device_id} not found")]
    DeviceNotFound { device_id: DeviceId },

    /// The device could not be accessed (poisoned lock, worker gone)
    #[error("device unavailable: {message}")]
    DeviceUnavailable { message: String },
}

impl ResetError {
    /// The transport's completion status, if the failure came from the transport
    pub fn completion_status(&self) -> Option<&CompletionStatus> {
        match self {
            ResetError::Transport { status } => Some(status),
            _ => None,
        }
    }
}

/// Snapshot of an attached device, as returned by device listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    /// Host-assigned device identifier
    pub id: DeviceId,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Current lifecycle state
    pub state: DeviceState,
    /// Active configuration value (only when CONFIGURED)
    pub active_configuration: Option<u8>,
    /// Configuration values known to the registry, in insertion order
    pub configurations: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_state_ordering() {
        assert!(DeviceState::Detached < DeviceState::Attached);
        assert!(DeviceState::Attached < DeviceState::Addressed);
        assert!(DeviceState::Addressed < DeviceState::Configured);
        assert_eq!(DeviceState::default(), DeviceState::Detached);
    }

    #[test]
    fn test_completion_status_success() {
        assert!(CompletionStatus::Success.is_success());
        assert!(!CompletionStatus::Stall.is_success());
        assert!(
            !CompletionStatus::Other {
                message: "x".to_string()
            }
            .is_success()
        );
    }

    #[test]
    fn test_reset_error_completion_status() {
        let err = ResetError::Transport {
            status: CompletionStatus::Timeout,
        };
        assert_eq!(err.completion_status(), Some(&CompletionStatus::Timeout));

        let err = ResetError::ConfigurationNotFound { value: 3 };
        assert_eq!(err.completion_status(), None);
    }

    #[test]
    fn test_reset_error_display() {
        let err = ResetError::ConfigurationNotFound { value: 7 };
        assert!(err.to_string().contains("value 7"));

        let err = ResetError::Transport {
            status: CompletionStatus::Stall,
        };
        assert!(err.to_string().contains("stall"));

        let err = ResetError::DeviceNotFound {
            device_id: DeviceId(4),
        };
        assert_eq!(err.to_string(), "device#4 not found");
    }
}
