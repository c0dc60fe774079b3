//! Standard control request vocabulary
//!
//! bmRequestType bit fields and bRequest codes from USB 2.0 chapter 9, plus
//! the setup packet that carries them.

use serde::{Deserialize, Serialize};

/// bmRequestType bit 7: host-to-device
pub const REQUEST_OUT: u8 = 0x00;
/// bmRequestType bit 7: device-to-host
pub const REQUEST_IN: u8 = 0x80;

/// bmRequestType bits 6..5: standard request
pub const REQUEST_TYPE_STANDARD: u8 = 0x00;
/// bmRequestType bits 6..5: class request
pub const REQUEST_TYPE_CLASS: u8 = 0x20;
/// bmRequestType bits 6..5: vendor request
pub const REQUEST_TYPE_VENDOR: u8 = 0x40;

/// bmRequestType bits 4..0: device recipient
pub const REQUEST_TARGET_DEVICE: u8 = 0x00;
/// bmRequestType bits 4..0: interface recipient
pub const REQUEST_TARGET_INTERFACE: u8 = 0x01;
/// bmRequestType bits 4..0: endpoint recipient
pub const REQUEST_TARGET_ENDPOINT: u8 = 0x02;

/// Configuration value that returns a device to the unconfigured state
pub const UNCONFIGURED_VALUE: u8 = 0;

/// Standard request codes (bRequest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StandardRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}

impl StandardRequest {
    /// Decode a bRequest value
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::GetStatus,
            0x01 => Self::ClearFeature,
            0x03 => Self::SetFeature,
            0x05 => Self::SetAddress,
            0x06 => Self::GetDescriptor,
            0x07 => Self::SetDescriptor,
            0x08 => Self::GetConfiguration,
            0x09 => Self::SetConfiguration,
            0x0A => Self::GetInterface,
            0x0B => Self::SetInterface,
            0x0C => Self::SynchFrame,
            _ => return None,
        })
    }

    /// The bRequest value
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// The 8-byte setup stage of a control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetupPacket {
    /// bmRequestType
    pub request_type: u8,
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
    /// wLength
    pub length: u16,
}

impl SetupPacket {
    /// SET_CONFIGURATION with the given configuration value and no data stage
    pub fn set_configuration(value: u8) -> Self {
        Self {
            request_type: REQUEST_OUT | REQUEST_TYPE_STANDARD | REQUEST_TARGET_DEVICE,
            request: StandardRequest::SetConfiguration.code(),
            value: value as u16,
            index: 0,
            length: 0,
        }
    }

    /// Whether the data stage (if any) flows device-to-host
    pub fn is_in(&self) -> bool {
        self.request_type & REQUEST_IN != 0
    }

    /// The standard request this packet carries, if it is one
    pub fn standard_request(&self) -> Option<StandardRequest> {
        if self.request_type & 0x60 != REQUEST_TYPE_STANDARD {
            return None;
        }
        StandardRequest::from_code(self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_configuration_zero_shape() {
        let setup = SetupPacket::set_configuration(UNCONFIGURED_VALUE);
        assert_eq!(setup.request_type, 0x00);
        assert_eq!(setup.request, 0x09);
        assert_eq!(setup.value, 0);
        assert_eq!(setup.index, 0);
        assert_eq!(setup.length, 0);
        assert!(!setup.is_in());
        assert_eq!(
            setup.standard_request(),
            Some(StandardRequest::SetConfiguration)
        );
    }

    #[test]
    fn test_vendor_request_is_not_standard() {
        let setup = SetupPacket {
            request_type: REQUEST_IN | REQUEST_TYPE_VENDOR | REQUEST_TARGET_DEVICE,
            request: 0x09,
            ..Default::default()
        };
        assert!(setup.is_in());
        assert_eq!(setup.standard_request(), None);
    }

    #[test]
    fn test_request_code_lookup() {
        assert_eq!(StandardRequest::from_code(0x02), None);
        assert_eq!(
            StandardRequest::from_code(0x05),
            Some(StandardRequest::SetAddress)
        );
        assert_eq!(StandardRequest::GetDescriptor.code(), 0x06);
    }
}
