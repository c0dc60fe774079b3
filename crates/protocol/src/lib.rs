//! Protocol library for usb-unconfigure
//!
//! This crate defines the USB vocabulary shared by the host stack and its
//! callers: device identity and lifecycle, standard control requests, the
//! setup packet wire form, and the completion/error types a configuration
//! reset reports.
//!
//! # Example
//!
//! ```
//! use protocol::{SetupPacket, UNCONFIGURED_VALUE, encode_setup};
//!
//! let setup = SetupPacket::set_configuration(UNCONFIGURED_VALUE);
//! assert_eq!(encode_setup(&setup), [0x00, 0x09, 0, 0, 0, 0, 0, 0]);
//! ```

pub mod codec;
pub mod request;
pub mod types;

pub use codec::{SETUP_PACKET_SIZE, encode_setup};
pub use request::{
    REQUEST_IN, REQUEST_OUT, REQUEST_TARGET_DEVICE, REQUEST_TARGET_ENDPOINT,
    REQUEST_TARGET_INTERFACE, REQUEST_TYPE_CLASS, REQUEST_TYPE_STANDARD, REQUEST_TYPE_VENDOR,
    SetupPacket, StandardRequest, UNCONFIGURED_VALUE,
};
pub use types::{CompletionStatus, DeviceId, DeviceState, DeviceSummary, ResetError};
