//! Common utilities for usb-unconfigure
//!
//! This crate provides shared functionality between the host stack and its
//! callers: error handling, logging setup, and the async channel bridge that
//! carries commands to the dedicated USB worker thread.

pub mod channel;
pub mod error;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use channel::{UsbBridge, UsbCommand, UsbEvent, UsbWorker, create_usb_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
