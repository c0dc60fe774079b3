//! USB host stack configuration teardown
//!
//! Returns devices to the unconfigured (ATTACHED) state: releases the active
//! configuration's interfaces, endpoints and class-driver bindings, records
//! the new state, and sends SET_CONFIGURATION(0) through the host controller
//! transport.
//!
//! The pieces, leaves first:
//! - [`configuration`]: configuration records, their resource arena and teardown
//! - [`control`]: the control endpoint's reusable request slot
//! - [`hcd`]: the transport contract and a libusb implementation
//! - [`device`] and [`reset`]: device state and the reset operation
//! - [`manager`] and [`worker`]: device registry and the thread that owns it

pub mod class_driver;
pub mod config;
pub mod configuration;
pub mod control;
pub mod device;
pub mod enumerate;
pub mod error;
pub mod hcd;
pub mod manager;
pub mod reset;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod worker;

pub use class_driver::{ClassDriver, InterfaceContext};
pub use configuration::{Configuration, ConfigurationDescriptor, ConfigurationRegistry};
pub use control::{ControlEndpoint, TransferRequest};
pub use device::{Device, SharedDevice};
pub use error::{HostError, Result};
pub use hcd::{HcdTransport, RusbTransport};
pub use manager::DeviceManager;
pub use reset::reset_device_configuration;
pub use worker::{UsbWorkerThread, spawn_usb_worker};
