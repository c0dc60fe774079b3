//! USB device record
//!
//! A [`Device`] holds the lifecycle state, the active configuration value,
//! the control endpoint, the configuration registry and the transport that
//! reaches the hardware. [`SharedDevice`] is the handle the rest of the
//! stack uses: every mutation goes through its lock.

use crate::configuration::{Configuration, ConfigurationRegistry};
use crate::class_driver::ClassDriver;
use crate::control::ControlEndpoint;
use crate::error::{HostError, Result};
use crate::hcd::HcdTransport;
use crate::reset::reset_device_configuration;
use protocol::{DeviceId, DeviceState, DeviceSummary, ResetError};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// USB device as seen by the host stack
pub struct Device {
    pub(crate) id: DeviceId,
    vendor_id: u16,
    product_id: u16,
    bus_number: u8,
    device_address: u8,
    pub(crate) state: DeviceState,
    /// Meaningful only while `state == Configured`
    pub(crate) current_configuration: u8,
    pub(crate) control_endpoint: ControlEndpoint,
    pub(crate) configurations: ConfigurationRegistry,
    pub(crate) hcd: Box<dyn HcdTransport>,
}

impl Device {
    /// Create an ATTACHED device reachable through `hcd`
    pub fn new(vendor_id: u16, product_id: u16, hcd: Box<dyn HcdTransport>) -> Self {
        Self {
            id: DeviceId(0),
            vendor_id,
            product_id,
            bus_number: 0,
            device_address: 0,
            state: DeviceState::Attached,
            current_configuration: 0,
            control_endpoint: ControlEndpoint::default(),
            configurations: ConfigurationRegistry::new(),
            hcd,
        }
    }

    /// Use a control endpoint with the device's bMaxPacketSize0
    pub fn with_control_endpoint(mut self, endpoint: ControlEndpoint) -> Self {
        self.control_endpoint = endpoint;
        self
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn bus_number(&self) -> u8 {
        self.bus_number
    }

    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Active configuration value, only while CONFIGURED
    pub fn active_configuration(&self) -> Option<u8> {
        (self.state == DeviceState::Configured).then_some(self.current_configuration)
    }

    pub fn control_endpoint(&self) -> &ControlEndpoint {
        &self.control_endpoint
    }

    pub fn configurations(&self) -> &ConfigurationRegistry {
        &self.configurations
    }

    /// Find a configuration record by value
    pub fn find_configuration(&self, value: u8) -> Option<&Configuration> {
        self.configurations.find(value)
    }

    /// Append a parsed configuration record
    pub fn add_configuration(&mut self, configuration: Configuration) -> Result<()> {
        self.configurations.insert(configuration)
    }

    /// Record the bus location once an address has been assigned
    pub fn mark_addressed(&mut self, bus_number: u8, device_address: u8) {
        self.bus_number = bus_number;
        self.device_address = device_address;
        self.state = DeviceState::Addressed;
    }

    /// Record that configuration `value` has been selected on the device
    ///
    /// Hook for the configuration-selection path: validates the value,
    /// releases any other active configuration, and instantiates the
    /// selected configuration's interfaces and endpoints.
    pub fn mark_configured(&mut self, value: u8) -> Result<()> {
        if self.configurations.find(value).is_none() {
            return Err(HostError::UnknownConfiguration { value });
        }

        if let Some(active) = self.active_configuration() {
            if active == value {
                return Ok(());
            }
            if let Some(previous) = self.configurations.find_mut(active) {
                previous.release(&mut self.hcd);
            }
        }

        if let Some(configuration) = self.configurations.find_mut(value) {
            configuration.instantiate();
        }
        self.current_configuration = value;
        self.state = DeviceState::Configured;
        debug!("{} configured with value {}", self.id, value);
        Ok(())
    }

    /// Bind a class driver to an interface of the active configuration
    pub fn bind_class_driver(&mut self, interface: u8, driver: Box<dyn ClassDriver>) -> Result<()> {
        let value = self
            .active_configuration()
            .ok_or(HostError::NotInstantiated { value: 0 })?;
        self.configurations
            .find_mut(value)
            .ok_or(HostError::UnknownConfiguration { value })?
            .bind_class_driver(interface, driver)
    }

    /// Return the device to the unconfigured (ATTACHED) state
    pub fn reset_configuration(&mut self) -> std::result::Result<(), ResetError> {
        reset_device_configuration(self)
    }

    /// Release the active configuration and destroy every record
    ///
    /// The device ends DETACHED. No request is sent; the device is gone.
    pub fn detach(&mut self) {
        if let Some(value) = self.active_configuration() {
            match self.configurations.find_mut(value) {
                Some(configuration) => configuration.release(&mut self.hcd),
                None => warn!(
                    "{} detached while configured with unknown value {}",
                    self.id, value
                ),
            }
        }

        self.state = DeviceState::Detached;
        self.current_configuration = 0;
        self.configurations.clear();
        info!("{} detached", self.id);
    }

    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            id: self.id,
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            bus_number: self.bus_number,
            device_address: self.device_address,
            state: self.state,
            active_configuration: self.active_configuration(),
            configurations: self.configurations.values(),
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("vendor_id", &format_args!("{:#06x}", self.vendor_id))
            .field("product_id", &format_args!("{:#06x}", self.product_id))
            .field("state", &self.state)
            .field("current_configuration", &self.current_configuration)
            .field("configurations", &self.configurations.values())
            .finish()
    }
}

/// Exclusive-access handle to a device
///
/// Reset, detach and configuration marking all hold the lock for their
/// whole duration, including the blocking hardware round trip.
#[derive(Clone)]
pub struct SharedDevice {
    inner: Arc<Mutex<Device>>,
}

impl SharedDevice {
    pub fn new(device: Device) -> Self {
        Self {
            inner: Arc::new(Mutex::new(device)),
        }
    }

    /// Lock the device for exclusive access
    pub fn lock(&self) -> std::result::Result<MutexGuard<'_, Device>, ResetError> {
        self.inner.lock().map_err(|_| ResetError::DeviceUnavailable {
            message: "device lock poisoned".to_string(),
        })
    }

    /// Lock the device even if a previous holder panicked
    ///
    /// Only for detach, which must finish tearing the device down.
    pub(crate) fn lock_for_teardown(&self) -> MutexGuard<'_, Device> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Device lock poisoned; completing teardown anyway");
            poisoned.into_inner()
        })
    }

    /// Unconfigure the device while holding its lock
    pub fn reset_configuration(&self) -> std::result::Result<(), ResetError> {
        self.lock()?.reset_configuration()
    }

    pub fn summary(&self) -> std::result::Result<DeviceSummary, ResetError> {
        Ok(self.lock()?.summary())
    }
}

impl fmt::Debug for SharedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Ok(device) => f.debug_tuple("SharedDevice").field(&*device).finish(),
            Err(_) => f.write_str("SharedDevice(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockTransport, RecordingDriver, configuration_descriptor};

    fn device_with(values: &[u8]) -> (Device, MockTransport) {
        let hcd = MockTransport::new();
        let mut device = Device::new(0x1234, 0x5678, Box::new(hcd.clone()));
        for &value in values {
            device
                .add_configuration(Configuration::new(configuration_descriptor(value, 1)))
                .unwrap();
        }
        (device, hcd)
    }

    #[test]
    fn test_new_device_is_attached() {
        let (device, _) = device_with(&[]);
        assert_eq!(device.state(), DeviceState::Attached);
        assert_eq!(device.active_configuration(), None);
    }

    #[test]
    fn test_mark_configured_unknown_value() {
        let (mut device, _) = device_with(&[1]);
        let err = device.mark_configured(2).unwrap_err();
        assert!(matches!(err, HostError::UnknownConfiguration { value: 2 }));
        assert_eq!(device.state(), DeviceState::Attached);
    }

    #[test]
    fn test_mark_configured_switch_releases_previous() {
        let (mut device, hcd) = device_with(&[1, 2]);
        device.mark_addressed(1, 5);
        device.mark_configured(1).unwrap();
        let driver = RecordingDriver::new("cdc");
        device.bind_class_driver(0, Box::new(driver.clone())).unwrap();

        device.mark_configured(2).unwrap();

        assert_eq!(device.active_configuration(), Some(2));
        assert_eq!(driver.detached().len(), 1);
        assert!(!device.find_configuration(1).unwrap().is_instantiated());
        assert!(device.find_configuration(2).unwrap().is_instantiated());
        assert_eq!(hcd.destroyed_endpoints().len(), 2);
        // Selection never talks to the control endpoint here
        assert!(hcd.submitted().is_empty());
    }

    #[test]
    fn test_bind_requires_configured_device() {
        let (mut device, _) = device_with(&[1]);
        let err = device
            .bind_class_driver(0, Box::new(RecordingDriver::new("hid")))
            .unwrap_err();
        assert!(matches!(err, HostError::NotInstantiated { .. }));
    }

    #[test]
    fn test_detach_destroys_records() {
        let (mut device, hcd) = device_with(&[1, 2]);
        device.mark_configured(2).unwrap();
        let driver = RecordingDriver::new("msc");
        device.bind_class_driver(0, Box::new(driver.clone())).unwrap();

        device.detach();

        assert_eq!(device.state(), DeviceState::Detached);
        assert!(device.configurations().is_empty());
        assert_eq!(driver.detached().len(), 1);
        assert!(hcd.submitted().is_empty());
    }

    #[test]
    fn test_summary_reports_active_configuration() {
        let (mut device, _) = device_with(&[3, 1]);
        device.mark_addressed(2, 9);
        device.mark_configured(1).unwrap();

        let summary = device.summary();
        assert_eq!(summary.bus_number, 2);
        assert_eq!(summary.device_address, 9);
        assert_eq!(summary.state, DeviceState::Configured);
        assert_eq!(summary.active_configuration, Some(1));
        assert_eq!(summary.configurations, vec![3, 1]);
    }

    #[test]
    fn test_shared_device_poisoned_lock() {
        let (device, _) = device_with(&[1]);
        let shared = SharedDevice::new(device);

        let clone = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(matches!(
            shared.reset_configuration(),
            Err(ResetError::DeviceUnavailable { .. })
        ));
    }
}
