//! USB device manager
//!
//! Registry of attached devices. Assigns device IDs, hands out
//! [`SharedDevice`] handles, and routes reset and detach requests to the
//! right device under that device's lock.

use crate::device::{Device, SharedDevice};
use protocol::{DeviceId, DeviceSummary, ResetError};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Registry of attached devices
#[derive(Debug, Default)]
pub struct DeviceManager {
    /// Attached devices by ID
    devices: HashMap<DeviceId, SharedDevice>,
    /// (bus, address) -> DeviceId for addressed devices
    locations: HashMap<(u8, u8), DeviceId>,
    /// Next device ID to assign
    next_device_id: u32,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            next_device_id: 1,
            ..Default::default()
        }
    }

    /// Register a device and assign its ID
    ///
    /// A device at a (bus, address) already tracked keeps the existing ID;
    /// the new record is dropped.
    pub fn attach_device(&mut self, mut device: Device) -> DeviceId {
        let location = (device.bus_number(), device.device_address());
        if location.1 != 0
            && let Some(existing) = self.locations.get(&location)
        {
            debug!(
                "Device at bus={}, addr={} already tracked as {}",
                location.0, location.1, existing
            );
            return *existing;
        }

        let device_id = DeviceId(self.next_device_id.max(1));
        self.next_device_id = device_id.0 + 1;
        device.id = device_id;

        info!(
            "Attached {}: vid={:#06x}, pid={:#06x}, bus={}, addr={}, configurations={:?}",
            device_id,
            device.vendor_id(),
            device.product_id(),
            location.0,
            location.1,
            device.configurations().values()
        );

        if location.1 != 0 {
            self.locations.insert(location, device_id);
        }
        self.devices.insert(device_id, SharedDevice::new(device));
        device_id
    }

    /// Exclusive-access handle for a device
    pub fn device(&self, device_id: DeviceId) -> Option<SharedDevice> {
        self.devices.get(&device_id).cloned()
    }

    /// Look a device up by bus location
    pub fn find_by_location(&self, bus_number: u8, device_address: u8) -> Option<DeviceId> {
        self.locations.get(&(bus_number, device_address)).copied()
    }

    /// Summaries of all attached devices, ordered by ID
    pub fn list_devices(&self) -> Vec<DeviceSummary> {
        let mut summaries: Vec<DeviceSummary> = self
            .devices
            .values()
            .filter_map(|device| match device.summary() {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!("Skipping device in listing: {}", e);
                    None
                }
            })
            .collect();
        summaries.sort_by_key(|s| s.id.0);
        summaries
    }

    /// Unconfigure a device
    pub fn reset_configuration(&self, device_id: DeviceId) -> Result<(), ResetError> {
        let device = self
            .devices
            .get(&device_id)
            .ok_or(ResetError::DeviceNotFound { device_id })?;
        device.reset_configuration()
    }

    /// Detach a device, releasing its resources and destroying its records
    ///
    /// Teardown runs even when an earlier operation panicked while holding
    /// the device lock.
    pub fn detach_device(&mut self, device_id: DeviceId) -> Result<(), ResetError> {
        let device = self
            .devices
            .get(&device_id)
            .ok_or(ResetError::DeviceNotFound { device_id })?;
        device.lock_for_teardown().detach();

        self.devices.remove(&device_id);
        self.locations.retain(|_, id| *id != device_id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Configuration;
    use crate::test_utils::{
        MockTransport, PanickingDriver, RecordingDriver, configuration_descriptor,
        configured_device, device_with_configurations,
    };
    use protocol::DeviceState;

    #[test]
    fn test_device_id_assignment() {
        let hcd = MockTransport::new();
        let mut manager = DeviceManager::new();

        let first = manager.attach_device(device_with_configurations(&hcd, &[1]));
        let second = manager.attach_device(device_with_configurations(&hcd, &[1]));

        assert_eq!(first, DeviceId(1));
        assert_eq!(second, DeviceId(2));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_same_location_keeps_id() {
        let hcd = MockTransport::new();
        let mut manager = DeviceManager::new();

        let first = manager.attach_device(configured_device(&hcd, &[1], 1));
        let again = manager.attach_device(configured_device(&hcd, &[1], 1));

        assert_eq!(first, again);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.find_by_location(1, 2), Some(first));
    }

    #[test]
    fn test_reset_unknown_device() {
        let manager = DeviceManager::new();
        assert_eq!(
            manager.reset_configuration(DeviceId(5)),
            Err(ResetError::DeviceNotFound {
                device_id: DeviceId(5)
            })
        );
    }

    #[test]
    fn test_reset_and_list() {
        let hcd = MockTransport::new();
        let mut manager = DeviceManager::new();
        let id = manager.attach_device(configured_device(&hcd, &[1, 2], 2));

        assert_eq!(manager.list_devices()[0].active_configuration, Some(2));
        manager.reset_configuration(id).unwrap();

        let summary = &manager.list_devices()[0];
        assert_eq!(summary.state, DeviceState::Attached);
        assert_eq!(summary.active_configuration, None);
        assert_eq!(summary.configurations, vec![1, 2]);
    }

    #[test]
    fn test_detach_removes_device() {
        let hcd = MockTransport::new();
        let mut manager = DeviceManager::new();
        let id = manager.attach_device(configured_device(&hcd, &[1], 1));
        let handle = manager.device(id).unwrap();

        manager.detach_device(id).unwrap();

        assert!(manager.is_empty());
        assert_eq!(manager.find_by_location(1, 2), None);
        assert_eq!(handle.lock().unwrap().state(), DeviceState::Detached);
        assert!(matches!(
            manager.detach_device(id),
            Err(ResetError::DeviceNotFound { .. })
        ));
    }

    #[test]
    fn test_detached_handle_refuses_reset() {
        let hcd = MockTransport::new();
        let mut manager = DeviceManager::new();
        let id = manager.attach_device(configured_device(&hcd, &[1], 1));
        let handle = manager.device(id).unwrap();

        manager.detach_device(id).unwrap();

        assert!(matches!(
            handle.reset_configuration(),
            Err(ResetError::DeviceUnavailable { .. })
        ));
        assert_eq!(handle.lock().unwrap().state(), DeviceState::Detached);
        assert!(hcd.submitted().is_empty());
    }

    #[test]
    fn test_detach_completes_after_driver_panic() {
        let hcd = MockTransport::new();
        let mut device = Device::new(0x1209, 0x0001, Box::new(hcd.clone()));
        device
            .add_configuration(Configuration::new(configuration_descriptor(1, 2)))
            .unwrap();
        device.mark_addressed(1, 2);
        device.mark_configured(1).unwrap();
        let driver = RecordingDriver::new("cdc-data");
        device.bind_class_driver(0, Box::new(PanickingDriver)).unwrap();
        device.bind_class_driver(1, Box::new(driver.clone())).unwrap();

        let mut manager = DeviceManager::new();
        let id = manager.attach_device(device);
        let handle = manager.device(id).unwrap();

        // Reset panics inside teardown and poisons the device lock
        let other = handle.clone();
        assert!(std::thread::spawn(move || other.reset_configuration())
            .join()
            .is_err());
        assert!(handle.lock().is_err());

        manager.detach_device(id).unwrap();

        assert!(manager.is_empty());
        assert_eq!(manager.find_by_location(1, 2), None);
        assert_eq!(driver.detached().len(), 1);
        assert_eq!(hcd.destroyed_endpoints().len(), 4);
        assert!(hcd.submitted().is_empty());
        assert_eq!(handle.lock_for_teardown().state(), DeviceState::Detached);
    }
}
