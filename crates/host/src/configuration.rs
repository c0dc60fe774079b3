//! Configuration records and teardown
//!
//! Each device keeps one [`Configuration`] per parsed configuration
//! descriptor, in the order descriptor parsing produced them. A record has
//! two halves:
//! - the descriptor data, which lives as long as the device does
//! - the instance: interfaces, endpoints and class-driver bindings that exist
//!   only while the configuration is active
//!
//! Instance resources live in an arena owned by the record and refer to each
//! other by index. Teardown ([`Configuration::release`]) empties the arena but
//! never removes the record from the [`ConfigurationRegistry`], so the same
//! configuration can be selected again later.

use crate::class_driver::{ClassBinding, ClassDriver, InterfaceContext};
use crate::error::{HostError, Result};
use crate::hcd::HcdTransport;
use tracing::debug;

/// Parsed endpoint descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// bEndpointAddress (bit 7 = IN)
    pub address: u8,
    /// bmAttributes (bits 1..0 = transfer type)
    pub attributes: u8,
    /// wMaxPacketSize
    pub max_packet_size: u16,
    /// bInterval
    pub interval: u8,
}

impl EndpointDescriptor {
    /// Endpoint number without the direction bit
    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }

    pub fn is_in(&self) -> bool {
        self.address & 0x80 != 0
    }
}

/// Parsed interface descriptor (one alternate setting)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub alternate_setting: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

/// Parsed configuration descriptor with every alternate setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationDescriptor {
    /// bConfigurationValue
    pub value: u8,
    /// bmAttributes
    pub attributes: u8,
    /// Maximum power draw in milliamps
    pub max_power_ma: u16,
    pub interfaces: Vec<InterfaceDescriptor>,
}

/// Index of an interface in a configuration's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceIndex(usize);

/// Index of an endpoint in a configuration's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointIndex(usize);

/// Active interface with its selected alternate setting
#[derive(Debug)]
pub struct InterfaceInstance {
    pub number: u8,
    pub alternate_setting: u8,
    pub class: u8,
    endpoints: Vec<EndpointIndex>,
    binding: Option<ClassBinding>,
}

impl InterfaceInstance {
    pub fn endpoints(&self) -> &[EndpointIndex] {
        &self.endpoints
    }

    /// Name of the bound class driver, if any
    pub fn bound_driver(&self) -> Option<&str> {
        self.binding.as_ref().map(ClassBinding::driver_name)
    }
}

/// Active endpoint, owned by one interface
#[derive(Debug)]
pub struct EndpointInstance {
    pub descriptor: EndpointDescriptor,
    pub interface: InterfaceIndex,
}

#[derive(Debug, Default)]
struct ConfigurationInstance {
    interfaces: Vec<InterfaceInstance>,
    endpoints: Vec<EndpointInstance>,
}

/// One configuration of a device
#[derive(Debug)]
pub struct Configuration {
    descriptor: ConfigurationDescriptor,
    instance: Option<ConfigurationInstance>,
}

impl Configuration {
    pub fn new(descriptor: ConfigurationDescriptor) -> Self {
        Self {
            descriptor,
            instance: None,
        }
    }

    /// bConfigurationValue
    pub fn value(&self) -> u8 {
        self.descriptor.value
    }

    pub fn descriptor(&self) -> &ConfigurationDescriptor {
        &self.descriptor
    }

    /// Whether interface/endpoint resources currently exist
    pub fn is_instantiated(&self) -> bool {
        self.instance.is_some()
    }

    /// Build the resource arena with alternate setting 0 of every interface
    ///
    /// Called by the configuration-selection path. Any previous instance is
    /// replaced without teardown, so callers release first.
    pub fn instantiate(&mut self) {
        let mut instance = ConfigurationInstance::default();

        for alt in self
            .descriptor
            .interfaces
            .iter()
            .filter(|alt| alt.alternate_setting == 0)
        {
            let interface = InterfaceIndex(instance.interfaces.len());
            let mut endpoints = Vec::with_capacity(alt.endpoints.len());
            for descriptor in &alt.endpoints {
                endpoints.push(EndpointIndex(instance.endpoints.len()));
                instance.endpoints.push(EndpointInstance {
                    descriptor: *descriptor,
                    interface,
                });
            }
            instance.interfaces.push(InterfaceInstance {
                number: alt.number,
                alternate_setting: alt.alternate_setting,
                class: alt.class,
                endpoints,
                binding: None,
            });
        }

        debug!(
            "Instantiated configuration {}: {} interfaces, {} endpoints",
            self.descriptor.value,
            instance.interfaces.len(),
            instance.endpoints.len()
        );
        self.instance = Some(instance);
    }

    /// Bind a class driver to an active interface
    ///
    /// Replaces (without detaching) any driver already bound there.
    pub fn bind_class_driver(
        &mut self,
        interface: u8,
        driver: Box<dyn ClassDriver>,
    ) -> Result<()> {
        let value = self.descriptor.value;
        let instance = self
            .instance
            .as_mut()
            .ok_or(HostError::NotInstantiated { value })?;

        let slot = instance
            .interfaces
            .iter_mut()
            .find(|i| i.number == interface)
            .ok_or(HostError::UnknownInterface {
                configuration: value,
                interface,
            })?;

        debug!(
            "Bound class driver '{}' to configuration {} interface {}",
            driver.name(),
            value,
            interface
        );
        slot.binding = Some(ClassBinding::new(driver));
        Ok(())
    }

    /// Active interfaces, empty when not instantiated
    pub fn interfaces(&self) -> &[InterfaceInstance] {
        self.instance
            .as_ref()
            .map(|i| i.interfaces.as_slice())
            .unwrap_or(&[])
    }

    pub fn interface(&self, index: InterfaceIndex) -> Option<&InterfaceInstance> {
        self.instance.as_ref()?.interfaces.get(index.0)
    }

    pub fn endpoint(&self, index: EndpointIndex) -> Option<&EndpointInstance> {
        self.instance.as_ref()?.endpoints.get(index.0)
    }

    /// Number of active endpoints
    pub fn endpoint_count(&self) -> usize {
        self.instance.as_ref().map_or(0, |i| i.endpoints.len())
    }

    /// Tear down every interface, endpoint and class-driver binding
    ///
    /// For each interface in arena order the bound driver (if any) is
    /// detached first, then each of its endpoints is handed to the HCD for
    /// destruction. The record stays in the registry with its descriptor
    /// intact.
    ///
    /// Interfaces leave the arena only once fully torn down, so a release
    /// interrupted by a panicking driver resumes where it stopped on the
    /// next call. The driver that panicked is not called again.
    pub fn release<T: HcdTransport + ?Sized>(&mut self, hcd: &mut T) {
        let value = self.descriptor.value;
        let Some(instance) = self.instance.as_mut() else {
            debug!("Configuration {} has no resources to release", value);
            return;
        };

        while let Some(interface) = instance.interfaces.first_mut() {
            if let Some(binding) = interface.binding.take() {
                let context = InterfaceContext {
                    configuration: value,
                    interface: interface.number,
                    alternate_setting: interface.alternate_setting,
                    class: interface.class,
                };
                debug!(
                    "Detaching class driver '{}' from interface {}",
                    binding.driver_name(),
                    context.interface
                );
                binding.detach(&context);
            }

            let interface = instance.interfaces.remove(0);
            for index in &interface.endpoints {
                if let Some(endpoint) = instance.endpoints.get(index.0) {
                    hcd.destroy_endpoint(&endpoint.descriptor);
                }
            }
        }

        let endpoints = instance.endpoints.len();
        self.instance = None;
        debug!("Released configuration {} ({} endpoints)", value, endpoints);
    }
}

/// A device's configuration records, in insertion order
///
/// Lookup is a bounded linear scan; devices expose a handful of
/// configurations at most.
#[derive(Debug, Default)]
pub struct ConfigurationRegistry {
    records: Vec<Configuration>,
}

impl ConfigurationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; configuration values must be unique per device
    pub fn insert(&mut self, configuration: Configuration) -> Result<()> {
        let value = configuration.value();
        if self.find(value).is_some() {
            return Err(HostError::DuplicateConfiguration { value });
        }
        self.records.push(configuration);
        Ok(())
    }

    pub fn find(&self, value: u8) -> Option<&Configuration> {
        self.records.iter().find(|c| c.value() == value)
    }

    pub fn find_mut(&mut self, value: u8) -> Option<&mut Configuration> {
        self.records.iter_mut().find(|c| c.value() == value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Configuration> {
        self.records.iter()
    }

    /// Configuration values in insertion order
    pub fn values(&self) -> Vec<u8> {
        self.records.iter().map(Configuration::value).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record. Only device detach does this.
    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        MockTransport, PanickingDriver, RecordingDriver, configuration_descriptor,
    };

    #[test]
    fn test_registry_rejects_duplicate_values() {
        let mut registry = ConfigurationRegistry::new();
        registry
            .insert(Configuration::new(configuration_descriptor(1, 1)))
            .unwrap();
        let err = registry
            .insert(Configuration::new(configuration_descriptor(1, 2)))
            .unwrap_err();
        assert!(matches!(err, HostError::DuplicateConfiguration { value: 1 }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_keeps_insertion_order() {
        let mut registry = ConfigurationRegistry::new();
        for value in [3, 1, 2] {
            registry
                .insert(Configuration::new(configuration_descriptor(value, 1)))
                .unwrap();
        }
        assert_eq!(registry.values(), vec![3, 1, 2]);
        assert_eq!(registry.find(1).map(Configuration::value), Some(1));
        assert!(registry.find(9).is_none());
    }

    #[test]
    fn test_instantiate_uses_alternate_setting_zero() {
        let mut descriptor = configuration_descriptor(1, 2);
        let mut alt = descriptor.interfaces[0].clone();
        alt.alternate_setting = 1;
        alt.endpoints.push(EndpointDescriptor {
            address: 0x83,
            attributes: 0x01,
            max_packet_size: 1024,
            interval: 1,
        });
        descriptor.interfaces.push(alt);

        let mut config = Configuration::new(descriptor);
        config.instantiate();

        assert_eq!(config.interfaces().len(), 2);
        assert!(config.interfaces().iter().all(|i| i.alternate_setting == 0));
        assert_eq!(config.endpoint_count(), 4);

        let first = &config.interfaces()[0];
        let endpoint = config.endpoint(first.endpoints()[0]).unwrap();
        assert_eq!(endpoint.interface, InterfaceIndex(0));
        assert_eq!(
            config.interface(endpoint.interface).map(|i| i.number),
            Some(0)
        );
    }

    #[test]
    fn test_release_detaches_drivers_and_destroys_endpoints() {
        let mut config = Configuration::new(configuration_descriptor(2, 2));
        config.instantiate();

        let driver = RecordingDriver::new("hid");
        config
            .bind_class_driver(1, Box::new(driver.clone()))
            .unwrap();
        assert_eq!(config.interfaces()[1].bound_driver(), Some("hid"));

        let mut hcd = MockTransport::new();
        config.release(&mut hcd);

        let detached = driver.detached();
        assert_eq!(detached.len(), 1);
        assert_eq!(detached[0].configuration, 2);
        assert_eq!(detached[0].interface, 1);

        assert_eq!(hcd.destroyed_endpoints().len(), 4);
        assert!(!config.is_instantiated());
        assert!(config.interfaces().is_empty());
        assert_eq!(config.descriptor().interfaces.len(), 2);
    }

    #[test]
    fn test_release_resumes_after_driver_panic() {
        let mut config = Configuration::new(configuration_descriptor(1, 2));
        config.instantiate();
        let driver = RecordingDriver::new("cdc-data");
        config.bind_class_driver(0, Box::new(PanickingDriver)).unwrap();
        config
            .bind_class_driver(1, Box::new(driver.clone()))
            .unwrap();

        let mut hcd = MockTransport::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            config.release(&mut hcd)
        }));
        assert!(result.is_err());
        assert!(config.is_instantiated());
        assert!(hcd.destroyed_endpoints().is_empty());

        config.release(&mut hcd);

        assert!(!config.is_instantiated());
        assert_eq!(driver.detached().len(), 1);
        assert_eq!(hcd.destroyed_endpoints().len(), 4);
    }

    #[test]
    fn test_release_without_instance_is_quiet() {
        let mut config = Configuration::new(configuration_descriptor(1, 1));
        let mut hcd = MockTransport::new();
        config.release(&mut hcd);
        assert!(hcd.destroyed_endpoints().is_empty());
    }

    #[test]
    fn test_bind_requires_instance_and_interface() {
        let mut config = Configuration::new(configuration_descriptor(4, 1));
        let err = config
            .bind_class_driver(0, Box::new(RecordingDriver::new("x")))
            .unwrap_err();
        assert!(matches!(err, HostError::NotInstantiated { value: 4 }));

        config.instantiate();
        let err = config
            .bind_class_driver(5, Box::new(RecordingDriver::new("x")))
            .unwrap_err();
        assert!(matches!(
            err,
            HostError::UnknownInterface {
                configuration: 4,
                interface: 5
            }
        ));
    }

    #[test]
    fn test_endpoint_direction() {
        let endpoint = EndpointDescriptor {
            address: 0x81,
            attributes: 0x02,
            max_packet_size: 512,
            interval: 0,
        };
        assert!(endpoint.is_in());
        assert_eq!(endpoint.number(), 1);
    }
}
