//! Device discovery through libusb
//!
//! Builds [`Device`] records for the devices libusb can see: the
//! configuration registry comes from the cached configuration descriptors,
//! and a device the OS already configured is recorded as CONFIGURED with its
//! active configuration instantiated.

use crate::config::{DeviceFilter, is_device_allowed};
use crate::configuration::{
    Configuration, ConfigurationDescriptor, EndpointDescriptor, InterfaceDescriptor,
};
use crate::control::ControlEndpoint;
use crate::device::Device;
use crate::error::Result;
use crate::hcd::RusbTransport;
use rusb::{SyncType, TransferType, UsageType, UsbContext};
use std::time::Duration;
use tracing::{debug, warn};

/// Root hubs are VID 0x1d6b (Linux Foundation) with device class 9 (Hub)
const ROOT_HUB_VENDOR_ID: u16 = 0x1d6b;
const HUB_CLASS: u8 = 0x09;

/// Build a record for every reachable device admitted by `filters`
///
/// Devices that cannot be opened are skipped with a warning.
pub fn enumerate_devices<T: UsbContext + 'static>(
    context: &T,
    filters: &[DeviceFilter],
    control_timeout: Duration,
) -> Result<Vec<Device>> {
    let mut records = Vec::new();

    for device in context.devices()?.iter() {
        let bus = device.bus_number();
        let address = device.address();

        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                warn!("No device descriptor for bus={}, addr={}: {}", bus, address, e);
                continue;
            }
        };

        if descriptor.vendor_id() == ROOT_HUB_VENDOR_ID && descriptor.class_code() == HUB_CLASS {
            debug!("Skipping root hub: bus={}, addr={}", bus, address);
            continue;
        }

        if !is_device_allowed(filters, descriptor.vendor_id(), descriptor.product_id()) {
            debug!(
                "Device ignored by filter: bus={}, addr={}, vid={:#06x}, pid={:#06x}",
                bus,
                address,
                descriptor.vendor_id(),
                descriptor.product_id()
            );
            continue;
        }

        match build_device(&device, &descriptor, control_timeout) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping device bus={}, addr={}: {}", bus, address, e),
        }
    }

    debug!("Enumerated {} devices", records.len());
    Ok(records)
}

fn build_device<T: UsbContext + 'static>(
    device: &rusb::Device<T>,
    descriptor: &rusb::DeviceDescriptor,
    control_timeout: Duration,
) -> Result<Device> {
    let handle = device.open()?;
    let active = handle.active_configuration().unwrap_or(0);

    let mut record = Device::new(
        descriptor.vendor_id(),
        descriptor.product_id(),
        Box::new(RusbTransport::new(handle, control_timeout)),
    )
    .with_control_endpoint(ControlEndpoint::new(descriptor.max_packet_size()));

    for index in 0..descriptor.num_configurations() {
        match device.config_descriptor(index) {
            Ok(config) => record.add_configuration(Configuration::new(convert_config(&config)))?,
            Err(e) => warn!("Failed to read configuration descriptor {}: {}", index, e),
        }
    }

    record.mark_addressed(device.bus_number(), device.address());
    if active != 0 {
        record.mark_configured(active)?;
    }

    Ok(record)
}

fn convert_config(config: &rusb::ConfigDescriptor) -> ConfigurationDescriptor {
    let interfaces = config
        .interfaces()
        .flat_map(|interface| {
            interface
                .descriptors()
                .map(|alt| InterfaceDescriptor {
                    number: alt.interface_number(),
                    alternate_setting: alt.setting_number(),
                    class: alt.class_code(),
                    subclass: alt.sub_class_code(),
                    protocol: alt.protocol_code(),
                    endpoints: alt
                        .endpoint_descriptors()
                        .map(|ep| EndpointDescriptor {
                            address: ep.address(),
                            attributes: endpoint_attributes(
                                ep.transfer_type(),
                                ep.sync_type(),
                                ep.usage_type(),
                            ),
                            max_packet_size: ep.max_packet_size(),
                            interval: ep.interval(),
                        })
                        .collect(),
                })
                .collect::<Vec<_>>()
        })
        .collect();

    ConfigurationDescriptor {
        value: config.number(),
        attributes: config_attributes(config.self_powered(), config.remote_wakeup()),
        max_power_ma: config.max_power(),
        interfaces,
    }
}

/// Rebuild bmAttributes of a configuration descriptor (bit 7 is reserved, set)
fn config_attributes(self_powered: bool, remote_wakeup: bool) -> u8 {
    0x80 | (u8::from(self_powered) << 6) | (u8::from(remote_wakeup) << 5)
}

/// Rebuild bmAttributes of an endpoint descriptor
fn endpoint_attributes(transfer: TransferType, sync: SyncType, usage: UsageType) -> u8 {
    let transfer = match transfer {
        TransferType::Control => 0,
        TransferType::Isochronous => 1,
        TransferType::Bulk => 2,
        TransferType::Interrupt => 3,
    };
    let sync = match sync {
        SyncType::NoSync => 0,
        SyncType::Asynchronous => 1,
        SyncType::Adaptive => 2,
        SyncType::Synchronous => 3,
    };
    let usage = match usage {
        UsageType::Data => 0,
        UsageType::Feedback => 1,
        UsageType::FeedbackData => 2,
        UsageType::Reserved => 3,
    };
    transfer | (sync << 2) | (usage << 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_attributes() {
        assert_eq!(config_attributes(false, false), 0x80);
        assert_eq!(config_attributes(true, false), 0xC0);
        assert_eq!(config_attributes(true, true), 0xE0);
    }

    #[test]
    fn test_endpoint_attributes() {
        assert_eq!(
            endpoint_attributes(TransferType::Bulk, SyncType::NoSync, UsageType::Data),
            0x02
        );
        assert_eq!(
            endpoint_attributes(TransferType::Interrupt, SyncType::NoSync, UsageType::Data),
            0x03
        );
        assert_eq!(
            endpoint_attributes(
                TransferType::Isochronous,
                SyncType::Asynchronous,
                UsageType::Feedback
            ),
            0x15
        );
    }
}
