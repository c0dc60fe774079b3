//! Test utilities for the host stack
//!
//! Provides a scriptable mock transport, a class driver that records detach
//! notifications, and descriptor builders.
//!
//! # Example
//!
//! ```
//! use host::test_utils::{MockTransport, configured_device};
//! use protocol::{CompletionStatus, DeviceState};
//!
//! let hcd = MockTransport::with_statuses([CompletionStatus::Stall]);
//! let mut device = configured_device(&hcd, &[1, 2], 2);
//!
//! let result = device.reset_configuration();
//! assert!(result.is_err());
//! assert_eq!(device.state(), DeviceState::Attached);
//! assert_eq!(hcd.submitted().len(), 1);
//! ```

use crate::class_driver::{ClassDriver, InterfaceContext};
use crate::configuration::{
    Configuration, ConfigurationDescriptor, EndpointDescriptor, InterfaceDescriptor,
};
use crate::control::TransferRequest;
use crate::device::Device;
use crate::hcd::HcdTransport;
use protocol::{CompletionStatus, SetupPacket};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    statuses: VecDeque<CompletionStatus>,
    submitted: Vec<SetupPacket>,
    destroyed: Vec<EndpointDescriptor>,
}

/// Transport that records requests and replays scripted statuses
///
/// Clones share state, so a test can keep one clone while the device owns
/// another. Once the script runs out every submission succeeds.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    latency: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `statuses` in order, then `Success`
    pub fn with_statuses(statuses: impl IntoIterator<Item = CompletionStatus>) -> Self {
        let transport = Self::new();
        transport.lock().statuses.extend(statuses);
        transport
    }

    /// Block every submission for `latency` before completing it
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Setup packets submitted so far, oldest first
    pub fn submitted(&self) -> Vec<SetupPacket> {
        self.lock().submitted.clone()
    }

    /// Endpoints handed to `destroy_endpoint`, oldest first
    pub fn destroyed_endpoints(&self) -> Vec<EndpointDescriptor> {
        self.lock().destroyed.clone()
    }

    /// Highest number of submissions observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HcdTransport for MockTransport {
    fn submit(&mut self, request: &mut TransferRequest) -> CompletionStatus {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let status = {
            let mut state = self.lock();
            state.submitted.push(request.setup_packet());
            state
                .statuses
                .pop_front()
                .unwrap_or(CompletionStatus::Success)
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        status
    }

    fn destroy_endpoint(&mut self, endpoint: &EndpointDescriptor) {
        self.lock().destroyed.push(*endpoint);
    }
}

/// Class driver that records every detach notification
#[derive(Debug, Clone)]
pub struct RecordingDriver {
    name: String,
    detached: Arc<Mutex<Vec<InterfaceContext>>>,
}

impl RecordingDriver {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            detached: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Interfaces this driver has been detached from
    pub fn detached(&self) -> Vec<InterfaceContext> {
        self.detached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ClassDriver for RecordingDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn detach(&mut self, interface: &InterfaceContext) {
        self.detached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*interface);
    }
}

/// Class driver that panics when detached
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingDriver;

impl ClassDriver for PanickingDriver {
    fn name(&self) -> &str {
        "panicking"
    }

    fn detach(&mut self, interface: &InterfaceContext) {
        panic!("class driver failed to detach from interface {}", interface.interface);
    }
}

/// Configuration descriptor with `interfaces` vendor-class interfaces,
/// each carrying one bulk IN and one bulk OUT endpoint
pub fn configuration_descriptor(value: u8, interfaces: u8) -> ConfigurationDescriptor {
    ConfigurationDescriptor {
        value,
        attributes: 0x80,
        max_power_ma: 100,
        interfaces: (0..interfaces)
            .map(|number| InterfaceDescriptor {
                number,
                alternate_setting: 0,
                class: 0xFF,
                subclass: 0,
                protocol: 0,
                endpoints: vec![
                    EndpointDescriptor {
                        address: 0x81 + number,
                        attributes: 0x02,
                        max_packet_size: 512,
                        interval: 0,
                    },
                    EndpointDescriptor {
                        address: 0x01 + number,
                        attributes: 0x02,
                        max_packet_size: 512,
                        interval: 0,
                    },
                ],
            })
            .collect(),
    }
}

/// ATTACHED device with one single-interface record per value
pub fn device_with_configurations(hcd: &MockTransport, values: &[u8]) -> Device {
    let mut device = Device::new(0x1209, 0x0001, Box::new(hcd.clone()));
    for &value in values {
        // Duplicate values in test input are skipped rather than reported
        let _ = device.add_configuration(Configuration::new(configuration_descriptor(value, 1)));
    }
    device
}

/// Device CONFIGURED with `active`
///
/// Falls back to an ATTACHED device when `active` is not among `values`.
pub fn configured_device(hcd: &MockTransport, values: &[u8], active: u8) -> Device {
    let mut device = device_with_configurations(hcd, values);
    device.mark_addressed(1, 2);
    let _ = device.mark_configured(active);
    device
}
