//! Control endpoint and control transfer issuing
//!
//! Every device has exactly one control endpoint, and that endpoint has
//! exactly one [`TransferRequest`] slot that every control transfer reuses.
//! Filling and submitting the slot needs `&mut ControlEndpoint`, so two
//! requests can never be in flight on the same endpoint.

use crate::hcd::HcdTransport;
use protocol::{CompletionStatus, SetupPacket, UNCONFIGURED_VALUE};
use tracing::{debug, warn};

/// Default bMaxPacketSize0 until the device descriptor says otherwise
pub const DEFAULT_MAX_PACKET_SIZE: u8 = 64;

/// Reusable control transfer request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferRequest {
    /// Direction, type and recipient bits (bmRequestType)
    pub request_type: u8,
    /// Request code (bRequest)
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
    /// Requested data stage length (wLength)
    pub requested_length: u16,
    /// Data stage buffer
    pub data: Vec<u8>,
    /// Status of the last completed submission
    pub status: Option<CompletionStatus>,
}

impl TransferRequest {
    /// The setup stage this request describes
    pub fn setup_packet(&self) -> SetupPacket {
        SetupPacket {
            request_type: self.request_type,
            request: self.request,
            value: self.value,
            index: self.index,
            length: self.requested_length,
        }
    }

    fn prepare(&mut self, setup: SetupPacket) {
        self.request_type = setup.request_type;
        self.request = setup.request;
        self.value = setup.value;
        self.index = setup.index;
        self.requested_length = setup.length;
        self.data.clear();
        self.status = None;
    }
}

/// The device's default control pipe (endpoint 0)
#[derive(Debug, Clone)]
pub struct ControlEndpoint {
    max_packet_size: u8,
    request: TransferRequest,
}

impl ControlEndpoint {
    pub fn new(max_packet_size: u8) -> Self {
        Self {
            max_packet_size,
            request: TransferRequest::default(),
        }
    }

    pub fn max_packet_size(&self) -> u8 {
        self.max_packet_size
    }

    /// The request slot as left by the last submission
    pub fn request(&self) -> &TransferRequest {
        &self.request
    }

    /// Load `setup` into the slot, submit it, and record the status
    ///
    /// Blocks until the transport reports completion. No retry.
    pub fn submit<T: HcdTransport + ?Sized>(
        &mut self,
        hcd: &mut T,
        setup: SetupPacket,
    ) -> CompletionStatus {
        self.request.prepare(setup);
        let status = hcd.submit(&mut self.request);
        self.request.status = Some(status.clone());
        status
    }
}

impl Default for ControlEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKET_SIZE)
    }
}

/// Issue SET_CONFIGURATION(0) on the control endpoint
///
/// bmRequestType 0x00, bRequest SET_CONFIGURATION, wValue 0, wIndex 0,
/// wLength 0, no data stage. The transport's status is returned unchanged.
pub fn unconfigure<T: HcdTransport + ?Sized>(
    endpoint: &mut ControlEndpoint,
    hcd: &mut T,
) -> CompletionStatus {
    debug!("Submitting SET_CONFIGURATION({})", UNCONFIGURED_VALUE);
    let status = endpoint.submit(hcd, SetupPacket::set_configuration(UNCONFIGURED_VALUE));
    if !status.is_success() {
        warn!("SET_CONFIGURATION({}) completed with {}", UNCONFIGURED_VALUE, status);
    }
    status
}
