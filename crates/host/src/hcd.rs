//! Host controller transport
//!
//! The host stack never touches hardware itself. Every transfer goes through
//! an [`HcdTransport`], which executes the request and reports a
//! [`CompletionStatus`]. Scheduling, DMA and timeouts are the transport's
//! business; callers block until `submit` returns.
//!
//! [`RusbTransport`] executes requests through libusb using rusb.

use crate::configuration::EndpointDescriptor;
use crate::control::TransferRequest;
use protocol::CompletionStatus;
use rusb::{DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for control transfers (5 seconds)
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport that executes transfer requests against a host controller
pub trait HcdTransport: Send {
    /// Execute `request` and block until it completes.
    ///
    /// For IN requests the transport writes received bytes into
    /// `request.data`. The returned status is recorded in the request slot
    /// by the caller.
    fn submit(&mut self, request: &mut TransferRequest) -> CompletionStatus;

    /// Free any controller state held for an endpoint being torn down
    fn destroy_endpoint(&mut self, _endpoint: &EndpointDescriptor) {}
}

impl<T: HcdTransport + ?Sized> HcdTransport for Box<T> {
    fn submit(&mut self, request: &mut TransferRequest) -> CompletionStatus {
        (**self).submit(request)
    }

    fn destroy_endpoint(&mut self, endpoint: &EndpointDescriptor) {
        (**self).destroy_endpoint(endpoint)
    }
}

/// libusb-backed transport for one opened device
pub struct RusbTransport<C: UsbContext> {
    handle: DeviceHandle<C>,
    timeout: Duration,
}

impl<C: UsbContext> RusbTransport<C> {
    pub fn new(handle: DeviceHandle<C>, timeout: Duration) -> Self {
        Self { handle, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<C: UsbContext> HcdTransport for RusbTransport<C> {
    fn submit(&mut self, request: &mut TransferRequest) -> CompletionStatus {
        let setup = request.setup_packet();
        debug!(
            "Control transfer: request_type={:#x}, request={:#x}, value={:#x}, index={:#x}, length={}",
            setup.request_type, setup.request, setup.value, setup.index, setup.length
        );

        let result = if setup.is_in() {
            let mut buffer = vec![0u8; setup.length as usize];
            self.handle
                .read_control(
                    setup.request_type,
                    setup.request,
                    setup.value,
                    setup.index,
                    &mut buffer,
                    self.timeout,
                )
                .map(|len| {
                    buffer.truncate(len);
                    request.data = buffer;
                })
        } else {
            let length = (setup.length as usize).min(request.data.len());
            self.handle
                .write_control(
                    setup.request_type,
                    setup.request,
                    setup.value,
                    setup.index,
                    &request.data[..length],
                    self.timeout,
                )
                .map(|_| ())
        };

        match result {
            Ok(()) => CompletionStatus::Success,
            Err(e) => {
                warn!("Control transfer failed: {}", e);
                map_rusb_error(e)
            }
        }
    }
}

/// Map rusb::Error to the transport completion status
pub fn map_rusb_error(err: rusb::Error) -> CompletionStatus {
    match err {
        rusb::Error::Pipe => CompletionStatus::Stall,
        rusb::Error::Timeout => CompletionStatus::Timeout,
        rusb::Error::Io | rusb::Error::Overflow => CompletionStatus::TransactionError,
        rusb::Error::NoDevice => CompletionStatus::NoDevice,
        _ => CompletionStatus::Other {
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Pipe), CompletionStatus::Stall);
        assert_eq!(map_rusb_error(rusb::Error::Timeout), CompletionStatus::Timeout);
        assert_eq!(
            map_rusb_error(rusb::Error::Io),
            CompletionStatus::TransactionError
        );
        assert_eq!(
            map_rusb_error(rusb::Error::Overflow),
            CompletionStatus::TransactionError
        );
        assert_eq!(
            map_rusb_error(rusb::Error::NoDevice),
            CompletionStatus::NoDevice
        );
        assert!(matches!(
            map_rusb_error(rusb::Error::Access),
            CompletionStatus::Other { .. }
        ));
    }
}
