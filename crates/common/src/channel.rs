//! Async channel bridge between Tokio runtime and USB thread
//!
//! The USB worker thread is the single owner of every attached device; all
//! other tasks reach a device by sending it a command over this bridge.

use async_channel::{Receiver, Sender, TrySendError, bounded};
use protocol::{CompletionStatus, DeviceId, DeviceSummary, ResetError};

/// Capacity of both the command and the event channel
const CHANNEL_CAPACITY: usize = 256;

/// Commands from Tokio runtime to USB thread
#[derive(Debug)]
pub enum UsbCommand {
    /// List all attached devices
    ListDevices {
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Vec<DeviceSummary>>,
    },

    /// Return a device to the unconfigured (ATTACHED) state
    ResetConfiguration {
        /// Device to unconfigure
        device_id: DeviceId,
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Result<(), ResetError>>,
    },

    /// Detach a device, releasing its configuration resources
    DetachDevice {
        /// Device to detach
        device_id: DeviceId,
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Result<(), ResetError>>,
    },

    /// Shutdown the USB thread gracefully
    Shutdown,
}

/// USB events from the worker thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbEvent {
    /// A configuration reset ran to the hardware request
    ConfigurationReset {
        /// Device that was unconfigured
        device_id: DeviceId,
        /// Status the transport reported for SET_CONFIGURATION(0)
        status: CompletionStatus,
    },

    /// A device was detached and its records destroyed
    DeviceDetached {
        /// ID of the removed device
        device_id: DeviceId,
    },
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct UsbBridge {
    cmd_tx: Sender<UsbCommand>,
    event_rx: Receiver<UsbEvent>,
}

impl UsbBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: UsbCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the USB thread
    pub async fn recv_event(&self) -> crate::Result<UsbEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// List attached devices through the worker
    pub async fn list_devices(&self) -> crate::Result<Vec<DeviceSummary>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send_command(UsbCommand::ListDevices { response: tx })
            .await?;
        rx.await.map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Unconfigure a device through the worker
    ///
    /// The outer error reports a broken bridge; the inner result is the
    /// outcome of the reset itself.
    pub async fn reset_configuration(
        &self,
        device_id: DeviceId,
    ) -> crate::Result<Result<(), ResetError>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send_command(UsbCommand::ResetConfiguration {
            device_id,
            response: tx,
        })
        .await?;
        rx.await.map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Detach a device through the worker
    pub async fn detach_device(&self, device_id: DeviceId) -> crate::Result<Result<(), ResetError>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send_command(UsbCommand::DetachDevice {
            device_id,
            response: tx,
        })
        .await?;
        rx.await.map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Ask the worker to stop
    pub async fn shutdown(&self) -> crate::Result<()> {
        self.send_command(UsbCommand::Shutdown).await
    }
}

/// Handle for USB thread (blocking)
pub struct UsbWorker {
    pub(crate) cmd_rx: Receiver<UsbCommand>,
    /// Event sender (public for USB worker thread to access)
    pub event_tx: Sender<UsbEvent>,
}

impl UsbWorker {
    /// Receive a command from Tokio runtime (blocking)
    pub fn recv_command(&self) -> crate::Result<UsbCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Publish an event without blocking
    ///
    /// Returns `false` when the event was dropped because nobody is draining
    /// the event channel.
    pub fn publish_event(&self, event: UsbEvent) -> bool {
        match self.event_tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Create the channel bridge between Tokio and USB thread
///
/// Returns (UsbBridge for Tokio, UsbWorker for USB thread)
pub fn create_usb_bridge() -> (UsbBridge, UsbWorker) {
    let (cmd_tx, cmd_rx) = bounded(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = bounded(CHANNEL_CAPACITY);

    (
        UsbBridge { cmd_tx, event_rx },
        UsbWorker { cmd_rx, event_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_usb_bridge();

        let handle = std::thread::spawn(move || {
            let cmd = worker.recv_command().unwrap();
            matches!(cmd, UsbCommand::ListDevices { .. })
        });

        let (tx, _rx) = tokio::sync::oneshot::channel();
        bridge
            .send_command(UsbCommand::ListDevices { response: tx })
            .await
            .unwrap();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_publish_event_drops_when_full() {
        let (_bridge, worker) = create_usb_bridge();
        let event = UsbEvent::DeviceDetached {
            device_id: DeviceId(1),
        };

        for _ in 0..CHANNEL_CAPACITY {
            assert!(worker.publish_event(event.clone()));
        }
        assert!(!worker.publish_event(event));
    }

    #[test]
    fn test_publish_event_closed() {
        let (bridge, worker) = create_usb_bridge();
        drop(bridge);
        assert!(!worker.publish_event(UsbEvent::DeviceDetached {
            device_id: DeviceId(1),
        }));
    }
}
