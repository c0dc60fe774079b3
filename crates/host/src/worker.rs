//! USB worker thread
//!
//! Dedicated thread that owns the [`DeviceManager`]. Async callers reach
//! devices only by sending commands through the channel bridge, so every
//! device operation runs on this one thread, one command at a time.
//! Blocking hardware round trips stay off the Tokio runtime.

use crate::manager::DeviceManager;
use common::{UsbCommand, UsbEvent, UsbWorker};
use protocol::{CompletionStatus, ResetError};
use tracing::{debug, error, info, warn};

/// USB worker thread
pub struct UsbWorkerThread {
    /// Registry of attached devices
    manager: DeviceManager,
    /// Communication channel with Tokio runtime
    worker: UsbWorker,
}

impl UsbWorkerThread {
    pub fn new(worker: UsbWorker, manager: DeviceManager) -> Self {
        Self { manager, worker }
    }

    /// Serve commands until Shutdown arrives or every bridge handle is gone
    ///
    /// Returns the manager so the caller can inspect or reuse it.
    pub fn run(mut self) -> DeviceManager {
        info!(
            "USB worker thread started with {} devices",
            self.manager.len()
        );

        loop {
            match self.worker.recv_command() {
                Ok(UsbCommand::Shutdown) => {
                    info!("USB worker shutting down");
                    break;
                }
                Ok(cmd) => self.handle_command(cmd),
                Err(e) => {
                    debug!("Command channel closed: {}", e);
                    break;
                }
            }
        }

        info!("USB worker thread stopped");
        self.manager
    }

    /// Handle a command from the Tokio runtime
    fn handle_command(&mut self, cmd: UsbCommand) {
        // A panicking class driver must not take the worker down with it
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("Panic in USB command handler: {:?}", e);
        }
    }

    fn handle_command_inner(&mut self, cmd: UsbCommand) {
        match cmd {
            UsbCommand::ListDevices { response } => {
                let devices = self.manager.list_devices();
                debug!("Listing {} devices", devices.len());
                let _ = response.send(devices);
            }

            UsbCommand::ResetConfiguration {
                device_id,
                response,
            } => {
                debug!("Resetting configuration of {}", device_id);
                let result = self.manager.reset_configuration(device_id);

                let status = match &result {
                    Ok(()) => Some(CompletionStatus::Success),
                    Err(ResetError::Transport { status }) => Some(status.clone()),
                    Err(_) => None,
                };
                if let Some(status) = status
                    && !self.worker.publish_event(UsbEvent::ConfigurationReset { device_id, status })
                {
                    debug!("ConfigurationReset event for {} dropped", device_id);
                }

                let _ = response.send(result);
            }

            UsbCommand::DetachDevice {
                device_id,
                response,
            } => {
                debug!("Detaching {}", device_id);
                let result = self.manager.detach_device(device_id);
                if result.is_ok() && !self.worker.publish_event(UsbEvent::DeviceDetached { device_id })
                {
                    debug!("DeviceDetached event for {} dropped", device_id);
                }
                let _ = response.send(result);
            }

            UsbCommand::Shutdown => {
                // Handled in run()
                warn!("Shutdown reached the command handler");
            }
        }
    }
}

/// Spawn the USB worker thread
///
/// The thread runs until a Shutdown command is received or the bridge is
/// dropped, then hands back the manager through the join handle.
pub fn spawn_usb_worker(
    worker: UsbWorker,
    manager: DeviceManager,
) -> std::io::Result<std::thread::JoinHandle<DeviceManager>> {
    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || UsbWorkerThread::new(worker, manager).run())
}
