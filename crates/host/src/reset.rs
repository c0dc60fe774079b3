//! Configuration reset
//!
//! Returns a device to the unconfigured (ATTACHED) state:
//! 1. If CONFIGURED, find the active configuration record and release its
//!    interfaces, endpoints and class-driver bindings.
//! 2. Set the device state to ATTACHED.
//! 3. Send SET_CONFIGURATION(0) on the control endpoint and block until the
//!    transport reports completion.
//! 4. Report the transport's status unchanged.
//!
//! Step 2 commits before the hardware has acknowledged anything. A failed
//! request therefore still leaves the device ATTACHED with its resources
//! released; callers that see `ResetError::Transport` decide whether to
//! retry, re-enumerate or give up, but never assume the old configuration
//! is still usable.

use crate::control;
use crate::device::Device;
use protocol::{DeviceState, ResetError};
use tracing::{debug, info, warn};

/// Unconfigure `device`
///
/// Fails without touching the device or the bus when the device is
/// DETACHED ([`ResetError::DeviceUnavailable`]) or claims a configuration
/// value that has no record ([`ResetError::ConfigurationNotFound`]).
/// Otherwise the device is ATTACHED on return, whatever the
/// transport reported.
pub fn reset_device_configuration(device: &mut Device) -> Result<(), ResetError> {
    let Device {
        id,
        state,
        current_configuration,
        control_endpoint,
        configurations,
        hcd,
        ..
    } = device;

    if *state == DeviceState::Detached {
        debug!("{} is detached; nothing to unconfigure", id);
        return Err(ResetError::DeviceUnavailable {
            message: format!("{} is detached", id),
        });
    }

    if *state == DeviceState::Configured {
        let value = *current_configuration;
        let Some(configuration) = configurations.find_mut(value) else {
            warn!(
                "{} is CONFIGURED with value {} but has no such configuration record",
                id, value
            );
            return Err(ResetError::ConfigurationNotFound { value });
        };

        debug!("{} releasing configuration {}", id, value);
        configuration.release(hcd);
    }

    // Committed before the device has acknowledged the request
    let previous = std::mem::replace(state, DeviceState::Attached);
    *current_configuration = 0;
    debug!("{} state {:?} -> {:?}", id, previous, DeviceState::Attached);

    let status = control::unconfigure(control_endpoint, hcd);
    if status.is_success() {
        info!("{} unconfigured", id);
        Ok(())
    } else {
        warn!(
            "{} SET_CONFIGURATION(0) failed with {}; device is already ATTACHED locally",
            id, status
        );
        Err(ResetError::Transport { status })
    }
}
