//! Test utilities for usb-unconfigure
//!
//! Provides mock values and helper functions for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::create_mock_summary;
//! use protocol::DeviceState;
//!
//! let summary = create_mock_summary(1, 0x1234, 0x5678);
//! assert_eq!(summary.vendor_id, 0x1234);
//! assert_eq!(summary.state, DeviceState::Attached);
//! ```

use protocol::{DeviceId, DeviceState, DeviceSummary};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock DeviceSummary for an unconfigured device
pub fn create_mock_summary(id: u32, vendor_id: u16, product_id: u16) -> DeviceSummary {
    DeviceSummary {
        id: DeviceId(id),
        vendor_id,
        product_id,
        bus_number: 1,
        device_address: (id % 128) as u8,
        state: DeviceState::Attached,
        active_configuration: None,
        configurations: vec![1],
    }
}

/// Create a mock DeviceSummary for a configured device
pub fn create_mock_configured_summary(id: u32, configurations: &[u8], active: u8) -> DeviceSummary {
    DeviceSummary {
        state: DeviceState::Configured,
        active_configuration: Some(active),
        configurations: configurations.to_vec(),
        ..create_mock_summary(id, 0x1000 + id as u16, 0x2000 + id as u16)
    }
}

/// Create a list of mock summaries
pub fn create_mock_summary_list(count: u32) -> Vec<DeviceSummary> {
    (1..=count)
        .map(|i| create_mock_summary(i, 0x1000 + (i as u16), 0x2000 + (i as u16)))
        .collect()
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
