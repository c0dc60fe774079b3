//! Class-driver bindings
//!
//! A class driver (HID, mass storage, ...) is bound to one interface of the
//! active configuration. Binding logic lives with the drivers; the host stack
//! only holds the binding and tells the driver when its interface goes away.

use std::fmt;

/// The interface a class driver is being detached from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceContext {
    /// bConfigurationValue of the owning configuration
    pub configuration: u8,
    /// bInterfaceNumber
    pub interface: u8,
    /// bAlternateSetting that was active
    pub alternate_setting: u8,
    /// bInterfaceClass
    pub class: u8,
}

/// Contract a class driver implements to be bound to an interface
pub trait ClassDriver: Send {
    /// Short driver name for logging
    fn name(&self) -> &str;

    /// The interface is being torn down; release everything tied to it.
    ///
    /// Called exactly once per binding.
    fn detach(&mut self, interface: &InterfaceContext);
}

/// A class driver bound to an interface instance
pub struct ClassBinding {
    driver: Box<dyn ClassDriver>,
}

impl ClassBinding {
    pub fn new(driver: Box<dyn ClassDriver>) -> Self {
        Self { driver }
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    /// Notify the driver and drop the binding
    pub fn detach(mut self, interface: &InterfaceContext) {
        self.driver.detach(interface);
    }
}

impl fmt::Debug for ClassBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassBinding")
            .field("driver", &self.driver.name())
            .finish()
    }
}
