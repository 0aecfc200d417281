//! Bundled drivers.

pub mod iio_sim;
pub mod platform_char;
pub mod spi_client;
pub mod spi_master;

use crate::{dev::registry::DriverRegistry, debug_ex, error::DriverError};
use alloc::sync::Arc;

/// Register every bundled driver with its default match keys.
///
/// Controller drivers go first so clients announced later find their bus.
pub fn register_drivers(registry: &DriverRegistry) -> Result<(), DriverError> {
    debug_ex!("Registering drivers...");
    registry.register_driver(Arc::new(spi_master::FooSpiMasterDriver))?;
    registry.register_driver(Arc::new(spi_client::FooSpiClientDriver))?;
    registry.register_driver(Arc::new(platform_char::PlatformCharDriver::new()))?;
    registry.register_driver(Arc::new(iio_sim::IioSimDriver))?;
    debug_ex!("Drivers registered.");
    Ok(())
}
