//! Capabilities handed to drivers during bind.

use crate::{
    chrdev::{ChrdevConfig, ChrdevTable},
    iio::IioRegistry,
    spi::SpiBus,
};
use alloc::sync::Arc;

/// Subsystems a driver may acquire resources from.
///
/// Cloning is cheap; every clone refers to the same subsystems.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    /// Device numbers, classes, cdevs and nodes.
    pub chrdev: Arc<ChrdevTable>,
    /// Registered SPI controllers.
    pub spi: Arc<SpiBus>,
    pub iio: Arc<IioRegistry>,
}

impl ProbeContext {
    pub fn new(chrdev: ChrdevConfig) -> ProbeContext {
        ProbeContext {
            chrdev: Arc::new(ChrdevTable::new(chrdev)),
            spi: Arc::new(SpiBus::new()),
            iio: Arc::new(IioRegistry::new()),
        }
    }
}

impl Default for ProbeContext {
    fn default() -> Self {
        Self::new(ChrdevConfig::default())
    }
}
