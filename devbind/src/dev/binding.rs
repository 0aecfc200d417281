//! One driver-to-device binding and everything it acquired.

use crate::{
    chrdev::{
        ChrdevTable,
        endpoint::{CharDeviceEndpoint, EndpointSpec},
        file::FileOperations,
    },
    dev::device::DeviceId,
    error::DriverError,
    spi::transfer::TransferChannel,
};
use alloc::{boxed::Box, sync::Arc};
use core::{
    any::Any,
    fmt::{self, Debug},
};
use log::debug;
use spin::Mutex;
use utils::ledger::{ReleaseResult, ResourceLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Bind in progress, or torn down.
    Unbound,
    Bound,
}

/// Resources a driver holds for one device.
///
/// Every acquisition goes on the binding's ledger, so a failed bind and a normal removal
/// both end in [BusBinding::release_all].
pub struct BusBinding {
    driver: &'static str,
    device: DeviceId,
    ledger: ResourceLedger,
    endpoint: Option<CharDeviceEndpoint>,
    channel: Option<Arc<Mutex<TransferChannel>>>,
    drvdata: Option<Box<dyn Any + Send + Sync>>,
    state: BindingState,
}

impl BusBinding {
    pub fn new(driver: &'static str, device: DeviceId) -> BusBinding {
        BusBinding {
            driver,
            device,
            ledger: ResourceLedger::new(),
            endpoint: None,
            channel: None,
            drvdata: None,
            state: BindingState::Unbound,
        }
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn is_bound(&self) -> bool {
        self.state == BindingState::Bound
    }

    pub(crate) fn mark_bound(&mut self) {
        self.state = BindingState::Bound;
    }

    /// Record an undo step for something acquired outside the character-device path.
    pub fn on_release(&mut self, label: &'static str, action: impl FnOnce() -> ReleaseResult + Send + 'static) {
        self.ledger.push(label, action);
    }

    /// Set up the binding's character endpoint. A binding owns at most one.
    pub fn acquire_endpoint(
        &mut self,
        table: &Arc<ChrdevTable>,
        spec: EndpointSpec<'_>,
        ops: Arc<dyn FileOperations>,
    ) -> Result<&CharDeviceEndpoint, DriverError> {
        if self.endpoint.is_some() {
            return Err(DriverError::InvalidState);
        }
        let ep = CharDeviceEndpoint::acquire(table, &mut self.ledger, spec, ops)?;
        Ok(self.endpoint.insert(ep))
    }

    pub fn endpoint(&self) -> Option<&CharDeviceEndpoint> {
        self.endpoint.as_ref()
    }

    /// Take ownership of the binding's transfer channel. A binding owns at most one.
    pub fn attach_channel(&mut self, channel: TransferChannel) -> Result<Arc<Mutex<TransferChannel>>, DriverError> {
        if self.channel.is_some() {
            return Err(DriverError::InvalidState);
        }
        let channel = Arc::new(Mutex::new(channel));
        self.channel = Some(channel.clone());
        Ok(channel)
    }

    pub fn channel(&self) -> Option<&Arc<Mutex<TransferChannel>>> {
        self.channel.as_ref()
    }

    /// Attach driver-private data (`*_set_drvdata`).
    pub fn set_drvdata<T: Any + Send + Sync>(&mut self, data: T) {
        self.drvdata = Some(Box::new(data));
    }

    pub fn drvdata<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.drvdata.as_ref()?.downcast_ref::<T>()
    }

    /// Undo steps not yet run.
    pub fn pending_releases(&self) -> usize {
        self.ledger.len()
    }

    /// Unwind every recorded acquisition, newest first, and drop what the binding owns.
    ///
    /// Return the number of release actions run. Calling it again returns 0.
    pub fn release_all(&mut self) -> usize {
        let count = match self.endpoint.take() {
            Some(ep) => ep.release(&mut self.ledger),
            None => self.ledger.unwind_all(),
        };
        self.channel = None;
        self.drvdata = None;
        self.state = BindingState::Unbound;
        debug!("Binding {} <-> {} released {} resource(s).", self.driver, self.device, count);
        count
    }
}

impl Debug for BusBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusBinding")
            .field("driver", &self.driver)
            .field("device", &self.device)
            .field("state", &self.state)
            .field("ledger", &self.ledger)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chrdev::ChrdevConfig;

    struct Nop;
    impl FileOperations for Nop {}

    const SPEC: EndpointSpec<'static> = EndpointSpec {
        device_name: "dev",
        class_name: "cls",
        node_name: "dev0",
    };

    fn table() -> Arc<ChrdevTable> {
        Arc::new(ChrdevTable::new(ChrdevConfig {
            majors: 240..244,
            max_classes: 4,
        }))
    }

    #[test]
    fn release_all_covers_endpoint_and_extra_steps() {
        let table = table();
        let mut binding = BusBinding::new("drv", DeviceId::new("dev", Some(0)));
        binding.on_release("extra", || Ok(()));
        binding.acquire_endpoint(&table, SPEC, Arc::new(Nop)).unwrap();
        assert_eq!(
            binding.acquire_endpoint(&table, SPEC, Arc::new(Nop)).err(),
            Some(DriverError::InvalidState)
        );
        binding.set_drvdata(7u32);
        binding.mark_bound();
        assert_eq!(binding.drvdata::<u32>(), Some(&7));
        assert_eq!(binding.drvdata::<u8>(), None);
        assert_eq!(binding.pending_releases(), 5);
        assert_eq!(binding.release_all(), 5);
        assert!(!binding.is_bound());
        assert!(binding.endpoint().is_none());
        assert_eq!(table.node_count(), 0);
        assert_eq!(binding.release_all(), 0);
    }
}
