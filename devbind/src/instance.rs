//! Standalone device instances.
//!
//! A [StandaloneInstance] announces a bare device with no hardware behind it, only so that a
//! registered driver gets bound. [StandaloneInstance::start] returns the owning handle and
//! [StandaloneInstance::stop] consumes it; dropping a started instance stops it too.

use crate::{
    dev::{
        device::{BusType, Device, DeviceId},
        registry::{BindingRef, DriverRegistry},
    },
    error::DriverError,
};
use alloc::{boxed::Box, collections::btree_map::BTreeMap, sync::Arc};
use config::build_flags::INSTANCE_MAX_IDS;
use core::fmt;
use log::{info, warn};
use spin::Mutex;
use utils::range_set::SortedRangeSet;

/// Platform character device instance.
pub const DUMMY_CHAR: &str = "platform-dummy-char";
/// Simulated IIO device instance.
pub const FAKE_IIO: &str = "iio-dummy-random";

/// Instance indices, allocated per device name from `0..capacity`.
pub struct InstanceIds {
    capacity: usize,
    free: Mutex<BTreeMap<Box<str>, SortedRangeSet>>,
}

impl InstanceIds {
    pub fn new() -> InstanceIds {
        Self::with_capacity(INSTANCE_MAX_IDS)
    }

    pub fn with_capacity(capacity: usize) -> InstanceIds {
        InstanceIds {
            capacity,
            free: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn alloc(&self, name: &str) -> Result<u32, DriverError> {
        let mut guard = self.free.lock();
        let set = guard
            .entry(Box::from(name))
            .or_insert_with(|| SortedRangeSet::from_range(0..self.capacity));
        set.take(1)
            .map(|x| x as u32)
            .ok_or(DriverError::AllocationFailed)
    }

    pub fn release(&self, name: &str, id: u32) {
        if let Some(set) = self.free.lock().get_mut(name) {
            set.add(id as usize..id as usize + 1);
        }
    }

    /// Indices of `name` still free.
    pub fn available(&self, name: &str) -> usize {
        self.free.lock().get(name).map_or(self.capacity, |x| x.len())
    }
}

impl Default for InstanceIds {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StandaloneInstance {
    registry: Arc<DriverRegistry>,
    ids: Arc<InstanceIds>,
    bus: BusType,
    id: DeviceId,
    binding: Option<BindingRef>,
    stopped: bool,
}

impl StandaloneInstance {
    /// Allocate an index for `name` and announce the device on `bus`.
    ///
    /// The device is added even when no driver binds it; bind errors are logged and leave it
    /// waiting for a driver. Fails with [DriverError::AllocationFailed] when `name` has no free
    /// index, or with the registry's error when the device cannot be added at all; the index
    /// is given back in both cases.
    pub fn start(
        registry: &Arc<DriverRegistry>,
        ids: &Arc<InstanceIds>,
        bus: BusType,
        name: &str,
    ) -> Result<StandaloneInstance, DriverError> {
        let index = ids.alloc(name)?;
        let dev = Device::new(bus, name, Some(index));
        let id = dev.id.clone();
        let binding = match registry.on_device_appeared(dev) {
            Ok(binding) => Some(binding),
            Err(DriverError::InvalidState) => {
                ids.release(name, index);
                warn!("Failed to add device '{}'.", id);
                return Err(DriverError::InvalidState);
            }
            Err(err) => {
                warn!("Device '{}' added without a driver: {}.", id, err);
                None
            }
        };
        info!("{} device added.", id);
        Ok(StandaloneInstance {
            registry: registry.clone(),
            ids: ids.clone(),
            bus,
            id,
            binding,
            stopped: false,
        })
    }

    pub fn dummy_char(registry: &Arc<DriverRegistry>, ids: &Arc<InstanceIds>) -> Result<StandaloneInstance, DriverError> {
        Self::start(registry, ids, BusType::Platform, DUMMY_CHAR)
    }

    pub fn fake_iio(registry: &Arc<DriverRegistry>, ids: &Arc<InstanceIds>) -> Result<StandaloneInstance, DriverError> {
        Self::start(registry, ids, BusType::Platform, FAKE_IIO)
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.id
    }

    /// Whether a driver is bound to the device right now.
    pub fn is_bound(&self) -> bool {
        self.registry.binding(self.bus, &self.id).is_some()
    }

    /// Binding made when the device was announced, if any. Dead once it is unbound.
    pub fn binding(&self) -> Option<&BindingRef> {
        self.binding.as_ref()
    }

    /// Remove the device, then give back its index.
    pub fn stop(mut self) -> Result<(), DriverError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), DriverError> {
        self.stopped = true;
        self.binding = None;
        let res = self.registry.on_device_removed(self.bus, &self.id);
        if let Some(index) = self.id.instance {
            self.ids.release(&self.id.name, index);
        }
        info!("{} device removed.", self.id);
        res
    }
}

impl Drop for StandaloneInstance {
    fn drop(&mut self) {
        if !self.stopped {
            warn!("Instance '{}' dropped while started; stopping.", self.id);
            let _ = self.teardown();
        }
    }
}

impl fmt::Debug for StandaloneInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandaloneInstance")
            .field("bus", &self.bus)
            .field("id", &self.id)
            .field("stopped", &self.stopped)
            .finish()
    }
}
