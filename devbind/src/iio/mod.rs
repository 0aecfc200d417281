//! Industrial I/O devices: channel descriptions and the device registry.
//!
//! Only direct-mode reads and writes are modeled; scan buffers and triggers are not.

use crate::error::DriverError;
use alloc::{boxed::Box, collections::btree_map::BTreeMap, sync::Arc, vec::Vec};
use bitflags::bitflags;
use config::build_flags::IIO_MAX_DEVICES;
use core::fmt::{self, Debug};
use log::info;
use spin::Mutex;
use utils::{ledger::ReleaseResult, range_set::SortedRangeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Voltage,
    Current,
    Temp,
}

/// Attribute selected by a raw read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanInfo {
    Raw,
    Processed,
    Scale,
    Offset,
}

bitflags! {
    pub struct InfoMask: u32 {
        const RAW       = 1 << 0;
        const PROCESSED = 1 << 1;
        const SCALE     = 1 << 2;
        const OFFSET    = 1 << 3;
    }
}

impl ChanInfo {
    pub fn mask(self) -> InfoMask {
        match self {
            ChanInfo::Raw => InfoMask::RAW,
            ChanInfo::Processed => InfoMask::PROCESSED,
            ChanInfo::Scale => InfoMask::SCALE,
            ChanInfo::Offset => InfoMask::OFFSET,
        }
    }
}

bitflags! {
    pub struct IioModes: u32 {
        const DIRECT            = 0x01;
        const BUFFER_TRIGGERED  = 0x02;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChanSpec {
    pub chan_type: ChannelType,
    pub indexed: bool,
    pub channel: u32,
    pub address: u32,
    /// Attributes private to this channel.
    pub info_mask_separate: InfoMask,
    /// Attributes shared by every channel of the same type.
    pub info_mask_shared_by_type: InfoMask,
}

impl ChanSpec {
    /// Indexed voltage channel with a private raw value and a scale shared by type.
    pub const fn voltage(num: u32) -> ChanSpec {
        ChanSpec {
            chan_type: ChannelType::Voltage,
            indexed: true,
            channel: num,
            address: num,
            info_mask_separate: InfoMask::RAW,
            info_mask_shared_by_type: InfoMask::SCALE,
        }
    }

    pub fn supports(&self, info: ChanInfo) -> bool {
        (self.info_mask_separate | self.info_mask_shared_by_type).contains(info.mask())
    }
}

/// Value pair returned by a raw read, e.g. integer and micro parts.
pub type IioValue = (i32, i32);

/// Device callbacks.
pub trait IioInfo: Send + Sync {
    fn read_raw(&self, chan: &ChanSpec, info: ChanInfo) -> Result<IioValue, DriverError>;
    fn write_raw(&self, chan: &ChanSpec, val: IioValue, info: ChanInfo) -> Result<(), DriverError>;
}

pub struct IioDevice {
    pub name: Box<str>,
    pub modes: IioModes,
    pub channels: Vec<ChanSpec>,
    pub available_scan_masks: Vec<u64>,
    pub info: Box<dyn IioInfo>,
}

impl IioDevice {
    fn channel(&self, index: u32) -> Result<&ChanSpec, DriverError> {
        self.channels
            .iter()
            .find(|x| x.channel == index)
            .ok_or(DriverError::InvalidArgument)
    }

    pub fn read_raw(&self, channel: u32, info: ChanInfo) -> Result<IioValue, DriverError> {
        let chan = self.channel(channel)?;
        if !self.modes.contains(IioModes::DIRECT) || !chan.supports(info) {
            return Err(DriverError::InvalidArgument);
        }
        self.info.read_raw(chan, info)
    }

    pub fn write_raw(&self, channel: u32, val: IioValue, info: ChanInfo) -> Result<(), DriverError> {
        let chan = self.channel(channel)?;
        if !self.modes.contains(IioModes::DIRECT) || !chan.supports(info) {
            return Err(DriverError::InvalidArgument);
        }
        self.info.write_raw(chan, val, info)
    }
}

impl Debug for IioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IioDevice")
            .field("name", &self.name)
            .field("modes", &self.modes)
            .field("channels", &self.channels.len())
            .finish()
    }
}

struct IioState {
    free_ids: SortedRangeSet,
    devices: BTreeMap<usize, Arc<IioDevice>>,
}

/// Registered IIO devices, numbered `iio:deviceN`.
pub struct IioRegistry {
    state: Mutex<IioState>,
}

impl IioRegistry {
    pub fn new() -> IioRegistry {
        Self::with_capacity(IIO_MAX_DEVICES)
    }

    pub fn with_capacity(capacity: usize) -> IioRegistry {
        IioRegistry {
            state: Mutex::new(IioState {
                free_ids: SortedRangeSet::from_range(0..capacity),
                devices: BTreeMap::new(),
            }),
        }
    }

    pub fn register(&self, dev: IioDevice) -> Result<usize, DriverError> {
        let mut guard = self.state.lock();
        let id = guard.free_ids.take(1).ok_or(DriverError::AllocationFailed)?;
        info!("Registered IIO device '{}' as iio:device{}.", dev.name, id);
        guard.devices.insert(id, Arc::new(dev));
        Ok(id)
    }

    pub fn unregister(&self, id: usize) -> ReleaseResult {
        let mut guard = self.state.lock();
        let dev = guard.devices.remove(&id).ok_or("IIO device not registered")?;
        guard.free_ids.add(id..id + 1);
        info!("Unregistered IIO device '{}'.", dev.name);
        Ok(())
    }

    pub fn get(&self, id: usize) -> Option<Arc<IioDevice>> {
        self.state.lock().devices.get(&id).cloned()
    }

    pub fn find(&self, name: &str) -> Option<Arc<IioDevice>> {
        self.state
            .lock()
            .devices
            .values()
            .find(|x| x.name.as_ref() == name)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.state.lock().devices.len()
    }
}

impl Default for IioRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for IioRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IioRegistry")
            .field("count", &self.count())
            .finish()
    }
}
