//! SPI bus: registered controllers by bus number.
//!
//! Controller drivers allocate a bus number with [SpiBus::alloc_bus_num], build a
//! [master::SpiMaster] and publish it with [SpiBus::register_master]. Client drivers find
//! their controller with [SpiBus::get] and talk to it through a [transfer::TransferChannel].

pub mod master;
pub mod transfer;

use crate::{error::DriverError, spi::master::SpiMaster};
use alloc::{collections::btree_map::BTreeMap, sync::Arc, vec::Vec};
use config::build_flags::SPI_FIRST_BUS_NUM;
use core::sync::atomic::{AtomicU32, Ordering};
use log::info;
use spin::RwLock;
use utils::ledger::ReleaseResult;

#[derive(Debug)]
pub struct SpiBus {
    masters: RwLock<BTreeMap<u32, Arc<SpiMaster>>>,
    next_bus_num: AtomicU32,
}

impl SpiBus {
    pub fn new() -> SpiBus {
        SpiBus {
            masters: RwLock::new(BTreeMap::new()),
            next_bus_num: AtomicU32::new(SPI_FIRST_BUS_NUM as u32),
        }
    }

    /// Next bus number. Numbers are never reused.
    pub fn alloc_bus_num(&self) -> u32 {
        self.next_bus_num.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_master(&self, master: Arc<SpiMaster>) -> Result<(), DriverError> {
        let mut guard = self.masters.write();
        let bus_num = master.bus_num();
        if guard.contains_key(&bus_num) {
            return Err(DriverError::RegistrationFailed);
        }
        master.set_registered(true);
        guard.insert(bus_num, master);
        info!("Registered SPI master on bus {}.", bus_num);
        Ok(())
    }

    /// Withdraw the master of `bus_num`. Channels still holding it fail with [DriverError::NoDevice].
    pub fn unregister_master(&self, bus_num: u32) -> ReleaseResult {
        let master = self
            .masters
            .write()
            .remove(&bus_num)
            .ok_or("SPI master not registered")?;
        master.set_registered(false);
        info!("Unregistered SPI master on bus {}.", bus_num);
        Ok(())
    }

    pub fn get(&self, bus_num: u32) -> Option<Arc<SpiMaster>> {
        self.masters.read().get(&bus_num).cloned()
    }

    /// Lowest-numbered registered master.
    pub fn first(&self) -> Option<Arc<SpiMaster>> {
        self.masters.read().values().next().cloned()
    }

    pub fn bus_nums(&self) -> Vec<u32> {
        self.masters.read().keys().copied().collect()
    }
}

impl Default for SpiBus {
    fn default() -> Self {
        Self::new()
    }
}
