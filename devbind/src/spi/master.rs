//! SPI controllers and the messages they carry.

use crate::{
    error::DriverError,
    fault::{FaultInjector, FaultPoints},
};
use alloc::{boxed::Box, vec, vec::Vec};
use bitflags::bitflags;
use config::build_flags::{SPI_MAX_BITS_PER_WORD, SPI_MIN_BITS_PER_WORD};
use core::{
    fmt::{self, Debug},
    sync::atomic::{AtomicBool, Ordering},
};
use log::{debug, warn};
use spin::Mutex;

bitflags! {
    pub struct SpiMode: u16 {
        /// Clock phase.
        const CPHA      = 0x01;
        /// Clock polarity.
        const CPOL      = 0x02;
        /// Chip select is active high.
        const CS_HIGH   = 0x04;
        const LSB_FIRST = 0x08;
        const LOOP      = 0x20;
    }
}

/// Mask with one bit per supported word size, bit `n - 1` for `n` bits.
pub const fn bpw_range_mask(min: u32, max: u32) -> u32 {
    let upper = if max >= 32 { u32::MAX } else { (1 << max) - 1 };
    let lower = (1 << (min - 1)) - 1;
    upper & !lower
}

/// One directional movement within a [SpiMessage].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiTransfer {
    /// Bytes clocked out. `None` means the controller sends zeros.
    pub tx_buf: Option<Vec<u8>>,
    /// Bytes clocked in. `None` means received data is discarded.
    pub rx_buf: Option<Vec<u8>>,
    pub len: usize,
    pub bits_per_word: u8,
}

impl SpiTransfer {
    pub fn send(data: &[u8]) -> SpiTransfer {
        SpiTransfer {
            tx_buf: Some(data.to_vec()),
            rx_buf: None,
            len: data.len(),
            bits_per_word: 8,
        }
    }

    pub fn receive(len: usize) -> SpiTransfer {
        SpiTransfer {
            tx_buf: None,
            rx_buf: Some(vec![0; len]),
            len,
            bits_per_word: 8,
        }
    }
}

/// Transfers exchanged as one unit with chip select held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiMessage {
    pub chip_select: u8,
    pub transfers: Vec<SpiTransfer>,
    /// Completion code set by the controller; 0 is success.
    pub status: i32,
}

impl SpiMessage {
    pub fn new(chip_select: u8, transfers: Vec<SpiTransfer>) -> SpiMessage {
        SpiMessage {
            chip_select,
            transfers,
            status: -1,
        }
    }
}

/// Hardware side of a [SpiMaster].
pub trait SpiController: Send + Sync {
    fn setup(&self, _chip_select: u8) -> Result<(), DriverError> {
        Ok(())
    }
    fn cleanup(&self, _chip_select: u8) {}
    /// Run every transfer of `msg` and set its status.
    fn transfer_one_message(&self, msg: &mut SpiMessage) -> Result<(), DriverError>;
}

/// Properties a controller driver fills in before registering its master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiMasterInfo {
    pub bus_num: u32,
    pub num_chipselect: u16,
    pub mode_bits: SpiMode,
    pub bits_per_word_mask: u32,
}

impl Default for SpiMasterInfo {
    fn default() -> Self {
        SpiMasterInfo {
            bus_num: 0,
            num_chipselect: 1,
            mode_bits: SpiMode::empty(),
            bits_per_word_mask: bpw_range_mask(SPI_MIN_BITS_PER_WORD as u32, SPI_MAX_BITS_PER_WORD as u32),
        }
    }
}

/// An SPI bus controller.
///
/// Messages are serialized by the bus lock: [SpiMaster::sync] blocks until every earlier
/// message on this bus completed. There is no timeout.
pub struct SpiMaster {
    info: SpiMasterInfo,
    controller: Box<dyn SpiController>,
    bus_lock: Mutex<()>,
    registered: AtomicBool,
    faults: FaultInjector,
}

impl SpiMaster {
    pub fn new(info: SpiMasterInfo, controller: Box<dyn SpiController>) -> SpiMaster {
        SpiMaster {
            info,
            controller,
            bus_lock: Mutex::new(()),
            registered: AtomicBool::new(false),
            faults: FaultInjector::new(),
        }
    }

    pub fn info(&self) -> &SpiMasterInfo {
        &self.info
    }

    pub fn bus_num(&self) -> u32 {
        self.info.bus_num
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(super) fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }

    pub fn supports_bits_per_word(&self, bits: u8) -> bool {
        (1..=32).contains(&bits) && self.info.bits_per_word_mask & (1 << (bits - 1)) != 0
    }

    /// Check that `chip_select` exists on this bus and let the controller prepare it.
    pub fn setup(&self, chip_select: u8) -> Result<(), DriverError> {
        if u16::from(chip_select) >= self.info.num_chipselect {
            warn!(
                "Chip select {} out of range on SPI bus {}.",
                chip_select, self.info.bus_num
            );
            return Err(DriverError::InvalidArgument);
        }
        self.controller.setup(chip_select)
    }

    pub fn cleanup(&self, chip_select: u8) {
        self.controller.cleanup(chip_select);
    }

    /// Run `msg` synchronously.
    pub fn sync(&self, msg: &mut SpiMessage) -> Result<(), DriverError> {
        if !self.is_registered() {
            return Err(DriverError::NoDevice);
        }
        if u16::from(msg.chip_select) >= self.info.num_chipselect
            || msg
                .transfers
                .iter()
                .any(|x| !self.supports_bits_per_word(x.bits_per_word))
        {
            return Err(DriverError::InvalidArgument);
        }
        let _guard = self.bus_lock.lock();
        if self.faults.trip(FaultPoints::TRANSFER) {
            msg.status = -5;
            return Err(DriverError::TransferFailed);
        }
        self.controller.transfer_one_message(msg)?;
        if msg.status != 0 {
            debug!("SPI bus {}: message failed with status {}.", self.info.bus_num, msg.status);
            return Err(DriverError::TransferFailed);
        }
        Ok(())
    }
}

impl Debug for SpiMaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiMaster")
            .field("info", &self.info)
            .field("registered", &self.is_registered())
            .finish()
    }
}
