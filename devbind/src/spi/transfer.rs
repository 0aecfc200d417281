//! Fixed-shape synchronous exchanges on an SPI device.

use crate::{
    error::DriverError,
    spi::master::{SpiMaster, SpiMessage, SpiTransfer},
};
use alloc::{sync::Arc, vec::Vec};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

/// Shape of one segment: direction and byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub direction: Direction,
    pub len: usize,
}

impl Segment {
    pub const fn send(len: usize) -> Segment {
        Segment {
            direction: Direction::Send,
            len,
        }
    }

    pub const fn receive(len: usize) -> Segment {
        Segment {
            direction: Direction::Receive,
            len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unconfigured,
    Configured,
}

/// Outcome of the most recent [TransferChannel::execute].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Idle,
    Success,
    Failed(DriverError),
}

/// A request/response channel to one chip select.
///
/// ```text
/// Unconfigured --configure--> Configured --execute--> Configured
/// ```
///
/// `execute` takes `&mut self`, so an exchange in progress is never observable; owners that
/// share a channel wrap it in a mutex. The exchange is atomic: either every receive segment
/// is returned in full, or nothing is.
#[derive(Debug)]
pub struct TransferChannel {
    master: Arc<SpiMaster>,
    chip_select: u8,
    capacity: usize,
    segments: Vec<Segment>,
    tx: Vec<u8>,
    state: ChannelState,
    status: TransferStatus,
}

impl TransferChannel {
    /// Create an unconfigured channel whose segments may total at most `capacity` bytes.
    pub fn new(master: Arc<SpiMaster>, chip_select: u8, capacity: usize) -> TransferChannel {
        TransferChannel {
            master,
            chip_select,
            capacity,
            segments: Vec::new(),
            tx: Vec::new(),
            state: ChannelState::Unconfigured,
            status: TransferStatus::Idle,
        }
    }

    /// Fix the transfer shape. Allowed once.
    pub fn configure(&mut self, segments: &[Segment]) -> Result<(), DriverError> {
        if self.state != ChannelState::Unconfigured {
            return Err(DriverError::InvalidState);
        }
        let total: usize = segments.iter().map(|x| x.len).sum();
        if segments.is_empty() || segments.iter().any(|x| x.len == 0) || total > self.capacity {
            return Err(DriverError::InvalidArgument);
        }
        self.master.setup(self.chip_select)?;
        self.segments = segments.to_vec();
        self.tx = alloc::vec![0; self.send_len()];
        self.state = ChannelState::Configured;
        debug!(
            "Channel on SPI bus {} cs {} configured with {} segment(s).",
            self.master.bus_num(),
            self.chip_select,
            segments.len()
        );
        Ok(())
    }

    fn send_len(&self) -> usize {
        self.segments
            .iter()
            .filter(|x| x.direction == Direction::Send)
            .map(|x| x.len)
            .sum()
    }

    /// Set the bytes the send segments clock out, in segment order.
    pub fn set_tx(&mut self, data: &[u8]) -> Result<(), DriverError> {
        if self.state != ChannelState::Configured {
            return Err(DriverError::InvalidState);
        }
        if data.len() != self.tx.len() {
            return Err(DriverError::InvalidArgument);
        }
        self.tx.copy_from_slice(data);
        Ok(())
    }

    /// Run all segments as one exchange and return the receive segments concatenated.
    pub fn execute(&mut self) -> Result<Vec<u8>, DriverError> {
        if self.state != ChannelState::Configured {
            return Err(DriverError::InvalidState);
        }
        match self.exchange() {
            Ok(rx) => {
                self.status = TransferStatus::Success;
                Ok(rx)
            }
            Err(err) => {
                warn!(
                    "Transfer on SPI bus {} cs {} failed: {}.",
                    self.master.bus_num(),
                    self.chip_select,
                    err
                );
                self.status = TransferStatus::Failed(DriverError::TransferFailed);
                Err(DriverError::TransferFailed)
            }
        }
    }

    fn exchange(&self) -> Result<Vec<u8>, DriverError> {
        let mut tx = self.tx.as_slice();
        let transfers = self
            .segments
            .iter()
            .map(|seg| match seg.direction {
                Direction::Send => {
                    let (head, rest) = tx.split_at(seg.len);
                    tx = rest;
                    SpiTransfer::send(head)
                }
                Direction::Receive => SpiTransfer::receive(seg.len),
            })
            .collect();
        let mut msg = SpiMessage::new(self.chip_select, transfers);
        self.master.sync(&mut msg)?;

        let mut rx = Vec::new();
        for (seg, xfer) in self.segments.iter().zip(msg.transfers.iter()) {
            if seg.direction != Direction::Receive {
                continue;
            }
            match xfer.rx_buf.as_deref() {
                Some(buf) if buf.len() == seg.len => rx.extend_from_slice(buf),
                _ => return Err(DriverError::TransferFailed),
            }
        }
        Ok(rx)
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn chip_select(&self) -> u8 {
        self.chip_select
    }

    pub fn master(&self) -> &Arc<SpiMaster> {
        &self.master
    }
}
