//! Device/driver binding with ordered resource cleanup.
//!
//! A [dev::registry::DriverRegistry] matches devices to drivers. Each bind records every
//! acquired resource (device numbers, classes, character devices, nodes, SPI controllers,
//! IIO devices) on the binding's [utils::ledger::ResourceLedger]; a failed bind and a
//! removal both unwind that ledger newest first.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

#[macro_use]
pub mod console;
pub mod logging;

pub mod chrdev;
pub mod dev;
pub mod drivers;
pub mod error;
pub mod fault;
pub mod iio;
pub mod instance;
pub mod spi;

pub use error::DriverError;
