//! Leaf helpers shared by the driver model crates.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod ledger;
pub mod range_set;
