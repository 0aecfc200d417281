//! Device-description tree.
//!
//! Nodes carry typed [prop::Property] values encoded the way a flattened device tree
//! stores them. The driver model reads device configuration (`compatible`, `num-cs`,
//! `reg`) from here.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod node;
pub mod prop;
