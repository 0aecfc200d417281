//! Configurations for the driver model.
//! Values are generated from `flags.json` at build time, so every crate in the
//! workspace agrees on the same limits.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

/// Constants generated from `flags.json`.
#[allow(missing_docs)]
pub mod build_flags {
    include!(concat!(env!("OUT_DIR"), "/build_flags.rs"));
}
