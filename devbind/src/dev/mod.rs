//! Driver model: devices, drivers, bindings and the registry that ties them together.

pub mod binding;
pub mod context;
pub mod device;
pub mod driver;
pub mod handle;
pub mod registry;
