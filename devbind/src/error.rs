//! Error type shared by every driver-model operation.

use core::fmt::{self, Display};

/// Errors returned by bind, acquisition, transfer and file operations.
///
/// Nothing in the driver model aborts the host; every failure is one of these values
/// handed back to the immediate caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// Device-number range, instance id or memory exhausted, or the name is already live.
    AllocationFailed,
    /// The device class could not be created.
    ClassCreateFailed,
    /// The file-operation table could not be bound to the number range.
    RegistrationFailed,
    /// The visible device node could not be published.
    NodeCreateFailed,
    /// A match key is already registered on this bus.
    DuplicateDriver,
    /// A synchronous exchange did not complete.
    TransferFailed,
    /// No registered driver matches the device.
    NoMatchingDriver,
    /// The device, endpoint or controller is gone, or the driver rejected it.
    NoDevice,
    /// The operation is not valid in the current lifecycle state.
    InvalidState,
    /// A property or caller-supplied buffer is unusable.
    InvalidArgument,
    /// The file-operation table does not provide this hook.
    Unsupported,
}

impl Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed => f.write_str("allocation failed"),
            Self::ClassCreateFailed => f.write_str("device class creation failed"),
            Self::RegistrationFailed => f.write_str("character device registration failed"),
            Self::NodeCreateFailed => f.write_str("device node creation failed"),
            Self::DuplicateDriver => f.write_str("driver already registered"),
            Self::TransferFailed => f.write_str("transfer failed"),
            Self::NoMatchingDriver => f.write_str("no matching driver"),
            Self::NoDevice => f.write_str("no such device"),
            Self::InvalidState => f.write_str("invalid lifecycle state"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::Unsupported => f.write_str("operation not supported"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_acquisition_variants() {
        assert_eq!(format!("{}", DriverError::AllocationFailed), "allocation failed");
        assert_eq!(
            format!("{}", DriverError::ClassCreateFailed),
            "device class creation failed"
        );
        assert_eq!(
            format!("{}", DriverError::RegistrationFailed),
            "character device registration failed"
        );
        assert_eq!(
            format!("{}", DriverError::NodeCreateFailed),
            "device node creation failed"
        );
    }

    #[test]
    fn display_registry_variants() {
        assert_eq!(format!("{}", DriverError::DuplicateDriver), "driver already registered");
        assert_eq!(format!("{}", DriverError::NoMatchingDriver), "no matching driver");
        assert_eq!(format!("{}", DriverError::TransferFailed), "transfer failed");
    }
}
