//! Platform character driver exposing `/dev/foo_char`.

use crate::{
    chrdev::{
        endpoint::EndpointSpec,
        file::{FileOperations, FileState},
    },
    dev::{
        binding::BusBinding,
        context::ProbeContext,
        device::{BusType, Device},
        driver::{Driver, MatchKey},
    },
    error::DriverError,
};
use alloc::sync::Arc;
use log::info;

pub const DRIVER_NAME: &str = "platform-foo-char";

const ENDPOINT: EndpointSpec<'static> = EndpointSpec {
    device_name: "foo_char",
    class_name: "foo_char_class",
    node_name: "foo_char",
};

struct FooCharOps;

impl FileOperations for FooCharOps {
    fn open(&self, file: &mut FileState) -> Result<(), DriverError> {
        info!("Foo device {} opened.", file.devt);
        Ok(())
    }

    fn release(&self, file: &mut FileState) {
        info!("Foo device {} closed.", file.devt);
    }

    fn read(&self, _file: &mut FileState, _buf: &mut [u8]) -> Result<usize, DriverError> {
        Ok(0)
    }

    fn write(&self, _file: &mut FileState, buf: &[u8]) -> Result<usize, DriverError> {
        Ok(buf.len())
    }
}

#[derive(Debug)]
pub struct PlatformCharDriver {
    keys: [MatchKey; 1],
}

impl PlatformCharDriver {
    pub const fn new() -> PlatformCharDriver {
        Self::with_match_name(DRIVER_NAME)
    }

    /// Bind platform devices called `name` instead of the driver's own name.
    pub const fn with_match_name(name: &'static str) -> PlatformCharDriver {
        PlatformCharDriver {
            keys: [MatchKey::Name(name)],
        }
    }
}

impl Default for PlatformCharDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for PlatformCharDriver {
    fn get_name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn get_bus(&self) -> BusType {
        BusType::Platform
    }

    fn get_match_keys(&self) -> &[MatchKey] {
        &self.keys
    }

    fn bind(&self, dev: &Device, ctx: &ProbeContext, binding: &mut BusBinding) -> Result<(), DriverError> {
        let ep = binding.acquire_endpoint(&ctx.chrdev, ENDPOINT, Arc::new(FooCharOps))?;
        info!("Foo platform character driver bound to '{}' at {}.", dev.id, ep.devt());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::registry::DriverRegistry;

    #[test]
    fn write_accepts_everything_and_read_is_eof() {
        let reg = DriverRegistry::new(ProbeContext::default());
        reg.register_driver(Arc::new(PlatformCharDriver::new())).unwrap();
        reg.on_device_appeared(Device::platform(DRIVER_NAME, Some(0))).unwrap();
        let mut file = reg.context().chrdev.open("/dev/foo_char").unwrap();
        assert_eq!(file.write(b"hello"), Ok(5));
        assert_eq!(file.read(&mut [0u8; 8]), Ok(0));
    }

    #[test]
    fn match_name_is_configurable() {
        let drv = PlatformCharDriver::with_match_name("foo_char");
        assert!(drv.matches(&Device::platform("foo_char", Some(0))));
        assert!(!drv.matches(&Device::platform(DRIVER_NAME, Some(0))));
        assert!(!drv.matches(&Device::spi("foo_char")));
    }
}
