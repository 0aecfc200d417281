//! SPI client driver for `foo-spi` devices, exposed as `/dev/spi_foo0`.
//!
//! Each read at position 0 sends the command byte and returns the two-byte reply; the
//! following read reports end of data and rewinds.

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
    spi::transfer::{Segment, TransferChannel},
};
use alloc::sync::Arc;
use log::{error, info};
use spin::Mutex;

pub const DRIVER_NAME: &str = "foo_client";
pub const DEVICE_ID: &str = "foo-spi";

const CMD_READ: u8 = 3;
const RX_LEN: usize = 2;
const SHAPE: [Segment; 2] = [Segment::send(1), Segment::receive(RX_LEN)];

const ENDPOINT: EndpointSpec<'static> = EndpointSpec {
    device_name: "spi_foo",
    class_name: "spifoo",
    node_name: "spi_foo0",
};

struct FooClientOps {
    channel: Arc<Mutex<TransferChannel>>,
}

impl FileOperations for FooClientOps {
    fn read(&self, file: &mut FileState, buf: &mut [u8]) -> Result<usize, DriverError> {
        if file.pos != 0 {
            file.pos = 0;
            return Ok(0);
        }
        let dst = buf.get_mut(..RX_LEN).ok_or(DriverError::InvalidArgument)?;
        let rx = {
            let mut channel = self.channel.lock();
            channel.set_tx(&[CMD_READ])?;
            channel.execute()?
        };
        if rx.len() != RX_LEN {
            error!("Short reply from SPI device: {} byte(s).", rx.len());
            return Err(DriverError::TransferFailed);
        }
        dst.copy_from_slice(&rx);
        file.pos = 1;
        Ok(RX_LEN)
    }
}

#[derive(Debug)]
pub struct FooSpiClientDriver;

static MATCH_KEYS: [MatchKey; 2] = [MatchKey::Name(DEVICE_ID), MatchKey::Name(DRIVER_NAME)];

impl Driver for FooSpiClientDriver {
    fn get_name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn get_bus(&self) -> BusType {
        BusType::Spi
    }

    fn get_match_keys(&self) -> &[MatchKey] {
        &MATCH_KEYS
    }

    /// Find the controller (`spi-bus` property, else the lowest bus), shape the channel, then
    /// publish the endpoint.
    fn bind(&self, dev: &Device, ctx: &ProbeContext, binding: &mut BusBinding) -> Result<(), DriverError> {
        let master = match dev.property("spi-bus") {
            Some(prop) => {
                let bus_num = prop.value_as_u32().map_err(|_| DriverError::InvalidArgument)?;
                ctx.spi.get(bus_num)
            }
            None => ctx.spi.first(),
        }
        .ok_or(DriverError::NoDevice)?;
        let chip_select = dev
            .read_u32_or("reg", 0)
            .ok()
            .and_then(|x| u8::try_from(x).ok())
            .ok_or(DriverError::InvalidArgument)?;

        let mut channel = TransferChannel::new(master.clone(), chip_select, RX_LEN + 1);
        channel.configure(&SHAPE)?;
        let channel = binding.attach_channel(channel)?;
        let m = master.clone();
        binding.on_release("spi chip select", move || {
            m.cleanup(chip_select);
            Ok(())
        });

        let ep = binding.acquire_endpoint(
            &ctx.chrdev,
            ENDPOINT,
            Arc::new(FooClientOps { channel }),
        )?;
        info!(
            "SPI client '{}' on bus {} cs {} published at {}.",
            dev.id,
            master.bus_num(),
            chip_select,
            ep.devt()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dev::registry::DriverRegistry,
        drivers::spi_master::{COMPATIBLE, FooSpiMasterDriver},
        fault::FaultPoints,
    };

    fn registry() -> DriverRegistry {
        let reg = DriverRegistry::new(ProbeContext::default());
        reg.register_driver(Arc::new(FooSpiMasterDriver)).unwrap();
        reg.register_driver(Arc::new(FooSpiClientDriver)).unwrap();
        reg.on_device_appeared(Device::platform("spi", Some(0)).with_compatible(&[COMPATIBLE]))
            .unwrap();
        reg
    }

    #[test]
    fn read_returns_reply_then_eof() {
        let reg = registry();
        reg.on_device_appeared(Device::spi(DEVICE_ID)).unwrap();
        let mut file = reg.context().chrdev.open("/dev/spi_foo0").unwrap();
        let mut buf = [0xFFu8; 4];
        assert_eq!(file.read(&mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0, 0]);
        assert_eq!(file.position(), 1);
        assert_eq!(file.read(&mut buf), Ok(0));
        assert_eq!(file.position(), 0);
        assert_eq!(file.read(&mut buf), Ok(2));
    }

    #[test]
    fn short_buffer_and_bus_failure_are_errors() {
        let reg = registry();
        reg.on_device_appeared(Device::spi(DEVICE_ID)).unwrap();
        let mut file = reg.context().chrdev.open("spi_foo0").unwrap();
        assert_eq!(file.read(&mut [0u8; 1]), Err(DriverError::InvalidArgument));
        reg.context().spi.first().unwrap().faults().arm(FaultPoints::TRANSFER);
        assert_eq!(file.read(&mut [0u8; 2]), Err(DriverError::TransferFailed));
        assert_eq!(file.position(), 0);
        assert_eq!(file.write(b"x"), Err(DriverError::Unsupported));
    }

    #[test]
    fn no_controller_means_no_device() {
        let reg = DriverRegistry::new(ProbeContext::default());
        reg.register_driver(Arc::new(FooSpiClientDriver)).unwrap();
        assert_eq!(
            reg.on_device_appeared(Device::spi(DEVICE_ID)).err(),
            Some(DriverError::NoDevice)
        );
        assert_eq!(reg.context().chrdev.node_count(), 0);
    }

    #[test]
    fn chip_select_beyond_controller_is_rejected() {
        use dt::prop::Property;
        let reg = registry();
        let dev = Device::spi(DEVICE_ID).with_property(Property::from_u32("reg", 1));
        assert_eq!(reg.on_device_appeared(dev).err(), Some(DriverError::InvalidArgument));
    }
}
