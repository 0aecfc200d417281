//! Platform driver for the `foo-master` SPI controller.
//!
//! The controller has no hardware behind it: every message completes with status 0 and
//! receive buffers left zero-filled.

use crate::{
    dev::{
        binding::BusBinding,
        context::ProbeContext,
        device::{BusType, Device},
        driver::{Driver, MatchKey},
    },
    error::DriverError,
    spi::master::{SpiController, SpiMaster, SpiMasterInfo, SpiMessage, SpiMode},
};
use alloc::{boxed::Box, sync::Arc};
use config::build_flags::SPI_DEFAULT_NUM_CS;
use log::{debug, error, info};

pub const DRIVER_NAME: &str = "foo_spi";
pub const COMPATIBLE: &str = "foo-master";

struct FooSpiController;

impl SpiController for FooSpiController {
    fn setup(&self, chip_select: u8) -> Result<(), DriverError> {
        debug!("Foo setup invoked for cs {}.", chip_select);
        Ok(())
    }

    fn cleanup(&self, chip_select: u8) {
        debug!("Foo clean up invoked for cs {}.", chip_select);
    }

    fn transfer_one_message(&self, msg: &mut SpiMessage) -> Result<(), DriverError> {
        debug!("Foo transfer_one_message invoked ({} transfer(s)).", msg.transfers.len());
        msg.status = 0;
        Ok(())
    }
}

#[derive(Debug)]
pub struct FooSpiMasterDriver;

static MATCH_KEYS: [MatchKey; 2] = [MatchKey::Compatible(COMPATIBLE), MatchKey::Name(DRIVER_NAME)];

impl Driver for FooSpiMasterDriver {
    fn get_name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn get_bus(&self) -> BusType {
        BusType::Platform
    }

    fn get_match_keys(&self) -> &[MatchKey] {
        &MATCH_KEYS
    }

    fn bind(&self, dev: &Device, ctx: &ProbeContext, binding: &mut BusBinding) -> Result<(), DriverError> {
        if !dev.compatible().contains(&COMPATIBLE) {
            error!("No matching device found for SPI master '{}'.", dev.id);
            return Err(DriverError::NoDevice);
        }
        let num_cs = dev
            .read_u32_or("num-cs", SPI_DEFAULT_NUM_CS as u32)
            .map_err(|_| DriverError::InvalidArgument)?;
        let num_chipselect = u16::try_from(num_cs)
            .ok()
            .filter(|x| *x > 0)
            .ok_or(DriverError::InvalidArgument)?;

        let bus_num = ctx.spi.alloc_bus_num();
        let master = Arc::new(SpiMaster::new(
            SpiMasterInfo {
                bus_num,
                num_chipselect,
                mode_bits: SpiMode::CPOL | SpiMode::CPHA | SpiMode::CS_HIGH,
                ..Default::default()
            },
            Box::new(FooSpiController),
        ));
        ctx.spi.register_master(master.clone())?;
        let spi = ctx.spi.clone();
        binding.on_release("spi master", move || spi.unregister_master(bus_num));
        binding.set_drvdata(master);
        info!("Foo SPI master bound to '{}' on bus {} ({} cs).", dev.id, bus_num, num_chipselect);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::registry::DriverRegistry;
    use dt::prop::Property;

    fn registry() -> DriverRegistry {
        let reg = DriverRegistry::new(ProbeContext::default());
        reg.register_driver(Arc::new(FooSpiMasterDriver)).unwrap();
        reg
    }

    #[test]
    fn num_cs_defaults_to_one_and_bus_numbers_increment() {
        let reg = registry();
        let a = Device::platform("spi", Some(0x1000)).with_compatible(&[COMPATIBLE]);
        let b = Device::platform("spi", Some(0x2000))
            .with_compatible(&[COMPATIBLE])
            .with_property(Property::from_u32("num-cs", 4));
        reg.on_device_appeared(a).unwrap();
        reg.on_device_appeared(b).unwrap();
        let spi = &reg.context().spi;
        assert_eq!(spi.bus_nums(), [1, 2]);
        let first = spi.get(1).unwrap();
        assert_eq!(first.info().num_chipselect, 1);
        assert_eq!(first.info().mode_bits, SpiMode::CPOL | SpiMode::CPHA | SpiMode::CS_HIGH);
        assert_eq!(spi.get(2).unwrap().info().num_chipselect, 4);
    }

    #[test]
    fn name_match_without_compatible_is_rejected() {
        let reg = registry();
        assert_eq!(
            reg.on_device_appeared(Device::platform(DRIVER_NAME, None)).err(),
            Some(DriverError::NoDevice)
        );
        assert!(reg.context().spi.bus_nums().is_empty());
    }

    #[test]
    fn remove_unregisters_master() {
        let reg = registry();
        let dev = Device::platform("spi", Some(0)).with_compatible(&[COMPATIBLE]);
        let id = dev.id.clone();
        reg.on_device_appeared(dev).unwrap();
        let master = reg.context().spi.first().unwrap();
        reg.on_device_removed(BusType::Platform, &id).unwrap();
        assert!(!master.is_registered());
        assert!(reg.context().spi.first().is_none());
    }
}
