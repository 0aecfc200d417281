//! Simulated IIO device with four voltage channels.

use crate::{
    dev::{
        binding::BusBinding,
        context::ProbeContext,
        device::{BusType, Device},
        driver::{Driver, MatchKey},
    },
    error::DriverError,
    iio::{ChanInfo, ChanSpec, IioDevice, IioInfo, IioModes, IioValue},
};
use alloc::{boxed::Box, vec, vec::Vec};
use log::info;
use spin::Mutex;

pub const DRIVER_NAME: &str = "iio-dummy-random";
pub const COMPATIBLE: &str = "packt,iio-dummy-random";
/// Name the IIO device is registered under.
pub const IIO_NAME: &str = "iio_sim_dev";

const NUM_CHANNELS: u32 = 4;
const SCAN_MASK: u64 = 0xF;

/// Private data; the lock serializes the callbacks.
struct SimInfo {
    lock: Mutex<()>,
}

impl IioInfo for SimInfo {
    fn read_raw(&self, _chan: &ChanSpec, _info: ChanInfo) -> Result<IioValue, DriverError> {
        let _guard = self.lock.lock();
        Ok((0, 0))
    }

    fn write_raw(&self, _chan: &ChanSpec, _val: IioValue, _info: ChanInfo) -> Result<(), DriverError> {
        let _guard = self.lock.lock();
        Ok(())
    }
}

fn channels() -> Vec<ChanSpec> {
    (0..NUM_CHANNELS).map(ChanSpec::voltage).collect()
}

#[derive(Debug)]
pub struct IioSimDriver;

static MATCH_KEYS: [MatchKey; 2] = [MatchKey::Compatible(COMPATIBLE), MatchKey::Name(DRIVER_NAME)];

impl Driver for IioSimDriver {
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
        let id = ctx.iio.register(IioDevice {
            name: Box::from(IIO_NAME),
            modes: IioModes::DIRECT,
            channels: channels(),
            available_scan_masks: vec![SCAN_MASK],
            info: Box::new(SimInfo {
                lock: Mutex::new(()),
            }),
        })?;
        let iio = ctx.iio.clone();
        binding.on_release("iio device", move || iio.unregister(id));
        binding.set_drvdata(id);
        info!("IIO simulated device bound to '{}' as iio:device{}.", dev.id, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::registry::DriverRegistry;
    use alloc::sync::Arc;

    #[test]
    fn bind_registers_four_voltage_channels() {
        let reg = DriverRegistry::new(ProbeContext::default());
        reg.register_driver(Arc::new(IioSimDriver)).unwrap();
        let dev = Device::platform(DRIVER_NAME, Some(0));
        let id = dev.id.clone();
        reg.on_device_appeared(dev).unwrap();

        let iio = reg.context().iio.find(IIO_NAME).unwrap();
        assert_eq!(iio.channels.len(), 4);
        assert_eq!(iio.available_scan_masks, [0xF]);
        assert!(iio.modes.contains(IioModes::DIRECT));
        assert_eq!(iio.read_raw(3, ChanInfo::Raw), Ok((0, 0)));
        assert_eq!(iio.read_raw(0, ChanInfo::Scale), Ok((0, 0)));
        assert_eq!(iio.write_raw(1, (5, 0), ChanInfo::Raw), Ok(()));

        reg.on_device_removed(BusType::Platform, &id).unwrap();
        assert_eq!(reg.context().iio.count(), 0);
    }

    #[test]
    fn compatible_node_binds() {
        let reg = DriverRegistry::new(ProbeContext::default());
        reg.register_driver(Arc::new(IioSimDriver)).unwrap();
        let dev = Device::platform("adc", Some(0)).with_compatible(&[COMPATIBLE]);
        reg.on_device_appeared(dev).unwrap();
        assert_eq!(reg.context().iio.count(), 1);
    }
}
