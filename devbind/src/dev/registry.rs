//! Driver registry: registration, matching and the bind/unbind lifecycle.
//!
//! Responsibilities:
//! - Keep registered [Driver]s per bus in registration order. The first registered driver
//!   whose [MatchKey]s match a device binds it; later candidates are never called.
//! - Track present devices and their single live [BusBinding].
//! - Bind devices that appear, unbind devices that go away, and bind waiting devices when a
//!   matching driver registers later.
//!
//! Locking:
//! - `drivers` is read-locked by device events and write-locked by driver (un)registration,
//!   so an event never observes a half-registered driver.
//! - Every present device has its own slot lock. Bind and unbind of one device run under it
//!   and so never overlap.
//! - Lock order is `drivers`, then `devices` (held briefly), then a slot.
use crate::{
    dev::{
        binding::BusBinding,
        context::ProbeContext,
        device::{BusType, Device, DeviceId},
        driver::Driver,
        handle::{Handle, HandleRef},
    },
    error::DriverError,
};
use alloc::{collections::btree_map::BTreeMap, sync::Arc, vec::Vec};
use core::fmt;
use dt::node::{DeviceTree, NodeType};
use log::{debug, error, info, warn};
use spin::{Mutex, RwLock};

type DeviceKey = (BusType, DeviceId);

/// Shared, lockable binding as handed out by the registry.
pub type BindingHandle = Handle<Mutex<BusBinding>>;
pub type BindingRef = HandleRef<Mutex<BusBinding>>;

struct Bound {
    driver: Arc<dyn Driver>,
    binding: BindingHandle,
}

struct Slot {
    dev: Device,
    bound: Option<Bound>,
}

pub struct DriverRegistry {
    ctx: ProbeContext,
    drivers: RwLock<Vec<Arc<dyn Driver>>>,
    devices: Mutex<BTreeMap<DeviceKey, Handle<Mutex<Slot>>>>,
}

impl DriverRegistry {
    pub fn new(ctx: ProbeContext) -> DriverRegistry {
        DriverRegistry {
            ctx,
            drivers: RwLock::new(Vec::new()),
            devices: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn context(&self) -> &ProbeContext {
        &self.ctx
    }

    // region: Drivers

    /// Register `driver` and bind every waiting device it matches.
    ///
    /// Fails with [DriverError::DuplicateDriver] if its name or any of its match keys is
    /// already registered on the same bus. Bind failures of waiting devices are logged; those
    /// devices stay present and unbound.
    pub fn register_driver(&self, driver: Arc<dyn Driver>) -> Result<(), DriverError> {
        let mut drivers = self.drivers.write();
        let bus = driver.get_bus();
        let clash = drivers.iter().filter(|x| x.get_bus() == bus).any(|x| {
            x.get_name() == driver.get_name()
                || x
                    .get_match_keys()
                    .iter()
                    .any(|key| driver.get_match_keys().contains(key))
        });
        if clash {
            warn!("Driver '{}' clashes with a registered {} driver.", driver.get_name(), bus);
            return Err(DriverError::DuplicateDriver);
        }
        driver.on_registered();
        drivers.push(driver.clone());
        info!("Registered {} driver '{}'.", bus, driver.get_name());

        for slot in self.slots() {
            let mut slot = slot.lock();
            if slot.bound.is_some() || !driver.matches(&slot.dev) {
                continue;
            }
            // First-match-wins still applies to deferred devices.
            let first = drivers.iter().find(|x| x.matches(&slot.dev));
            if !first.is_some_and(|x| Arc::ptr_eq(x, &driver)) {
                continue;
            }
            if let Err(err) = self.bind(&driver, &mut slot) {
                warn!("Deferred bind of '{}' failed: {}.", slot.dev.id, err);
            }
        }
        Ok(())
    }

    /// Unbind every device bound to `name` on `bus`, then forget the driver.
    ///
    /// Return how many devices were unbound. They stay present.
    pub fn unregister_driver(&self, bus: BusType, name: &str) -> Result<usize, DriverError> {
        let mut drivers = self.drivers.write();
        let index = drivers
            .iter()
            .position(|x| x.get_bus() == bus && x.get_name() == name)
            .ok_or(DriverError::NoMatchingDriver)?;
        let driver = drivers.remove(index);
        let mut count = 0;
        for slot in self.slots() {
            let mut slot = slot.lock();
            if slot
                .bound
                .as_ref()
                .is_some_and(|x| Arc::ptr_eq(&x.driver, &driver))
            {
                self.unbind(&mut slot);
                count += 1;
            }
        }
        info!("Unregistered {} driver '{}' ({} device(s) unbound).", bus, name, count);
        Ok(count)
    }

    pub fn driver_names(&self, bus: BusType) -> Vec<&'static str> {
        self.drivers
            .read()
            .iter()
            .filter(|x| x.get_bus() == bus)
            .map(|x| x.get_name())
            .collect()
    }

    // endregion

    // region: Device events

    /// A device became present. Bind it to the first matching driver.
    ///
    /// On [DriverError::NoMatchingDriver] the device stays present and binds once a matching
    /// driver registers. On a bind error everything the driver acquired is already released
    /// and the device stays present, unbound. A device that is already present is rejected
    /// with [DriverError::InvalidState].
    pub fn on_device_appeared(&self, dev: Device) -> Result<BindingRef, DriverError> {
        let drivers = self.drivers.read();
        let key = (dev.bus, dev.id.clone());
        let slot = {
            let mut devices = self.devices.lock();
            if devices.contains_key(&key) {
                warn!("Device '{}' is already present.", dev.id);
                return Err(DriverError::InvalidState);
            }
            let slot = Handle::from(Mutex::new(Slot { dev, bound: None }));
            devices.insert(key, slot.clone());
            slot
        };
        let mut slot = slot.lock();
        debug!("Device '{}' appeared on {}.", slot.dev.id, slot.dev.bus);
        let Some(driver) = drivers.iter().find(|x| x.matches(&slot.dev)) else {
            debug!("No driver for '{}' yet.", slot.dev.id);
            return Err(DriverError::NoMatchingDriver);
        };
        self.bind(driver, &mut slot)
    }

    /// A device went away. Unbind it if bound; an unknown or unbound device is a no-op.
    pub fn on_device_removed(&self, bus: BusType, id: &DeviceId) -> Result<(), DriverError> {
        let _drivers = self.drivers.read();
        let Some(slot) = self.devices.lock().remove(&(bus, id.clone())) else {
            debug!("Removal of absent device '{}' ignored.", id);
            return Ok(());
        };
        let mut slot = slot.lock();
        if slot.bound.is_some() {
            self.unbind(&mut slot);
        }
        debug!("Device '{}' removed from {}.", id, bus);
        Ok(())
    }

    /// Announce every tree node carrying `compatible` as a platform device.
    ///
    /// Return how many of them got bound.
    pub fn populate(&self, tree: &DeviceTree) -> usize {
        let mut bound = 0;
        for node in tree.walk() {
            if node.node_type != NodeType::Device {
                continue;
            }
            match self.on_device_appeared(Device::from_dt_node(node)) {
                Ok(_) => bound += 1,
                Err(DriverError::NoMatchingDriver) => {}
                Err(err) => warn!("Node '{}': {}.", tree.get_full_path(node), err),
            }
        }
        bound
    }

    // endregion

    fn slots(&self) -> Vec<Handle<Mutex<Slot>>> {
        self.devices.lock().values().cloned().collect()
    }

    fn bind(&self, driver: &Arc<dyn Driver>, slot: &mut Slot) -> Result<BindingRef, DriverError> {
        let mut binding = BusBinding::new(driver.get_name(), slot.dev.id.clone());
        if let Err(err) = driver.bind(&slot.dev, &self.ctx, &mut binding) {
            let count = binding.release_all();
            error!(
                "Driver '{}' failed to bind '{}': {}; released {} resource(s).",
                driver.get_name(),
                slot.dev.id,
                err,
                count
            );
            return Err(err);
        }
        binding.mark_bound();
        let handle = Handle::from(Mutex::new(binding));
        let res = handle.create_ref();
        slot.bound = Some(Bound {
            driver: driver.clone(),
            binding: handle,
        });
        info!("Bound '{}' to driver '{}'.", slot.dev.id, driver.get_name());
        Ok(res)
    }

    fn unbind(&self, slot: &mut Slot) {
        let Some(bound) = slot.bound.take() else {
            return;
        };
        let mut binding = bound.binding.lock();
        bound.driver.unbind(&slot.dev, &self.ctx, &mut binding);
        binding.release_all();
        info!("Unbound '{}' from driver '{}'.", slot.dev.id, bound.driver.get_name());
    }

    // region: Inspection

    pub fn is_present(&self, bus: BusType, id: &DeviceId) -> bool {
        self.devices.lock().contains_key(&(bus, id.clone()))
    }

    /// Live binding of a device, if it is bound.
    pub fn binding(&self, bus: BusType, id: &DeviceId) -> Option<BindingRef> {
        let slot = self.devices.lock().get(&(bus, id.clone()))?.clone();
        let slot = slot.lock();
        slot.bound.as_ref().map(|x| x.binding.create_ref())
    }

    pub fn bound_driver(&self, bus: BusType, id: &DeviceId) -> Option<&'static str> {
        let slot = self.devices.lock().get(&(bus, id.clone()))?.clone();
        let slot = slot.lock();
        slot.bound.as_ref().map(|x| x.driver.get_name())
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn bound_count(&self) -> usize {
        self.slots()
            .iter()
            .filter(|x| x.lock().bound.is_some())
            .count()
    }

    // endregion
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.drivers.read().len())
            .field("devices", &self.device_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::driver::MatchKey;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Probe {
        name: &'static str,
        keys: &'static [MatchKey],
        binds: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Probe {
        fn new(name: &'static str, keys: &'static [MatchKey]) -> Probe {
            Probe {
                name,
                keys,
                binds: Arc::new(AtomicUsize::new(0)),
                fail: false,
            }
        }
    }

    impl Driver for Probe {
        fn get_name(&self) -> &'static str {
            self.name
        }
        fn get_bus(&self) -> BusType {
            BusType::Platform
        }
        fn get_match_keys(&self) -> &[MatchKey] {
            self.keys
        }
        fn bind(&self, _dev: &Device, _ctx: &ProbeContext, binding: &mut BusBinding) -> Result<(), DriverError> {
            self.binds.fetch_add(1, Ordering::SeqCst);
            binding.on_release("token", || Ok(()));
            if self.fail {
                return Err(DriverError::AllocationFailed);
            }
            Ok(())
        }
    }

    fn registry() -> DriverRegistry {
        DriverRegistry::new(ProbeContext::default())
    }

    #[test]
    fn first_registered_driver_wins() {
        let reg = registry();
        let a = Probe::new("a", &[MatchKey::Name("dev")]);
        let b = Probe::new("b", &[MatchKey::Compatible("vendor,*")]);
        let (a_binds, b_binds) = (a.binds.clone(), b.binds.clone());
        reg.register_driver(Arc::new(a)).unwrap();
        reg.register_driver(Arc::new(b)).unwrap();
        let dev = Device::platform("dev", Some(0)).with_compatible(&["vendor,dev"]);
        let id = dev.id.clone();
        let binding = reg.on_device_appeared(dev).unwrap();
        assert_eq!(binding.get_handle().unwrap().lock().driver_name(), "a");
        assert_eq!(a_binds.load(Ordering::SeqCst), 1);
        assert_eq!(b_binds.load(Ordering::SeqCst), 0);
        reg.on_device_removed(BusType::Platform, &id).unwrap();
        assert!(!binding.is_alive());
    }

    #[test]
    fn duplicate_keys_are_rejected_per_bus() {
        let reg = registry();
        reg.register_driver(Arc::new(Probe::new("a", &[MatchKey::Name("dev")]))).unwrap();
        assert_eq!(
            reg.register_driver(Arc::new(Probe::new("b", &[MatchKey::Name("dev")]))),
            Err(DriverError::DuplicateDriver)
        );
        assert_eq!(
            reg.register_driver(Arc::new(Probe::new("a", &[MatchKey::Name("other")]))),
            Err(DriverError::DuplicateDriver)
        );
        assert_eq!(reg.driver_names(BusType::Platform), ["a"]);
    }

    #[test]
    fn removing_unknown_or_unbound_device_is_a_noop() {
        let reg = registry();
        let id = DeviceId::new("ghost", None);
        assert_eq!(reg.on_device_removed(BusType::Platform, &id), Ok(()));
        assert_eq!(
            reg.on_device_appeared(Device::platform("ghost", None)).err(),
            Some(DriverError::NoMatchingDriver)
        );
        assert!(reg.is_present(BusType::Platform, &id));
        assert_eq!(reg.on_device_removed(BusType::Platform, &id), Ok(()));
        assert!(!reg.is_present(BusType::Platform, &id));
    }

    #[test]
    fn late_driver_binds_waiting_device_and_unload_unbinds() {
        let reg = registry();
        let id = DeviceId::new("dev", Some(0));
        let _ = reg.on_device_appeared(Device::platform("dev", Some(0)));
        assert_eq!(reg.bound_count(), 0);
        reg.register_driver(Arc::new(Probe::new("a", &[MatchKey::Name("dev")]))).unwrap();
        assert_eq!(reg.bound_driver(BusType::Platform, &id), Some("a"));
        assert_eq!(reg.unregister_driver(BusType::Platform, "a"), Ok(1));
        assert!(reg.is_present(BusType::Platform, &id));
        assert!(reg.binding(BusType::Platform, &id).is_none());
        assert_eq!(
            reg.unregister_driver(BusType::Platform, "a"),
            Err(DriverError::NoMatchingDriver)
        );
    }

    #[test]
    fn failed_bind_leaves_device_unbound() {
        let reg = registry();
        let mut probe = Probe::new("a", &[MatchKey::Name("dev")]);
        probe.fail = true;
        reg.register_driver(Arc::new(probe)).unwrap();
        let res = reg.on_device_appeared(Device::platform("dev", None));
        assert_eq!(res.err(), Some(DriverError::AllocationFailed));
        assert_eq!(reg.bound_count(), 0);
        assert_eq!(reg.device_count(), 1);
    }

    #[test]
    fn device_cannot_appear_twice() {
        let reg = registry();
        reg.register_driver(Arc::new(Probe::new("a", &[MatchKey::Name("dev")]))).unwrap();
        reg.on_device_appeared(Device::platform("dev", None)).unwrap();
        assert_eq!(
            reg.on_device_appeared(Device::platform("dev", None)).err(),
            Some(DriverError::InvalidState)
        );
        assert_eq!(reg.bound_count(), 1);
    }

    #[test]
    fn populate_announces_compatible_nodes() {
        use dt::prop::Property;
        let reg = registry();
        reg.register_driver(Arc::new(Probe::new("m", &[MatchKey::Compatible("foo-master")])))
            .unwrap();
        let mut tree = DeviceTree::new();
        tree.add_node("/", "soc", vec![]).unwrap();
        for name in ["spi@1000", "spi@2000"] {
            tree.add_node("/soc", name, vec![Property::from_strlist("compatible", &["foo-master"])])
                .unwrap();
        }
        tree.add_node("/soc", "uart@3000", vec![Property::from_strlist("compatible", &["ns16550a"])])
            .unwrap();
        assert_eq!(reg.populate(&tree), 2);
        assert_eq!(reg.device_count(), 3);
    }
}
