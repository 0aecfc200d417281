//! Character device framework.
//!
//! [ChrdevTable] owns the four kinds of kernel-managed state a character driver
//! acquires during bind, in this order:
//!
//! ```text
//! region  (major/minor numbers)  -> alloc_region     / unregister_region
//! class   (reference counted)    -> class_create     / class_destroy
//! cdev    (file-operation table) -> cdev_add         / cdev_del
//! node    (visible /dev entry)   -> device_create    / device_destroy
//! ```
//!
//! A node can only be published while its class, cdev and region are all live.
//! [endpoint::CharDeviceEndpoint] drives the sequence and records every undo step on a
//! [utils::ledger::ResourceLedger].

pub mod endpoint;
pub mod file;

use crate::{
    chrdev::file::{EndpointGate, FileOperations, OpenFile},
    error::DriverError,
    fault::{FaultInjector, FaultPoints},
};
use alloc::{boxed::Box, collections::btree_map::BTreeMap, sync::Arc, vec::Vec};
use config::build_flags::{CHRDEV_DYNAMIC_MAJOR_END, CHRDEV_DYNAMIC_MAJOR_START, CHRDEV_MAX_CLASSES};
use core::{fmt, ops::Range};
use log::{info, warn};
use spin::Mutex;
use utils::{ledger::ReleaseResult, range_set::SortedRangeSet};

/// Bits of a packed device number used by the minor.
pub const MINOR_BITS: u32 = 20;
const MINOR_MASK: u32 = (1 << MINOR_BITS) - 1;

/// Device number: major selects the driver, minor the instance it handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevNum {
    pub major: u32,
    pub minor: u32,
}

impl DevNum {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Pack as `dev_t`: 12-bit major, 20-bit minor.
    pub const fn encode(&self) -> u32 {
        ((self.major & 0xFFF) << MINOR_BITS) | (self.minor & MINOR_MASK)
    }

    pub const fn decode(dev: u32) -> Self {
        Self {
            major: dev >> MINOR_BITS,
            minor: dev & MINOR_MASK,
        }
    }
}

impl fmt::Display for DevNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Limits of a [ChrdevTable].
#[derive(Debug, Clone)]
pub struct ChrdevConfig {
    /// Majors handed out dynamically.
    pub majors: Range<usize>,
    /// Maximum number of live device classes.
    pub max_classes: usize,
}

impl Default for ChrdevConfig {
    fn default() -> Self {
        ChrdevConfig {
            majors: CHRDEV_DYNAMIC_MAJOR_START..CHRDEV_DYNAMIC_MAJOR_END,
            max_classes: CHRDEV_MAX_CLASSES,
        }
    }
}

#[derive(Debug)]
struct Region {
    name: Box<str>,
    base: DevNum,
    count: u32,
}

impl Region {
    fn contains(&self, devt: DevNum) -> bool {
        devt.major == self.base.major
            && devt.minor >= self.base.minor
            && devt.minor < self.base.minor + self.count
    }
}

#[derive(Clone)]
pub(crate) struct CdevEntry {
    pub ops: Arc<dyn FileOperations>,
    pub gate: Arc<EndpointGate>,
}

#[derive(Debug)]
struct NodeEntry {
    devt: DevNum,
    class: Box<str>,
}

struct ChrdevState {
    free_majors: SortedRangeSet,
    regions: BTreeMap<u32, Region>,
    classes: BTreeMap<Box<str>, usize>,
    cdevs: BTreeMap<DevNum, CdevEntry>,
    nodes: BTreeMap<Box<str>, NodeEntry>,
}

impl ChrdevState {
    fn region_of(&self, devt: DevNum) -> Option<&Region> {
        self.regions.get(&devt.major).filter(|x| x.contains(devt))
    }
}

/// Observable resource state of a [ChrdevTable], for comparing before and after a lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChrdevSnapshot {
    pub free_majors: usize,
    pub regions: Vec<(Box<str>, DevNum, u32)>,
    pub classes: Vec<(Box<str>, usize)>,
    pub cdevs: Vec<DevNum>,
    pub nodes: Vec<(Box<str>, DevNum)>,
}

pub struct ChrdevTable {
    state: Mutex<ChrdevState>,
    faults: FaultInjector,
    max_classes: usize,
}

impl ChrdevTable {
    pub fn new(config: ChrdevConfig) -> ChrdevTable {
        ChrdevTable {
            state: Mutex::new(ChrdevState {
                free_majors: SortedRangeSet::from_range(config.majors.clone()),
                regions: BTreeMap::new(),
                classes: BTreeMap::new(),
                cdevs: BTreeMap::new(),
                nodes: BTreeMap::new(),
            }),
            faults: FaultInjector::new(),
            max_classes: config.max_classes,
        }
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    // region: Number ranges

    /// Reserve `count` minors under a fresh major for `name`.
    ///
    /// A name may own one live region at a time; asking again before releasing fails.
    pub fn alloc_region(&self, name: &str, count: u32) -> Result<DevNum, DriverError> {
        if self.faults.trip(FaultPoints::REGION) || count == 0 || count > MINOR_MASK {
            return Err(DriverError::AllocationFailed);
        }
        let mut guard = self.state.lock();
        if guard.regions.values().any(|x| x.name.as_ref() == name) {
            warn!("Device number region '{}' is already reserved.", name);
            return Err(DriverError::AllocationFailed);
        }
        let major = guard
            .free_majors
            .take(1)
            .ok_or(DriverError::AllocationFailed)? as u32;
        let base = DevNum::new(major, 0);
        guard.regions.insert(
            major,
            Region {
                name: Box::from(name),
                base,
                count,
            },
        );
        info!("Allocated major number {} for '{}'.", major, name);
        Ok(base)
    }

    pub fn unregister_region(&self, base: DevNum, count: u32) -> ReleaseResult {
        let mut guard = self.state.lock();
        match guard.regions.get(&base.major) {
            Some(region) if region.base == base && region.count == count => {}
            _ => return Err("region not reserved"),
        }
        if guard.cdevs.keys().any(|x| x.major == base.major) {
            return Err("region still has a registered cdev");
        }
        guard.regions.remove(&base.major);
        guard
            .free_majors
            .add(base.major as usize..base.major as usize + 1);
        Ok(())
    }

    // endregion

    // region: Classes

    /// Create the class `name`, or take another reference to it if it exists.
    pub fn class_create(&self, name: &str) -> Result<(), DriverError> {
        if self.faults.trip(FaultPoints::CLASS) || name.is_empty() {
            return Err(DriverError::ClassCreateFailed);
        }
        let mut guard = self.state.lock();
        if let Some(refs) = guard.classes.get_mut(name) {
            *refs += 1;
            return Ok(());
        }
        if guard.classes.len() >= self.max_classes {
            warn!("Class table full; cannot create '{}'.", name);
            return Err(DriverError::ClassCreateFailed);
        }
        guard.classes.insert(Box::from(name), 1);
        Ok(())
    }

    pub fn class_destroy(&self, name: &str) -> ReleaseResult {
        let mut guard = self.state.lock();
        let refs = *guard.classes.get(name).ok_or("class not found")?;
        if refs > 1 {
            guard.classes.insert(Box::from(name), refs - 1);
            return Ok(());
        }
        if guard.nodes.values().any(|x| x.class.as_ref() == name) {
            return Err("class still has device nodes");
        }
        guard.classes.remove(name);
        Ok(())
    }

    // endregion

    // region: Character devices

    pub(crate) fn cdev_add(&self, devt: DevNum, entry: CdevEntry) -> Result<(), DriverError> {
        if self.faults.trip(FaultPoints::CDEV) {
            return Err(DriverError::RegistrationFailed);
        }
        let mut guard = self.state.lock();
        if guard.region_of(devt).is_none() || guard.cdevs.contains_key(&devt) {
            return Err(DriverError::RegistrationFailed);
        }
        guard.cdevs.insert(devt, entry);
        Ok(())
    }

    pub fn cdev_del(&self, devt: DevNum) -> ReleaseResult {
        let mut guard = self.state.lock();
        if guard.nodes.values().any(|x| x.devt == devt) {
            return Err("cdev still has a device node");
        }
        guard.cdevs.remove(&devt).map(|_| ()).ok_or("cdev not registered")
    }

    // endregion

    // region: Device nodes

    /// Publish the node `node_name` for `devt` under `class`.
    ///
    /// Fails unless the class, the number range and the cdev behind `devt` are all live.
    pub fn device_create(&self, class: &str, devt: DevNum, node_name: &str) -> Result<(), DriverError> {
        if self.faults.trip(FaultPoints::NODE) || node_name.is_empty() {
            return Err(DriverError::NodeCreateFailed);
        }
        let mut guard = self.state.lock();
        if !guard.classes.contains_key(class)
            || guard.region_of(devt).is_none()
            || !guard.cdevs.contains_key(&devt)
            || guard.nodes.contains_key(node_name)
        {
            return Err(DriverError::NodeCreateFailed);
        }
        guard.nodes.insert(
            Box::from(node_name),
            NodeEntry {
                devt,
                class: Box::from(class),
            },
        );
        Ok(())
    }

    pub fn device_destroy(&self, node_name: &str) -> ReleaseResult {
        self.state
            .lock()
            .nodes
            .remove(node_name)
            .map(|_| ())
            .ok_or("device node not found")
    }

    // endregion

    /// Open the published node `path` (`/dev/<name>` or `<name>`).
    pub fn open(&self, path: &str) -> Result<OpenFile, DriverError> {
        let name = path.strip_prefix("/dev/").unwrap_or(path);
        let (devt, entry) = {
            let guard = self.state.lock();
            let devt = guard.nodes.get(name).ok_or(DriverError::NoDevice)?.devt;
            let entry = guard.cdevs.get(&devt).ok_or(DriverError::NoDevice)?.clone();
            (devt, entry)
        };
        OpenFile::open(entry.ops, entry.gate, devt)
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.state.lock().nodes.contains_key(name)
    }

    pub fn node_devt(&self, name: &str) -> Option<DevNum> {
        self.state.lock().nodes.get(name).map(|x| x.devt)
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn snapshot(&self) -> ChrdevSnapshot {
        let guard = self.state.lock();
        ChrdevSnapshot {
            free_majors: guard.free_majors.len(),
            regions: guard
                .regions
                .values()
                .map(|x| (x.name.clone(), x.base, x.count))
                .collect(),
            classes: guard.classes.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            cdevs: guard.cdevs.keys().copied().collect(),
            nodes: guard
                .nodes
                .iter()
                .map(|(k, v)| (k.clone(), v.devt))
                .collect(),
        }
    }
}

impl Default for ChrdevTable {
    fn default() -> Self {
        Self::new(ChrdevConfig::default())
    }
}

impl fmt::Debug for ChrdevTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChrdevTable")
            .field("state", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;
    impl FileOperations for Nop {}

    fn entry() -> CdevEntry {
        CdevEntry {
            ops: Arc::new(Nop),
            gate: Arc::new(EndpointGate::new()),
        }
    }

    fn small() -> ChrdevTable {
        ChrdevTable::new(ChrdevConfig {
            majors: 240..242,
            max_classes: 1,
        })
    }

    #[test]
    fn devnum_packs_like_dev_t() {
        let devt = DevNum::new(240, 3);
        assert_eq!(devt.encode(), (240 << 20) | 3);
        assert_eq!(DevNum::decode(devt.encode()), devt);
        assert_eq!(format!("{}", devt), "240:3");
    }

    #[test]
    fn majors_are_exhaustible_and_recycled() {
        let table = small();
        let a = table.alloc_region("a", 1).unwrap();
        let b = table.alloc_region("b", 1).unwrap();
        assert_eq!((a.major, b.major), (240, 241));
        assert_eq!(table.alloc_region("c", 1), Err(DriverError::AllocationFailed));
        table.unregister_region(a, 1).unwrap();
        assert_eq!(table.alloc_region("c", 1).unwrap().major, 240);
    }

    #[test]
    fn same_name_cannot_hold_two_regions() {
        let table = small();
        table.alloc_region("foo_char", 1).unwrap();
        assert_eq!(table.alloc_region("foo_char", 1), Err(DriverError::AllocationFailed));
    }

    #[test]
    fn classes_are_reference_counted() {
        let table = small();
        table.class_create("spifoo").unwrap();
        table.class_create("spifoo").unwrap();
        assert_eq!(table.class_create("other"), Err(DriverError::ClassCreateFailed));
        table.class_destroy("spifoo").unwrap();
        assert_eq!(table.snapshot().classes, vec![(Box::<str>::from("spifoo"), 1)]);
        table.class_destroy("spifoo").unwrap();
        assert!(table.snapshot().classes.is_empty());
        assert!(table.class_destroy("spifoo").is_err());
    }

    #[test]
    fn cdev_requires_reserved_region() {
        let table = small();
        assert_eq!(
            table.cdev_add(DevNum::new(240, 0), entry()),
            Err(DriverError::RegistrationFailed)
        );
        let devt = table.alloc_region("x", 1).unwrap();
        table.cdev_add(devt, entry()).unwrap();
        assert_eq!(table.cdev_add(devt, entry()), Err(DriverError::RegistrationFailed));
        assert!(table.unregister_region(devt, 1).is_err());
    }

    #[test]
    fn node_requires_class_region_and_cdev() {
        let table = small();
        let devt = table.alloc_region("x", 1).unwrap();
        table.class_create("cls").unwrap();
        assert_eq!(
            table.device_create("cls", devt, "x"),
            Err(DriverError::NodeCreateFailed)
        );
        table.cdev_add(devt, entry()).unwrap();
        assert_eq!(
            table.device_create("nope", devt, "x"),
            Err(DriverError::NodeCreateFailed)
        );
        table.device_create("cls", devt, "x").unwrap();
        assert!(table.has_node("x"));
        assert_eq!(table.node_devt("x"), Some(devt));
        assert_eq!(
            table.device_create("cls", devt, "x"),
            Err(DriverError::NodeCreateFailed)
        );
    }

    #[test]
    fn open_unknown_node_fails() {
        let table = small();
        assert!(matches!(table.open("/dev/missing"), Err(DriverError::NoDevice)));
    }
}
