//! Character device endpoint: the four-step acquisition behind a published node.

use crate::{
    chrdev::{
        CdevEntry, ChrdevTable, DevNum,
        file::{EndpointGate, FileOperations},
    },
    error::DriverError,
};
use alloc::{boxed::Box, sync::Arc};
use log::{debug, error, info};
use utils::ledger::ResourceLedger;

/// Names an endpoint is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSpec<'a> {
    /// Owner of the device-number range.
    pub device_name: &'a str,
    /// Class the node is created under; shared between endpoints.
    pub class_name: &'a str,
    /// Visible node, opened as `/dev/<node_name>`.
    pub node_name: &'a str,
}

/// A live character endpoint.
///
/// Its node is visible exactly while the number range, the class and the cdev are all live;
/// [CharDeviceEndpoint::acquire] only publishes it after the other three succeeded, and the
/// release actions withdraw it first.
#[derive(Debug)]
pub struct CharDeviceEndpoint {
    table: Arc<ChrdevTable>,
    devt: DevNum,
    device_name: Box<str>,
    class_name: Box<str>,
    node_name: Box<str>,
    gate: Arc<EndpointGate>,
}

impl CharDeviceEndpoint {
    /// Reserve a range, create the class, bind `ops` and publish the node.
    ///
    /// Each step records its undo on `ledger`. When a step fails the whole ledger is unwound
    /// before the error is returned, so nothing from this attempt stays live.
    pub fn acquire(
        table: &Arc<ChrdevTable>,
        ledger: &mut ResourceLedger,
        spec: EndpointSpec<'_>,
        ops: Arc<dyn FileOperations>,
    ) -> Result<CharDeviceEndpoint, DriverError> {
        let res = Self::try_acquire(table, ledger, spec, ops);
        if let Err(err) = &res {
            error!("Failed to set up endpoint '{}': {}.", spec.device_name, err);
            let count = ledger.unwind_all();
            debug!("Unwound {} step(s) for '{}'.", count, spec.device_name);
        }
        res
    }

    fn try_acquire(
        table: &Arc<ChrdevTable>,
        ledger: &mut ResourceLedger,
        spec: EndpointSpec<'_>,
        ops: Arc<dyn FileOperations>,
    ) -> Result<CharDeviceEndpoint, DriverError> {
        // 1. Number range, one minor.
        let devt = table.alloc_region(spec.device_name, 1)?;
        let t = table.clone();
        ledger.push("chrdev region", move || t.unregister_region(devt, 1));
        debug!("\tReserved {} for '{}'.", devt, spec.device_name);

        // 2. Class.
        table.class_create(spec.class_name)?;
        let t = table.clone();
        let class_name: Box<str> = Box::from(spec.class_name);
        let name = class_name.clone();
        ledger.push("device class", move || t.class_destroy(&name));
        debug!("\tClass '{}' ready.", spec.class_name);

        // 3. File operations.
        let gate = Arc::new(EndpointGate::new());
        table.cdev_add(
            devt,
            CdevEntry {
                ops,
                gate: gate.clone(),
            },
        )?;
        let t = table.clone();
        ledger.push("cdev", move || t.cdev_del(devt));
        debug!("\tBound file operations to {}.", devt);

        // 4. Visible node.
        table.device_create(spec.class_name, devt, spec.node_name)?;
        let t = table.clone();
        let node_name: Box<str> = Box::from(spec.node_name);
        let name = node_name.clone();
        let g = gate.clone();
        ledger.push("device node", move || {
            g.shut();
            t.device_destroy(&name)
        });
        info!("Published /dev/{} ({}).", spec.node_name, devt);

        Ok(CharDeviceEndpoint {
            table: table.clone(),
            devt,
            device_name: Box::from(spec.device_name),
            class_name,
            node_name,
            gate,
        })
    }

    /// Withdraw the node and give back everything recorded on `ledger`, newest first.
    ///
    /// Return how many release actions ran.
    pub fn release(self, ledger: &mut ResourceLedger) -> usize {
        let count = ledger.unwind_all();
        info!("Released endpoint '{}' ({} step(s)).", self.device_name, count);
        count
    }

    pub fn devt(&self) -> DevNum {
        self.devt
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Whether the node is still published and accepting I/O.
    pub fn is_live(&self) -> bool {
        self.gate.is_live() && self.table.node_devt(&self.node_name) == Some(self.devt)
    }
}
