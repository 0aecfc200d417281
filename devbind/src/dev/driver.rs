//! Driver capability and match rules.
//!
//! A [Driver] declares which devices it handles through [MatchKey]s and implements
//! [Driver::bind] / [Driver::unbind]. It never keeps per-device state itself: everything a
//! bind acquires lives in the [BusBinding] handed to it, so the registry can tear a device
//! down without the driver's cooperation.
use crate::{
    dev::{
        binding::BusBinding,
        context::ProbeContext,
        device::{BusType, Device},
    },
    error::DriverError,
};
use core::fmt::Debug;

/// Rule deciding whether a driver handles a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKey {
    /// Exact device name (platform `name`, SPI `modalias`).
    Name(&'static str),
    /// Pattern checked against every `compatible` entry. `*` matches any run of characters.
    Compatible(&'static str),
}

impl MatchKey {
    pub fn matches(&self, dev: &Device) -> bool {
        match self {
            MatchKey::Name(name) => dev.id.name.as_ref() == *name,
            MatchKey::Compatible(pattern) => dev.compatible().iter().any(|x| glob_match(pattern, x)),
        }
    }
}

/// Match `text` against `pattern`, where `*` stands for any (possibly empty) substring.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let (p, t) = (pattern.as_bytes(), text.as_bytes());
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star, from)) = backtrack {
            pi = star + 1;
            ti = from + 1;
            backtrack = Some((star, from + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|x| *x == b'*')
}

/// Trait implemented by drivers.
///
/// - [Driver::get_match_keys] lists the rules tried, in order, against each device on
///   [Driver::get_bus]. Keys must be unique within a bus.
/// - [Driver::bind] acquires resources for one device, recording every undo step on
///   `binding`. On error the registry unwinds whatever was recorded.
/// - [Driver::unbind] runs before the registry unwinds the binding on removal; most drivers
///   have nothing to do there.
pub trait Driver: Send + Sync + Debug {
    fn get_name(&self) -> &'static str;
    fn get_bus(&self) -> BusType;
    fn get_match_keys(&self) -> &[MatchKey];
    fn bind(&self, dev: &Device, ctx: &ProbeContext, binding: &mut BusBinding) -> Result<(), DriverError>;
    fn unbind(&self, _dev: &Device, _ctx: &ProbeContext, _binding: &mut BusBinding) {}
    fn on_registered(&self) {}

    fn matches(&self, dev: &Device) -> bool {
        dev.bus == self.get_bus() && self.get_match_keys().iter().any(|x| x.matches(dev))
    }
}
