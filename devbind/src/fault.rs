//! One-shot fault injection for acquisition steps and transfers.
//!
//! Arm a [FaultPoints] set on a [FaultInjector]; the next operation passing through an
//! armed point fails as if the underlying resource were exhausted, and the point disarms.
use bitflags::bitflags;
use log::debug;
use spin::Mutex;

bitflags! {
    pub struct FaultPoints: u8 {
        /// Device-number range reservation.
        const REGION    = 0b00001;
        /// Device class creation.
        const CLASS     = 0b00010;
        /// File-operation table registration.
        const CDEV      = 0b00100;
        /// Visible node publication.
        const NODE      = 0b01000;
        /// Synchronous bus exchange.
        const TRANSFER  = 0b10000;
    }
}

#[derive(Debug)]
pub struct FaultInjector {
    armed: Mutex<FaultPoints>,
}

impl FaultInjector {
    pub const fn new() -> FaultInjector {
        FaultInjector {
            armed: Mutex::new(FaultPoints::empty()),
        }
    }

    pub fn arm(&self, points: FaultPoints) {
        self.armed.lock().insert(points);
    }

    pub fn disarm_all(&self) {
        *self.armed.lock() = FaultPoints::empty();
    }

    pub fn armed(&self) -> FaultPoints {
        *self.armed.lock()
    }

    /// Consume `point` if armed. Return whether the caller must fail.
    pub fn trip(&self, point: FaultPoints) -> bool {
        let mut guard = self.armed.lock();
        if guard.contains(point) {
            guard.remove(point);
            debug!("Injected fault at {:?}.", point);
            true
        } else {
            false
        }
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_are_one_shot() {
        let faults = FaultInjector::new();
        faults.arm(FaultPoints::CLASS | FaultPoints::NODE);
        assert!(!faults.trip(FaultPoints::REGION));
        assert!(faults.trip(FaultPoints::CLASS));
        assert!(!faults.trip(FaultPoints::CLASS));
        assert_eq!(faults.armed(), FaultPoints::NODE);
        faults.disarm_all();
        assert!(!faults.trip(FaultPoints::NODE));
    }
}
