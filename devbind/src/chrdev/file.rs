//! File operations and open-file state for published device nodes.

use crate::{chrdev::DevNum, error::DriverError};
use alloc::sync::Arc;
use core::fmt;
use log::debug;
use spin::Mutex;

/// Hooks a character driver binds to its number range.
///
/// Every hook runs with the endpoint's I/O gate held, so at most one call per endpoint is
/// in flight. Hooks left at their default are reported as [DriverError::Unsupported].
pub trait FileOperations: Send + Sync {
    fn open(&self, _file: &mut FileState) -> Result<(), DriverError> {
        Ok(())
    }
    fn release(&self, _file: &mut FileState) {}
    fn read(&self, _file: &mut FileState, _buf: &mut [u8]) -> Result<usize, DriverError> {
        Err(DriverError::Unsupported)
    }
    fn write(&self, _file: &mut FileState, _buf: &[u8]) -> Result<usize, DriverError> {
        Err(DriverError::Unsupported)
    }
}

/// Per-open state handed to [FileOperations] hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileState {
    pub devt: DevNum,
    /// Current file position (`f_pos`).
    pub pos: u64,
}

/// Serializes I/O on one endpoint and fences it against teardown.
///
/// Holding the lock means an operation is in flight. [EndpointGate::shut] takes the lock, so it
/// waits for the in-flight operation and everything queued behind it sees a dead endpoint.
#[derive(Debug)]
pub struct EndpointGate {
    live: Mutex<bool>,
}

impl EndpointGate {
    pub const fn new() -> EndpointGate {
        EndpointGate {
            live: Mutex::new(true),
        }
    }

    pub fn is_live(&self) -> bool {
        *self.live.lock()
    }

    pub fn shut(&self) {
        *self.live.lock() = false;
    }

    fn with<R>(&self, f: impl FnOnce() -> Result<R, DriverError>) -> Result<R, DriverError> {
        let guard = self.live.lock();
        if !*guard {
            return Err(DriverError::NoDevice);
        }
        let res = f();
        drop(guard);
        res
    }
}

impl Default for EndpointGate {
    fn default() -> Self {
        Self::new()
    }
}

/// An open device node. Dropping it runs the release hook.
pub struct OpenFile {
    ops: Arc<dyn FileOperations>,
    gate: Arc<EndpointGate>,
    state: FileState,
}

impl OpenFile {
    pub(crate) fn open(
        ops: Arc<dyn FileOperations>,
        gate: Arc<EndpointGate>,
        devt: DevNum,
    ) -> Result<OpenFile, DriverError> {
        let mut state = FileState { devt, pos: 0 };
        gate.with(|| ops.open(&mut state))?;
        debug!("Opened device {}.", devt);
        Ok(OpenFile { ops, gate, state })
    }

    /// Read up to `buf.len()` bytes. `Ok(0)` means end of data.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, DriverError> {
        let OpenFile { ops, gate, state } = self;
        gate.with(|| ops.read(state, buf))
    }

    /// Write `buf`, returning how many bytes the driver accepted.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, DriverError> {
        let OpenFile { ops, gate, state } = self;
        gate.with(|| ops.write(state, buf))
    }

    pub fn position(&self) -> u64 {
        self.state.pos
    }

    pub fn devt(&self) -> DevNum {
        self.state.devt
    }

    pub fn close(self) {}
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        let OpenFile { ops, gate, state } = self;
        // The release hook still runs after the endpoint went away; only its I/O is fenced.
        let _guard = gate.live.lock();
        ops.release(state);
        debug!("Closed device {}.", state.devt);
    }
}

impl fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFile").field("state", &self.state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        opens: AtomicUsize,
        releases: AtomicUsize,
    }
    impl FileOperations for Counting {
        fn open(&self, _file: &mut FileState) -> Result<(), DriverError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn release(&self, _file: &mut FileState) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        fn read(&self, file: &mut FileState, _buf: &mut [u8]) -> Result<usize, DriverError> {
            file.pos += 1;
            Ok(0)
        }
    }

    #[test]
    fn hooks_run_and_release_on_drop() {
        let ops = Arc::new(Counting::default());
        let gate = Arc::new(EndpointGate::new());
        let mut file = OpenFile::open(ops.clone(), gate, DevNum::new(240, 0)).unwrap();
        assert_eq!(file.read(&mut [0u8; 4]), Ok(0));
        assert_eq!(file.position(), 1);
        assert_eq!(file.write(b"x"), Err(DriverError::Unsupported));
        file.close();
        assert_eq!(ops.opens.load(Ordering::SeqCst), 1);
        assert_eq!(ops.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shut_gate_fences_io() {
        let ops = Arc::new(Counting::default());
        let gate = Arc::new(EndpointGate::new());
        let mut file = OpenFile::open(ops.clone(), gate.clone(), DevNum::new(240, 0)).unwrap();
        gate.shut();
        assert_eq!(file.read(&mut [0u8; 1]), Err(DriverError::NoDevice));
        assert!(matches!(
            OpenFile::open(ops.clone(), gate, DevNum::new(240, 0)),
            Err(DriverError::NoDevice)
        ));
        drop(file);
        assert_eq!(ops.releases.load(Ordering::SeqCst), 1);
    }
}
