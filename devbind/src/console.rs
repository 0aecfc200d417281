//! Console sink for log output.
//!
//! The host installs one [ConsoleOut] with [set_output]; until then everything printed is dropped.

use core::fmt::{Arguments, Write};
use spin::Once;

/// Destination of console text, e.g. a serial port or the host's stderr.
pub trait ConsoleOut: Sync {
    fn put_str(&self, s: &str);
}

static OUTPUT: Once<&'static dyn ConsoleOut> = Once::new();

/// Install the console sink. Return `false` if one was already installed.
pub fn set_output(out: &'static dyn ConsoleOut) -> bool {
    let mut installed = false;
    OUTPUT.call_once(|| {
        installed = true;
        out
    });
    installed
}

struct SerialOut;

impl Write for SerialOut {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        if let Some(out) = OUTPUT.get() {
            out.put_str(s);
        }
        Ok(())
    }
}

pub fn serial_print(args: Arguments) {
    // SerialOut never reports an error.
    let _ = SerialOut.write_fmt(args);
}

#[macro_export]
/// print string macro
macro_rules! kprint {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::serial_print(format_args!($fmt $(, $($arg)+)?));
    }
}

#[macro_export]
macro_rules! kprintln {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::serial_print(format_args!(concat!($fmt, "\n") $(, $($arg)+)?));   // Use LF instead of CR-LF
    }
}
