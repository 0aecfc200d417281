use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, set_logger, set_max_level};

use crate::kprintln;

pub struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => 31, // Red
            Level::Warn => 93,  // BrightYellow
            Level::Info => 20,  // White
            Level::Debug => 32, // Green
            Level::Trace => 90, // BrightBlack
        };
        kprintln!(
            "\u{1B}[{}m[{:}] {}\u{1B}[0m",
            color,
            record.level(),
            record.args(),
        );
    }

    fn flush(&self) {}
}

/// Route the `log` facade to the console.
///
/// Fails if another logger is already installed; the level is applied either way.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    static LOGGER: Logger = Logger;
    set_max_level(level);
    set_logger(&LOGGER)
}

/// Improved debug macro,
/// only compiled in debug mode.
#[macro_export]
macro_rules! debug_ex {
    // debug_ex!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            use log::{log,Level};
            log!(target: $target, Level::Debug, $($arg)+)
        }
    };

    // debug_ex!("a {} event", "log")
    ($($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            use log::{log,Level};
            log!(Level::Debug, $($arg)+)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{ConsoleOut, set_output};
    use std::{string::String, sync::Mutex};

    struct Capture(Mutex<String>);
    impl ConsoleOut for Capture {
        fn put_str(&self, s: &str) {
            self.0.lock().unwrap().push_str(s);
        }
    }
    static CAPTURE: Capture = Capture(Mutex::new(String::new()));

    #[test]
    fn logger_writes_tagged_lines_to_console() {
        set_output(&CAPTURE);
        let _ = init(LevelFilter::Debug);
        log::warn!("probe of '{}' deferred", "foo_char");
        let out = CAPTURE.0.lock().unwrap();
        assert!(out.contains("[WARN] probe of 'foo_char' deferred"));
    }
}
