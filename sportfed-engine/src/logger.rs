use chrono::Local;
use log::{set_logger, set_max_level, LevelFilter, Log, Metadata, Record};

/// Installs the global logger with the given maximum `level`.
///
/// Panics when called more than once.
pub fn init(level: LevelFilter) {
    set_logger(&Logger).unwrap();
    set_max_level(level);
}

#[derive(Copy, Clone, Debug)]
pub struct Logger;

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S");

        println!(
            "[{}] [{}] [{}] {}",
            now,
            record.target(),
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {}
}
