//! A serial logger implementation for the `log` crate.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::{log::Format, serial::SerialIO};

/// Writes log records straight to a serial port.
pub struct Logger<'a, S>
where
    S: SerialIO + Send,
{
    serial_port: S,
    target_filters: &'a [(&'a str, log::LevelFilter)],
    max_level: log::LevelFilter,
    format: Format,
}

impl<'a, S> Logger<'a, S>
where
    S: SerialIO + Send,
{
    /// Creates a logger. `target_filters` overrides `max_level` for targets starting with the given prefix.
    pub const fn new(
        format: Format,
        target_filters: &'a [(&'a str, log::LevelFilter)],
        max_level: log::LevelFilter,
        serial_port: S,
    ) -> Self {
        Self { serial_port, target_filters, max_level, format }
    }

    /// Initializes the underlying serial port.
    pub fn init(&self) {
        self.serial_port.init();
    }
}

impl<S> log::Log for Logger<'_, S>
where
    S: SerialIO + Send,
{
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level().to_level_filter()
            <= *self
                .target_filters
                .iter()
                .find(|(name, _)| metadata.target().starts_with(name))
                .map(|(_, level)| level)
                .unwrap_or(&self.max_level)
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let mut writer = LogWriter { serial_port: &self.serial_port };
            // A failed serial write has nowhere to be reported.
            let _ = self.format.write(&mut writer, record);
        }
    }

    fn flush(&self) {}
}

/// A wrapper for handling log writes to a serial IO object.
struct LogWriter<'a, S>
where
    S: SerialIO + Send,
{
    serial_port: &'a S,
}

impl<S> core::fmt::Write for LogWriter<'_, S>
where
    S: SerialIO + Send,
{
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.serial_port.write(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use log::Log;
    use std::{sync::Mutex, vec::Vec};

    #[derive(Default)]
    struct RecordingSerial {
        bytes: Mutex<Vec<u8>>,
    }

    impl SerialIO for RecordingSerial {
        fn init(&self) {}

        fn write(&self, buffer: &[u8]) {
            self.bytes.lock().unwrap().extend_from_slice(buffer);
        }

        fn read(&self) -> u8 {
            0
        }

        fn try_read(&self) -> Option<u8> {
            None
        }
    }

    fn metadata(target: &str, level: log::Level) -> log::Metadata<'_> {
        log::Metadata::builder().target(target).level(level).build()
    }

    #[test]
    fn test_target_filters_override_max_level() {
        let logger = Logger::new(
            Format::Standard,
            &[("mm_comm", log::LevelFilter::Error)],
            log::LevelFilter::Debug,
            RecordingSerial::default(),
        );

        assert!(!logger.enabled(&metadata("mm_comm", log::Level::Warn)));
        assert!(logger.enabled(&metadata("mm_comm", log::Level::Error)));
        assert!(logger.enabled(&metadata("fsp_boot", log::Level::Debug)));
        assert!(!logger.enabled(&metadata("fsp_boot", log::Level::Trace)));
    }

    #[test]
    fn test_log_writes_enabled_records_only() {
        let logger = Logger::new(Format::Standard, &[], log::LevelFilter::Error, RecordingSerial::default());
        logger.log(
            &log::Record::builder().args(format_args!("halted")).level(log::Level::Error).target("fsp_boot").build(),
        );
        logger.log(
            &log::Record::builder().args(format_args!("ignored")).level(log::Level::Info).target("fsp_boot").build(),
        );

        let written = logger.serial_port.bytes.lock().unwrap().clone();
        assert_eq!(written, b"ERROR - halted\n");
    }
}
