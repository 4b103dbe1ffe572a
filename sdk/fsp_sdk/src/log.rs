//! Serial logging for the boot stages.
//!
//! ## Examples
//!
//! ```rust ignore
//! use fsp_sdk::log::{Format, SerialLogger};
//! use fsp_sdk::serial::Uart16550;
//!
//! static LOGGER: SerialLogger<Uart16550> = SerialLogger::new(
//!    Format::Standard,
//!    &[("mm_comm", log::LevelFilter::Info)],
//!    log::LevelFilter::Debug,
//!    Uart16550::Io { base: 0x3F8 },
//! );
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

mod serial_logger;
pub use serial_logger::Logger as SerialLogger;

/// Error-level bit of the firmware debug print mask.
pub const DEBUG_ERROR: u32 = 0x8000_0000;
/// Warning-level bit of the firmware debug print mask.
pub const DEBUG_WARN: u32 = 0x0000_0002;
/// Informational bit of the firmware debug print mask.
pub const DEBUG_INFO: u32 = 0x0000_0040;
/// Verbose bit of the firmware debug print mask.
pub const DEBUG_VERBOSE: u32 = 0x0040_0000;

/// Maps a firmware debug print mask onto the most verbose `log` level it enables.
pub fn level_filter_from_print_mask(mask: u32) -> log::LevelFilter {
    if mask & DEBUG_VERBOSE != 0 {
        log::LevelFilter::Trace
    } else if mask & DEBUG_INFO != 0 {
        log::LevelFilter::Info
    } else if mask & DEBUG_WARN != 0 {
        log::LevelFilter::Warn
    } else if mask & DEBUG_ERROR != 0 {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Off
    }
}

/// Enum to describe the format of the log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Standard text format containing the log level and message.
    Standard,
    /// JSON blob containing the log level and message.
    Json,
    /// Verbose JSON blob containing the log level, message, target, and file path and line number.
    VerboseJson,
}

impl Format {
    /// Formats the log message and writes it to the target.
    ///
    /// Runs before any allocator exists, so nothing here may build a `String`.
    pub fn write<T: core::fmt::Write>(&self, target: &mut T, record: &log::Record) -> core::fmt::Result {
        match self {
            Format::Standard if record.level() == log::Level::Trace => writeln!(
                target,
                "TRACE - {}:{}: {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            ),
            Format::Standard => writeln!(target, "{} - {}", record.level(), record.args()),
            Format::Json => {
                writeln!(target, "{{\"level\": \"{}\", \"message\": \"{}\"}}", record.level(), record.args())
            }
            Format::VerboseJson => writeln!(
                target,
                "{{\"level\": \"{}\", \"target\": \"{}\", \"message\": \"{}\", \"file\": \"{}\", \"line\": \"{}\"}}",
                record.level(),
                record.target(),
                record.args(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0)
            ),
        }
    }
}
