//! [SerialIO](crate::serial::SerialIO) implementation that discards all output.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// A null (stub) device that does nothing.
#[derive(Debug, Default)]
pub struct Uart {}

impl super::SerialIO for Uart {
    fn init(&self) {}

    fn write(&self, _buffer: &[u8]) {}

    fn read(&self) -> u8 {
        // Nothing will ever arrive; blocking forever would hang the caller silently.
        panic!("read from null serial device");
    }

    fn try_read(&self) -> Option<u8> {
        None
    }
}
