//! [SerialIO](crate::serial::SerialIO) implementation backed by the host's standard streams.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::io::{Read, Write};

/// Writes to stdout and reads from stdin.
#[derive(Debug, Default)]
pub struct Terminal {}

impl super::SerialIO for Terminal {
    fn init(&self) {}

    fn write(&self, buffer: &[u8]) {
        let _ = std::io::stdout().write_all(buffer);
    }

    fn read(&self) -> u8 {
        let buffer = &mut [0u8; 1];
        match std::io::stdin().read_exact(buffer) {
            Ok(()) => buffer[0],
            Err(err) => panic!("stdin closed: {err}"),
        }
    }

    fn try_read(&self) -> Option<u8> {
        let buffer = &mut [0u8; 1];
        match std::io::stdin().read(buffer) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(buffer[0]),
        }
    }
}
