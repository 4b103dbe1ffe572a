//! [SerialIO](crate::serial::SerialIO) implementation for an I/O mapped 16550 UART.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use uart_16550::SerialPort;
use x86_64::instructions::interrupts;

/// A 16550 UART reached through legacy I/O ports.
#[derive(Debug)]
pub enum Uart {
    /// The UART register block starts at I/O port `base`.
    Io { base: u16 },
}

impl Uart {
    fn port(&self) -> SerialPort {
        match self {
            // SAFETY: the platform owns the UART at `base` for the lifetime of the boot loader.
            Uart::Io { base } => unsafe { SerialPort::new(*base) },
        }
    }
}

impl super::SerialIO for Uart {
    fn init(&self) {
        self.port().init();
    }

    fn write(&self, buffer: &[u8]) {
        let mut serial_port = self.port();
        interrupts::without_interrupts(|| {
            for b in buffer {
                serial_port.send(*b);
            }
        });
    }

    fn read(&self) -> u8 {
        self.port().receive()
    }

    fn try_read(&self) -> Option<u8> {
        self.port().try_receive().ok()
    }
}
