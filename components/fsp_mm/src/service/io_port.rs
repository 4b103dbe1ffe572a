//! Legacy I/O port access.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

fsp_sdk::if_x64! {
    use x86_64::instructions::port::Port;
}

/// PCI configuration address port.
pub const PCI_CONFIG_ADDRESS: u16 = 0xCF8;

/// PCI configuration data port.
pub const PCI_CONFIG_DATA: u16 = 0xCFC;

/// Reads and writes I/O ports.
///
/// ## Safety
///
/// Port writes change chipset state. Implementations must only be handed ports the caller owns.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub unsafe trait IoPort {
    fn read16(&self, port: u16) -> u16;
    fn read32(&self, port: u16) -> u32;
    fn write8(&self, port: u16, value: u8);
    fn write16(&self, port: u16, value: u16);
    fn write32(&self, port: u16, value: u32);
}

/// Address of a PCI configuration register for the `0xCF8`/`0xCFC` access mechanism.
pub const fn pci_config_address(bus: u8, device: u8, function: u8, register: u8) -> u32 {
    0x8000_0000
        | ((bus as u32) << 16)
        | (((device & 0x1F) as u32) << 11)
        | (((function & 0x7) as u32) << 8)
        | (register & 0xFC) as u32
}

/// Reads a 32-bit PCI configuration register.
pub fn pci_read32(io: &dyn IoPort, bus: u8, device: u8, function: u8, register: u8) -> u32 {
    io.write32(PCI_CONFIG_ADDRESS, pci_config_address(bus, device, function, register));
    io.read32(PCI_CONFIG_DATA)
}

/// ORs `bits` into a 16-bit PCI configuration register.
pub fn pci_or16(io: &dyn IoPort, bus: u8, device: u8, function: u8, register: u8, bits: u16) {
    let data_port = PCI_CONFIG_DATA + (register & 0x2) as u16;
    io.write32(PCI_CONFIG_ADDRESS, pci_config_address(bus, device, function, register));
    let value = io.read16(data_port);
    io.write32(PCI_CONFIG_ADDRESS, pci_config_address(bus, device, function, register));
    io.write16(data_port, value | bits);
}

fsp_sdk::if_x64! {
    /// Port access through the `in`/`out` instructions.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct HardwareIo;

    unsafe impl IoPort for HardwareIo {
        fn read16(&self, port: u16) -> u16 {
            unsafe { Port::<u16>::new(port).read() }
        }

        fn read32(&self, port: u16) -> u32 {
            unsafe { Port::<u32>::new(port).read() }
        }

        fn write8(&self, port: u16, value: u8) {
            unsafe { Port::<u8>::new(port).write(value) }
        }

        fn write16(&self, port: u16, value: u16) {
            unsafe { Port::<u16>::new(port).write(value) }
        }

        fn write32(&self, port: u16, value: u32) {
            unsafe { Port::<u32>::new(port).write(value) }
        }
    }
}
