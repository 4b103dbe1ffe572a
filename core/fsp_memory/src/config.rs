//! Memory layout configuration.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_sdk::base::SIZE_16MB;

/// Platform constants used when carving low memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLayoutConfig {
    /// TSEG size used when the chipset does not report an extended TSEG.
    pub default_tseg_size: u32,
    /// Size of the region handed to the FSP as permanent PEI memory, just below TSEG.
    pub fsp_reserved_memory_length: u32,
    /// Memory address space width used for the CPU HOB when CPUID cannot report one.
    pub fallback_physical_address_bits: u8,
    /// I/O address space width published in the CPU HOB.
    pub io_space_bits: u8,
}

impl Default for MemoryLayoutConfig {
    fn default() -> Self {
        Self {
            default_tseg_size: SIZE_16MB as u32,
            fsp_reserved_memory_length: 0x0040_0000,
            fallback_physical_address_bits: 36,
            io_space_bits: 16,
        }
    }
}
