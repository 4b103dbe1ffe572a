//! Stage GDT.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use x86_64::structures::gdt::DescriptorFlags;

pub const STAGE_GDT_ENTRY_COUNT: usize = 7;

// 0xcf92000000ffff
pub const LINEAR_DATA_SEL: DescriptorFlags = DescriptorFlags::from_bits_truncate(
    DescriptorFlags::LIMIT_0_15.bits()
        | DescriptorFlags::WRITABLE.bits()
        | DescriptorFlags::USER_SEGMENT.bits()
        | DescriptorFlags::PRESENT.bits()
        | DescriptorFlags::LIMIT_16_19.bits()
        | DescriptorFlags::DEFAULT_SIZE.bits()
        | DescriptorFlags::GRANULARITY.bits(),
);

// 0xcf9b000000ffff
pub const LINEAR_CODE_SEL: DescriptorFlags = DescriptorFlags::from_bits_truncate(
    DescriptorFlags::LIMIT_0_15.bits()
        | DescriptorFlags::ACCESSED.bits()
        | DescriptorFlags::WRITABLE.bits()
        | DescriptorFlags::EXECUTABLE.bits()
        | DescriptorFlags::USER_SEGMENT.bits()
        | DescriptorFlags::PRESENT.bits()
        | DescriptorFlags::LIMIT_16_19.bits()
        | DescriptorFlags::DEFAULT_SIZE.bits()
        | DescriptorFlags::GRANULARITY.bits(),
);

// 0xcf93000000ffff
pub const SYS_DATA_SEL: DescriptorFlags = DescriptorFlags::from_bits_truncate(
    DescriptorFlags::LIMIT_0_15.bits()
        | DescriptorFlags::ACCESSED.bits()
        | DescriptorFlags::WRITABLE.bits()
        | DescriptorFlags::USER_SEGMENT.bits()
        | DescriptorFlags::PRESENT.bits()
        | DescriptorFlags::LIMIT_16_19.bits()
        | DescriptorFlags::DEFAULT_SIZE.bits()
        | DescriptorFlags::GRANULARITY.bits(),
);

// 0xaf9b000000ffff
pub const LINEAR_CODE64_SEL: DescriptorFlags = DescriptorFlags::from_bits_truncate(
    DescriptorFlags::LIMIT_0_15.bits()
        | DescriptorFlags::ACCESSED.bits()
        | DescriptorFlags::WRITABLE.bits()
        | DescriptorFlags::EXECUTABLE.bits()
        | DescriptorFlags::USER_SEGMENT.bits()
        | DescriptorFlags::PRESENT.bits()
        | DescriptorFlags::LIMIT_16_19.bits()
        | DescriptorFlags::LONG_MODE.bits()
        | DescriptorFlags::GRANULARITY.bits(),
);

// 0x9b000000ffff
pub const CODE16_SEL: DescriptorFlags = DescriptorFlags::from_bits_truncate(
    DescriptorFlags::LIMIT_0_15.bits()
        | DescriptorFlags::ACCESSED.bits()
        | DescriptorFlags::WRITABLE.bits()
        | DescriptorFlags::EXECUTABLE.bits()
        | DescriptorFlags::USER_SEGMENT.bits()
        | DescriptorFlags::PRESENT.bits(),
);

// 0x92000000ffff
pub const DATA16_SEL: DescriptorFlags = DescriptorFlags::from_bits_truncate(
    DescriptorFlags::LIMIT_0_15.bits()
        | DescriptorFlags::WRITABLE.bits()
        | DescriptorFlags::USER_SEGMENT.bits()
        | DescriptorFlags::PRESENT.bits(),
);

/// Selector 0x20.
pub const CODE64_SELECTOR: u16 = 0x20;

/// Entries in selector order: null, 0x08 linear data, 0x10 linear code, 0x18 system data, 0x20 64-bit code,
/// 0x28 16-bit code, 0x30 16-bit data.
pub const GDT_ENTRIES: [u64; STAGE_GDT_ENTRY_COUNT] = [
    0,
    LINEAR_DATA_SEL.bits(),
    LINEAR_CODE_SEL.bits(),
    SYS_DATA_SEL.bits(),
    LINEAR_CODE64_SEL.bits(),
    CODE16_SEL.bits(),
    DATA16_SEL.bits(),
];

/// GDT storage carved from the loader pool.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageGdtTable {
    pub entries: [u64; STAGE_GDT_ENTRY_COUNT],
}

impl StageGdtTable {
    pub const fn new() -> Self {
        Self { entries: GDT_ENTRIES }
    }

    pub const fn limit(&self) -> u16 {
        (core::mem::size_of::<[u64; STAGE_GDT_ENTRY_COUNT]>() - 1) as u16
    }
}

impl Default for StageGdtTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_values() {
        assert_eq!(LINEAR_DATA_SEL.bits(), 0x00cf_9200_0000_ffff);
        assert_eq!(LINEAR_CODE_SEL.bits(), 0x00cf_9b00_0000_ffff);
        assert_eq!(SYS_DATA_SEL.bits(), 0x00cf_9300_0000_ffff);
        assert_eq!(LINEAR_CODE64_SEL.bits(), 0x00af_9b00_0000_ffff);
        assert_eq!(CODE16_SEL.bits(), 0x0000_9b00_0000_ffff);
        assert_eq!(DATA16_SEL.bits(), 0x0000_9200_0000_ffff);
    }

    #[test]
    fn test_table_layout() {
        let table = StageGdtTable::new();
        assert_eq!(core::mem::size_of::<StageGdtTable>(), 56);
        assert_eq!(table.limit(), 55);
        assert_eq!(table.entries[0], 0);
        assert_eq!(table.entries[(CODE64_SELECTOR >> 3) as usize], LINEAR_CODE64_SEL.bits());
    }
}
