//! FSP-M memory layout.
//!
//! Low memory is split, from the top down, into TSEG, the FSP reserved region handed to the FSP as permanent memory,
//! and system memory. The sizes come from the chipset through [`ChipsetAccess`].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_pi::{
    hob::{
        HobList, EFI_RESOURCE_MEMORY_RESERVED, EFI_RESOURCE_SYSTEM_MEMORY, MEMORY_NOT_TESTED_ATTRIBUTES,
        MEMORY_TESTED_ATTRIBUTES,
    },
    smram::{self, RegionState, SmramDescriptor},
};
use fsp_sdk::{
    base::{SIZE_16MB, SIZE_1MB, SIZE_384KB, SIZE_4GB, SIZE_640KB},
    error::BootError,
    guids,
};

use crate::config::MemoryLayoutConfig;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Value written to the extended TSEG register to ask whether the chipset supports it.
pub const EXT_TSEG_MB_QUERY: u16 = 0xFFFF;

/// Chipset registers the layout depends on.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait ChipsetAccess {
    /// Reads one byte of CMOS.
    fn cmos_read(&self, index: u8) -> u8;
    /// Writes [`EXT_TSEG_MB_QUERY`] to the extended TSEG register and returns what reads back.
    fn query_extended_tseg(&mut self) -> u16;
    /// Sets the TSEG size in megabytes.
    fn write_extended_tseg(&mut self, mbytes: u16);
}

fsp_sdk::if_x64! {
    use x86_64::instructions::port::Port;

    const MCH_EXT_TSEG_MB: u32 = 0x50;

    /// The Q35 MCH and RTC CMOS as emulated by QEMU.
    #[derive(Debug, Default)]
    pub struct Q35Chipset;

    impl Q35Chipset {
        fn select_dramc(register: u32) {
            // Bus 0, device 0, function 0.
            // SAFETY: 0xCF8 is the PCI configuration address port.
            unsafe { Port::<u32>::new(0xCF8).write(0x8000_0000 | (register & 0xFC)) }
        }
    }

    impl ChipsetAccess for Q35Chipset {
        fn cmos_read(&self, index: u8) -> u8 {
            // SAFETY: 0x70/0x71 are the RTC CMOS index and data ports.
            unsafe {
                Port::<u8>::new(0x70).write(index);
                Port::<u8>::new(0x71).read()
            }
        }

        fn query_extended_tseg(&mut self) -> u16 {
            self.write_extended_tseg(EXT_TSEG_MB_QUERY);
            Self::select_dramc(MCH_EXT_TSEG_MB);
            // SAFETY: 0xCFC is the PCI configuration data port.
            unsafe { Port::<u16>::new(0xCFC + (MCH_EXT_TSEG_MB & 3) as u16).read() }
        }

        fn write_extended_tseg(&mut self, mbytes: u16) {
            Self::select_dramc(MCH_EXT_TSEG_MB);
            // SAFETY: 0xCFC is the PCI configuration data port.
            unsafe { Port::<u16>::new(0xCFC + (MCH_EXT_TSEG_MB & 3) as u16).write(mbytes) }
        }
    }
}

/// Memory below 4 GiB: CMOS 0x34/0x35 count 64 KiB units above 16 MiB.
pub fn low_memory_size(chipset: &dyn ChipsetAccess) -> u32 {
    let units = ((chipset.cmos_read(0x35) as u32) << 8) | chipset.cmos_read(0x34) as u32;
    (units << 16) + SIZE_16MB as u32
}

/// Memory above 4 GiB: CMOS 0x5b..0x5d count 64 KiB units, most significant byte at 0x5d.
pub fn high_memory_size(chipset: &dyn ChipsetAccess) -> u64 {
    let units = ((chipset.cmos_read(0x5d) as u64) << 16)
        | ((chipset.cmos_read(0x5c) as u64) << 8)
        | chipset.cmos_read(0x5b) as u64;
    units << 16
}

/// TSEG size, programming the default when the chipset has no extended TSEG.
pub fn tseg_size(chipset: &mut dyn ChipsetAccess, config: &MemoryLayoutConfig) -> u32 {
    let mbytes = chipset.query_extended_tseg();
    if mbytes == EXT_TSEG_MB_QUERY {
        let default = (config.default_tseg_size >> 20) as u16;
        chipset.write_extended_tseg(default);
        config.default_tseg_size
    } else {
        (mbytes as u32) << 20
    }
}

/// The carved memory map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    pub low_memory_length: u32,
    pub high_memory_length: u64,
    pub tseg_base: u32,
    pub tseg_size: u32,
    pub fsp_reserved_base: u32,
    pub fsp_reserved_size: u32,
}

impl MemoryLayout {
    /// Reads the chipset and carves low memory.
    ///
    /// Fails with [`BootError::ConfigurationInvalid`] if TSEG and the FSP reserved region do not fit below the top
    /// of low memory.
    pub fn detect(chipset: &mut dyn ChipsetAccess, config: &MemoryLayoutConfig) -> Result<Self, BootError> {
        let low_memory_length = low_memory_size(chipset);
        let high_memory_length = high_memory_size(chipset);
        let tseg_size = tseg_size(chipset, config);
        let fsp_reserved_size = config.fsp_reserved_memory_length;

        if low_memory_length as u64 <= fsp_reserved_size as u64 + tseg_size as u64 {
            log::error!(
                target: "fsp_memory",
                "low memory {:#x} cannot hold TSEG {:#x} and FSP reserved {:#x}",
                low_memory_length,
                tseg_size,
                fsp_reserved_size
            );
            return Err(BootError::ConfigurationInvalid);
        }
        let tseg_base = low_memory_length - tseg_size;
        let layout = Self {
            low_memory_length,
            high_memory_length,
            tseg_base,
            tseg_size,
            fsp_reserved_base: tseg_base - fsp_reserved_size,
            fsp_reserved_size,
        };
        log::info!(target: "fsp_memory", "memory layout: {:x?}", layout);
        Ok(layout)
    }

    /// Appends the resource descriptors and the SMRAM reservation describing this layout.
    pub fn build_hobs(&self, hobs: &mut HobList) {
        hobs.build_resource_descriptor(EFI_RESOURCE_SYSTEM_MEMORY, MEMORY_TESTED_ATTRIBUTES, 0, SIZE_640KB as u64);
        hobs.build_resource_descriptor(
            EFI_RESOURCE_MEMORY_RESERVED,
            MEMORY_TESTED_ATTRIBUTES,
            SIZE_640KB as u64,
            SIZE_384KB as u64,
        );
        hobs.build_resource_descriptor(
            EFI_RESOURCE_SYSTEM_MEMORY,
            MEMORY_TESTED_ATTRIBUTES,
            SIZE_1MB as u64,
            self.fsp_reserved_base as u64 - SIZE_1MB as u64,
        );
        hobs.build_resource_descriptor_with_owner(
            EFI_RESOURCE_MEMORY_RESERVED,
            MEMORY_TESTED_ATTRIBUTES,
            self.fsp_reserved_base as u64,
            self.fsp_reserved_size as u64,
            guids::FSP_RESERVED_MEMORY_RESOURCE_HOB,
        );
        if self.high_memory_length != 0 {
            hobs.build_resource_descriptor(
                EFI_RESOURCE_SYSTEM_MEMORY,
                MEMORY_NOT_TESTED_ATTRIBUTES,
                SIZE_4GB as u64,
                self.high_memory_length,
            );
        }
        hobs.build_resource_descriptor_with_owner(
            EFI_RESOURCE_MEMORY_RESERVED,
            MEMORY_TESTED_ATTRIBUTES,
            self.tseg_base as u64,
            self.tseg_size as u64,
            guids::FSP_RESERVED_MEMORY_RESOURCE_HOB_TSEG,
        );
        hobs.build_guid_data(
            guids::SMM_SMRAM_MEMORY,
            &smram::encode_descriptor_block(&[SmramDescriptor {
                physical_start: self.tseg_base as u64,
                cpu_start: self.tseg_base as u64,
                physical_size: self.tseg_size as u64,
                region_state: RegionState::CLOSED | RegionState::CACHEABLE,
            }]),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsp_pi::hob::Hob;
    use mockall::predicate::eq;

    /// 2 GiB below 4 GiB, 1 GiB above.
    fn chipset(extended_tseg: u16) -> MockChipsetAccess {
        let mut chipset = MockChipsetAccess::new();
        chipset.expect_cmos_read().returning(|index| match index {
            0x34 => 0x00,
            0x35 => 0x7F,
            0x5b => 0x00,
            0x5c => 0x40,
            0x5d => 0x00,
            _ => 0xFF,
        });
        chipset.expect_query_extended_tseg().return_const(extended_tseg);
        chipset
    }

    #[test]
    fn test_cmos_sizes() {
        let chipset = chipset(EXT_TSEG_MB_QUERY);
        assert_eq!(low_memory_size(&chipset), 0x8000_0000);
        assert_eq!(high_memory_size(&chipset), 0x4000_0000);
    }

    #[test]
    fn test_tseg_defaults_when_not_extended() {
        let mut chipset = chipset(EXT_TSEG_MB_QUERY);
        chipset.expect_write_extended_tseg().with(eq(16)).times(1).return_const(());
        assert_eq!(tseg_size(&mut chipset, &MemoryLayoutConfig::default()), 0x100_0000);
    }

    #[test]
    fn test_tseg_extended() {
        let mut chipset = chipset(64);
        chipset.expect_write_extended_tseg().never();
        assert_eq!(tseg_size(&mut chipset, &MemoryLayoutConfig::default()), 0x400_0000);
    }

    #[test]
    fn test_detect_carves_from_the_top() {
        let mut chipset = chipset(EXT_TSEG_MB_QUERY);
        chipset.expect_write_extended_tseg().return_const(());
        let layout = MemoryLayout::detect(&mut chipset, &MemoryLayoutConfig::default()).unwrap();
        assert_eq!(layout.tseg_base, 0x7F00_0000);
        assert_eq!(layout.fsp_reserved_base, 0x7EC0_0000);
        assert_eq!(layout.fsp_reserved_size, 0x40_0000);
    }

    #[test]
    fn test_detect_rejects_undersized_memory() {
        let mut chipset = chipset(EXT_TSEG_MB_QUERY);
        chipset.expect_write_extended_tseg().return_const(());
        let config = MemoryLayoutConfig { fsp_reserved_memory_length: 0x7F00_0000, ..Default::default() };
        assert_eq!(MemoryLayout::detect(&mut chipset, &config), Err(BootError::ConfigurationInvalid));
    }

    #[test]
    fn test_build_hobs_order() {
        let layout = MemoryLayout {
            low_memory_length: 0x8000_0000,
            high_memory_length: 0x4000_0000,
            tseg_base: 0x7F00_0000,
            tseg_size: 0x100_0000,
            fsp_reserved_base: 0x7EC0_0000,
            fsp_reserved_size: 0x40_0000,
        };
        let mut hobs = HobList::new();
        layout.build_hobs(&mut hobs);

        let ranges: Vec<(u32, u64, u64)> =
            hobs.resource_descriptors().map(|rd| (rd.resource_type, rd.physical_start, rd.resource_length)).collect();
        assert_eq!(
            ranges,
            vec![
                (EFI_RESOURCE_SYSTEM_MEMORY, 0, 0xA_0000),
                (EFI_RESOURCE_MEMORY_RESERVED, 0xA_0000, 0x6_0000),
                (EFI_RESOURCE_SYSTEM_MEMORY, 0x10_0000, 0x7EB0_0000),
                (EFI_RESOURCE_MEMORY_RESERVED, 0x7EC0_0000, 0x40_0000),
                (EFI_RESOURCE_SYSTEM_MEMORY, 0x1_0000_0000, 0x4000_0000),
                (EFI_RESOURCE_MEMORY_RESERVED, 0x7F00_0000, 0x100_0000),
            ]
        );
        assert_eq!(
            hobs.find_resource_by_owner(&guids::FSP_RESERVED_MEMORY_RESOURCE_HOB).map(|rd| rd.physical_start),
            Some(0x7EC0_0000)
        );
        let smram = smram::decode_descriptor_block(hobs.guid_hob_data(&guids::SMM_SMRAM_MEMORY).unwrap()).unwrap();
        assert_eq!(smram.len(), 1);
        assert_eq!(smram[0].cpu_start, 0x7F00_0000);
        assert!(matches!(hobs.iter().last(), Some(Hob::GuidExtension { .. })));
    }
}
