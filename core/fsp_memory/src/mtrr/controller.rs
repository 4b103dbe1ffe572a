//! MTRR-backed cache controller.
//!
//! Ranges that end at or below 1 MiB are programmed through the fixed-range MTRRs and must be aligned to the
//! fixed-range granularity. Everything else is split into naturally aligned power-of-two pieces, one variable MTRR
//! each.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_sdk::{base::SIZE_1MB, error::EfiError};

use super::{CacheController, CacheType};

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

const IA32_MTRRCAP: u32 = 0xFE;
const IA32_MTRR_PHYSBASE0: u32 = 0x200;
const IA32_MTRR_DEF_TYPE: u32 = 0x2FF;

const MTRR_DEF_TYPE_ENABLE: u64 = 1 << 11;
const MTRR_DEF_TYPE_FIXED_ENABLE: u64 = 1 << 10;
const MTRR_PHYSMASK_VALID: u64 = 1 << 11;
const MTRRCAP_VCNT_MASK: u64 = 0xFF;

/// (msr, first address, bytes per sub-range); each MSR holds eight one-byte types.
const FIXED_MTRRS: [(u32, u64, u64); 11] = [
    (0x250, 0x0_0000, 0x1_0000),
    (0x258, 0x8_0000, 0x4000),
    (0x259, 0xA_0000, 0x4000),
    (0x268, 0xC_0000, 0x1000),
    (0x269, 0xC_8000, 0x1000),
    (0x26A, 0xD_0000, 0x1000),
    (0x26B, 0xD_8000, 0x1000),
    (0x26C, 0xE_0000, 0x1000),
    (0x26D, 0xE_8000, 0x1000),
    (0x26E, 0xF_0000, 0x1000),
    (0x26F, 0xF_8000, 0x1000),
];

/// Model-specific register access.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait MsrAccess {
    fn read(&self, msr: u32) -> u64;
    fn write(&mut self, msr: u32, value: u64);
}

fsp_sdk::if_x64! {
    /// RDMSR/WRMSR on the executing processor.
    #[derive(Debug, Default)]
    pub struct HardwareMsr;

    impl MsrAccess for HardwareMsr {
        fn read(&self, msr: u32) -> u64 {
            // SAFETY: only architectural MTRR registers are accessed through this controller.
            unsafe { x86_64::registers::model_specific::Msr::new(msr).read() }
        }

        fn write(&mut self, msr: u32, value: u64) {
            // SAFETY: only architectural MTRR registers are accessed through this controller.
            unsafe { x86_64::registers::model_specific::Msr::new(msr).write(value) }
        }
    }
}

/// Programs the MTRRs through an [`MsrAccess`].
pub struct MtrrController<M: MsrAccess> {
    msr: M,
    physical_address_mask: u64,
}

impl<M: MsrAccess> MtrrController<M> {
    /// `physical_address_bits` bounds the PHYSMASK values written.
    pub fn new(msr: M, physical_address_bits: u8) -> Self {
        let physical_address_mask = (1u64 << physical_address_bits).wrapping_sub(1) & !0xFFF;
        Self { msr, physical_address_mask }
    }

    fn variable_count(&self) -> u32 {
        (self.msr.read(IA32_MTRRCAP) & MTRRCAP_VCNT_MASK) as u32
    }

    fn set_fixed(&mut self, base: u64, length: u64, cache_type: CacheType) -> Result<(), EfiError> {
        let end = base + length;
        let mut covered = 0;
        for (msr, start, unit) in FIXED_MTRRS {
            let mut value = self.msr.read(msr);
            let mut changed = false;
            for index in 0..8u64 {
                let sub = start + index * unit;
                if sub >= base && sub + unit <= end {
                    let shift = index * 8;
                    value = (value & !(0xFF << shift)) | ((cache_type as u64) << shift);
                    covered += unit;
                    changed = true;
                }
            }
            if changed {
                self.msr.write(msr, value);
            }
        }
        if covered != length {
            log::error!(target: "fsp_memory", "fixed MTRR range {:#x} + {:#x} is not aligned", base, length);
            return Err(EfiError::InvalidParameter);
        }
        Ok(())
    }

    fn set_variable(&mut self, base: u64, length: u64, cache_type: CacheType) -> Result<(), EfiError> {
        let count = self.variable_count();
        let mut next = 0u32;
        let mut base = base;
        let mut remaining = length;
        while remaining != 0 {
            // Largest power of two that both divides `base` and fits in `remaining`.
            let alignment = if base == 0 { u64::MAX } else { 1u64 << base.trailing_zeros() };
            let size = alignment.min(1u64 << (63 - remaining.leading_zeros()));

            let slot = (next..count)
                .find(|i| self.msr.read(IA32_MTRR_PHYSBASE0 + 2 * i + 1) & MTRR_PHYSMASK_VALID == 0)
                .ok_or_else(|| {
                    log::error!(target: "fsp_memory", "out of variable MTRRs at {:#x}", base);
                    EfiError::OutOfResources
                })?;
            self.msr.write(IA32_MTRR_PHYSBASE0 + 2 * slot, base | cache_type as u64);
            self.msr.write(
                IA32_MTRR_PHYSBASE0 + 2 * slot + 1,
                (!(size - 1) & self.physical_address_mask) | MTRR_PHYSMASK_VALID,
            );
            next = slot + 1;
            base += size;
            remaining -= size;
        }
        Ok(())
    }
}

impl<M: MsrAccess> CacheController for MtrrController<M> {
    fn reset(&mut self) -> Result<(), EfiError> {
        self.msr.write(IA32_MTRR_DEF_TYPE, 0);
        for i in 0..self.variable_count() {
            self.msr.write(IA32_MTRR_PHYSBASE0 + 2 * i, 0);
            self.msr.write(IA32_MTRR_PHYSBASE0 + 2 * i + 1, 0);
        }
        for (msr, _, _) in FIXED_MTRRS {
            self.msr.write(msr, 0);
        }
        self.msr.write(
            IA32_MTRR_DEF_TYPE,
            MTRR_DEF_TYPE_ENABLE | MTRR_DEF_TYPE_FIXED_ENABLE | CacheType::Uncacheable as u64,
        );
        Ok(())
    }

    fn set_attributes(&mut self, base: u64, length: u64, cache_type: CacheType) -> Result<(), EfiError> {
        if length == 0 || base & 0xFFF != 0 || length & 0xFFF != 0 {
            return Err(EfiError::InvalidParameter);
        }
        if base + length <= SIZE_1MB as u64 {
            self.set_fixed(base, length, cache_type)
        } else {
            self.set_variable(base, length, cache_type)
        }
    }
}
