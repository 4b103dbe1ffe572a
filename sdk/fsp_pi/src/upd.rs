//! Updatable Product Data (UPD) configuration blocks.
//!
//! A UPD block is a fixed-size region that starts with a signature and revision and is otherwise opaque to the boot
//! loader, apart from the architectural fields of the FSP-M block that the loader fills in before calling
//! memory-init.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_sdk::{base::UEFI_PAGE_MASK, error::BootError};
use scroll::{Pread, Pwrite, LE};

use crate::boot_mode::BOOT_WITH_FULL_CONFIGURATION;

/// 'QEMUPD_T'
pub const FSPT_UPD_SIGNATURE: u64 = u64::from_le_bytes(*b"QEMUPD_T");
/// 'QEMUPD_M'
pub const FSPM_UPD_SIGNATURE: u64 = u64::from_le_bytes(*b"QEMUPD_M");
/// 'QEMUPD_S'
pub const FSPS_UPD_SIGNATURE: u64 = u64::from_le_bytes(*b"QEMUPD_S");

/// Size of the common UPD header.
pub const UPD_HEADER_SIZE: usize = 0x20;
/// Offset of the FSP-M architectural block.
pub const FSPM_ARCH_UPD_OFFSET: usize = UPD_HEADER_SIZE;
/// Size of the FSP-M architectural block.
pub const FSPM_ARCH_UPD_SIZE: usize = 0x20;

const NVS_BUFFER_PTR: usize = FSPM_ARCH_UPD_OFFSET + 4;
const STACK_BASE: usize = FSPM_ARCH_UPD_OFFSET + 8;
const STACK_SIZE: usize = FSPM_ARCH_UPD_OFFSET + 12;
const BOOT_LOADER_TOLUM_SIZE: usize = FSPM_ARCH_UPD_OFFSET + 16;
const BOOT_MODE: usize = FSPM_ARCH_UPD_OFFSET + 20;

/// Common UPD header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdHeader {
    pub signature: u64,
    pub revision: u8,
}

impl UpdHeader {
    pub fn read(bytes: &[u8]) -> Result<Self, BootError> {
        Ok(Self {
            signature: bytes.pread_with(0, LE).map_err(|_| BootError::ConfigurationInvalid)?,
            revision: bytes.pread_with(8, LE).map_err(|_| BootError::ConfigurationInvalid)?,
        })
    }
}

/// Architectural fields of the FSP-M UPD block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FspmArchUpd {
    pub revision: u8,
    pub nvs_buffer_ptr: u32,
    pub stack_base: u32,
    pub stack_size: u32,
    pub boot_loader_tolum_size: u32,
    pub boot_mode: u32,
}

impl FspmArchUpd {
    /// Reads the architectural block out of a full FSP-M UPD region.
    pub fn read(upd: &[u8]) -> Result<Self, BootError> {
        let read = |offset| -> Result<u32, BootError> {
            upd.pread_with::<u32>(offset, LE).map_err(|_| BootError::ConfigurationInvalid)
        };
        Ok(Self {
            revision: upd.pread_with(FSPM_ARCH_UPD_OFFSET, LE).map_err(|_| BootError::ConfigurationInvalid)?,
            nvs_buffer_ptr: read(NVS_BUFFER_PTR)?,
            stack_base: read(STACK_BASE)?,
            stack_size: read(STACK_SIZE)?,
            boot_loader_tolum_size: read(BOOT_LOADER_TOLUM_SIZE)?,
            boot_mode: read(BOOT_MODE)?,
        })
    }

    /// Writes the architectural block back into a full FSP-M UPD region.
    pub fn write(&self, upd: &mut [u8]) -> Result<(), BootError> {
        let fields = [
            (NVS_BUFFER_PTR, self.nvs_buffer_ptr),
            (STACK_BASE, self.stack_base),
            (STACK_SIZE, self.stack_size),
            (BOOT_LOADER_TOLUM_SIZE, self.boot_loader_tolum_size),
            (BOOT_MODE, self.boot_mode),
        ];
        upd.pwrite_with(self.revision, FSPM_ARCH_UPD_OFFSET, LE).map_err(|_| BootError::ConfigurationInvalid)?;
        for (offset, value) in fields {
            upd.pwrite_with(value, offset, LE).map_err(|_| BootError::ConfigurationInvalid)?;
        }
        Ok(())
    }
}

/// Overwrites the fields the boot loader owns in a copy of the default FSP-M UPD region.
pub fn apply_loader_defaults(upd: &mut [u8]) -> Result<(), BootError> {
    let mut arch = FspmArchUpd::read(upd)?;
    arch.boot_loader_tolum_size = 0;
    arch.boot_mode = BOOT_WITH_FULL_CONFIGURATION;
    arch.nvs_buffer_ptr = 0;
    arch.write(upd)
}

/// Validates an FSP-M UPD region passed to memory-init.
///
/// The signature must match, the stack base must be set and the boot loader TOLUM size must be page aligned.
pub fn check_fspm_upd(upd: &[u8]) -> Result<(), BootError> {
    let header = UpdHeader::read(upd)?;
    let arch = FspmArchUpd::read(upd)?;
    if header.signature != FSPM_UPD_SIGNATURE
        || arch.stack_base == 0
        || arch.boot_loader_tolum_size as usize & UEFI_PAGE_MASK != 0
    {
        log::error!("FSP-M UPD check failed: signature {:#x}, stack base {:#x}", header.signature, arch.stack_base);
        return Err(BootError::ConfigurationInvalid);
    }
    Ok(())
}

/// Validates an FSP-S UPD region passed to silicon-init.
pub fn check_fsps_upd(upd: &[u8]) -> Result<(), BootError> {
    if UpdHeader::read(upd)?.signature != FSPS_UPD_SIGNATURE {
        log::error!("FSP-S UPD signature mismatch");
        return Err(BootError::ConfigurationInvalid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    fn fspm_upd() -> Vec<u8> {
        let mut upd = vec![0u8; 0x80];
        upd[..8].copy_from_slice(&FSPM_UPD_SIGNATURE.to_le_bytes());
        let arch = FspmArchUpd {
            revision: 1,
            nvs_buffer_ptr: 0x1234,
            stack_base: 0xFEF0_0000,
            stack_size: 0x2_0000,
            boot_loader_tolum_size: 0x1000,
            boot_mode: 0x11,
        };
        arch.write(&mut upd).unwrap();
        upd
    }

    #[test]
    fn test_arch_fields_at_fixed_offsets() {
        let upd = fspm_upd();
        assert_eq!(u32::from_le_bytes(upd[0x28..0x2C].try_into().unwrap()), 0xFEF0_0000);
        assert_eq!(u32::from_le_bytes(upd[0x34..0x38].try_into().unwrap()), 0x11);
    }

    #[test]
    fn test_apply_loader_defaults() {
        let mut upd = fspm_upd();
        apply_loader_defaults(&mut upd).unwrap();
        let arch = FspmArchUpd::read(&upd).unwrap();
        assert_eq!(arch.boot_loader_tolum_size, 0);
        assert_eq!(arch.boot_mode, BOOT_WITH_FULL_CONFIGURATION);
        assert_eq!(arch.nvs_buffer_ptr, 0);
        assert_eq!(arch.stack_base, 0xFEF0_0000);
    }

    #[test]
    fn test_check_fspm_upd() {
        let upd = fspm_upd();
        assert_eq!(check_fspm_upd(&upd), Ok(()));

        let mut bad_signature = upd.clone();
        bad_signature[7] = b'S';
        assert_eq!(check_fspm_upd(&bad_signature), Err(BootError::ConfigurationInvalid));

        let mut no_stack = upd.clone();
        FspmArchUpd { stack_base: 0, ..FspmArchUpd::read(&upd).unwrap() }.write(&mut no_stack).unwrap();
        assert_eq!(check_fspm_upd(&no_stack), Err(BootError::ConfigurationInvalid));

        let mut unaligned = upd.clone();
        FspmArchUpd { boot_loader_tolum_size: 0x1800, ..FspmArchUpd::read(&upd).unwrap() }
            .write(&mut unaligned)
            .unwrap();
        assert_eq!(check_fspm_upd(&unaligned), Err(BootError::ConfigurationInvalid));
    }

    #[test]
    fn test_check_fsps_upd() {
        let mut upd = vec![0u8; 0x40];
        assert_eq!(check_fsps_upd(&upd), Err(BootError::ConfigurationInvalid));
        upd[..8].copy_from_slice(&FSPS_UPD_SIGNATURE.to_le_bytes());
        assert_eq!(check_fsps_upd(&upd), Ok(()));
        assert_eq!(check_fsps_upd(&upd[..4]), Err(BootError::ConfigurationInvalid));
    }
}
