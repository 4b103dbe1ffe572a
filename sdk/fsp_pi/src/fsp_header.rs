//! FSP Information Header
//!
//! Every FSP component (FSP-T, FSP-M, FSP-S) carries an information header in the raw section of the first file of
//! its firmware volume. The header locates the default UPD region and the API entry points relative to the image
//! base.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_sdk::error::BootError;
use scroll::{Pread, LE};

/// 'FSPH'
pub const FSP_INFO_HEADER_SIGNATURE: u32 = u32::from_le_bytes(*b"FSPH");

/// Size in bytes of the header fields this crate reads.
pub const FSP_INFO_HEADER_SIZE: usize = 0x48;

/// The FSP information header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FspInfoHeader {
    pub signature: u32,
    pub header_length: u32,
    pub spec_version: u8,
    pub header_revision: u8,
    pub image_revision: u32,
    pub image_id: u64,
    pub image_size: u32,
    pub image_base: u32,
    pub image_attribute: u16,
    pub component_attribute: u16,
    pub cfg_region_offset: u32,
    pub cfg_region_size: u32,
    pub temp_ram_init_entry_offset: u32,
    pub notify_phase_entry_offset: u32,
    pub fsp_memory_init_entry_offset: u32,
    pub temp_ram_exit_entry_offset: u32,
    pub fsp_silicon_init_entry_offset: u32,
}

impl FspInfoHeader {
    /// Decodes the header fields from `bytes` without validating them.
    pub fn read(bytes: &[u8]) -> Result<Self, scroll::Error> {
        let offset = &mut 0usize;
        let signature: u32 = bytes.gread_with(offset, LE)?;
        let header_length: u32 = bytes.gread_with(offset, LE)?;
        *offset += 2;
        let spec_version: u8 = bytes.gread_with(offset, LE)?;
        let header_revision: u8 = bytes.gread_with(offset, LE)?;
        let image_revision: u32 = bytes.gread_with(offset, LE)?;
        let image_id: u64 = bytes.gread_with(offset, LE)?;
        let image_size: u32 = bytes.gread_with(offset, LE)?;
        let image_base: u32 = bytes.gread_with(offset, LE)?;
        let image_attribute: u16 = bytes.gread_with(offset, LE)?;
        let component_attribute: u16 = bytes.gread_with(offset, LE)?;
        let cfg_region_offset: u32 = bytes.gread_with(offset, LE)?;
        let cfg_region_size: u32 = bytes.gread_with(offset, LE)?;
        *offset += 4;
        let temp_ram_init_entry_offset: u32 = bytes.gread_with(offset, LE)?;
        *offset += 4;
        let notify_phase_entry_offset: u32 = bytes.gread_with(offset, LE)?;
        let fsp_memory_init_entry_offset: u32 = bytes.gread_with(offset, LE)?;
        let temp_ram_exit_entry_offset: u32 = bytes.gread_with(offset, LE)?;
        let fsp_silicon_init_entry_offset: u32 = bytes.gread_with(offset, LE)?;

        Ok(Self {
            signature,
            header_length,
            spec_version,
            header_revision,
            image_revision,
            image_id,
            image_size,
            image_base,
            image_attribute,
            component_attribute,
            cfg_region_offset,
            cfg_region_size,
            temp_ram_init_entry_offset,
            notify_phase_entry_offset,
            fsp_memory_init_entry_offset,
            temp_ram_exit_entry_offset,
            fsp_silicon_init_entry_offset,
        })
    }

    /// Decodes and validates the header of a component found at `expected_base`.
    ///
    /// The signature must be `FSPH` and the declared image base must equal the address the component was found at.
    pub fn validate(bytes: &[u8], expected_base: u64) -> Result<Self, BootError> {
        let header = Self::read(bytes).map_err(|_| BootError::ConfigurationInvalid)?;
        if header.signature != FSP_INFO_HEADER_SIGNATURE {
            log::error!("FSP info header signature mismatch: {:#x}", header.signature);
            return Err(BootError::ConfigurationInvalid);
        }
        if header.image_base as u64 != expected_base {
            log::error!("FSP image base {:#x} does not match load address {:#x}", header.image_base, expected_base);
            return Err(BootError::ConfigurationInvalid);
        }
        Ok(header)
    }

    /// Absolute address of the default configuration region.
    pub fn cfg_region_base(&self) -> u64 {
        self.image_base as u64 + self.cfg_region_offset as u64
    }
}
