//! PE/COFF loading for the MM core image.
//!
//! Only PE32+ images are accepted. [`PeInfo::parse`] gathers what is needed to place the image, [`load_image`]
//! lays the sections out at their virtual addresses and [`relocate_image`] applies base relocations for the final
//! address.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;
use scroll::{Pread, Pwrite, LE};

pub mod error;
pub mod relocation;

pub use goblin::pe::section_table::IMAGE_SCN_CNT_CODE;

use relocation::parse_relocation_blocks;

// Magic value for the DOS header.
const DOS_MAGIC: u16 = 0x5A4D;
// The size of the PE32 signature.
const SIZEOF_PE32_SIGNATURE: usize = 4;
// The size of the COFF header.
const SIZEOF_COFF_HEADER: usize = 20;
// The size of the standard fields in the PE32Plus header.
const SIZEOF_STANDARD_FIELDS_64: usize = 24;

// Relocation type that does not require any action.
const IMAGE_REL_BASED_ABSOLUTE: u16 = 0;
// Relocation type that requires the adjustment be applied to the entire
// 32-bit value.
const IMAGE_REL_BASED_HIGHLOW: u16 = 3;
// Relocation type that requires the adjustment be applied to the entire
// 64-bit value.
const IMAGE_REL_BASED_DIR64: u16 = 10;

/// Type containing information about a PE32+ image.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PeInfo {
    /// Offset into an image header where the image_base address is located.
    /// NOT the actual image base address.
    pub image_base_header_field_offset: usize,
    /// RVA offset of the entry point.
    pub entry_point_offset: usize,
    /// The total length of the image.
    pub size_of_image: u32,
    /// The size of an individual section in a power of 2 (4K \[0x1000\], etc.).
    pub section_alignment: u32,
    /// The total length of the image header.
    pub size_of_headers: usize,
    /// Structs representing the section table inside the image header.
    pub sections: Vec<goblin::pe::section_table::SectionTable>,
    /// The relocation directory, if present.
    pub reloc_dir: Option<goblin::pe::data_directories::DataDirectory>,
}

impl PeInfo {
    pub fn parse(bytes: &[u8]) -> error::Result<Self> {
        match bytes.pread_with::<u16>(0, LE)? {
            DOS_MAGIC => PeInfo::from_pe(bytes),
            sig => Err(error::Error::BadSignature(sig)),
        }
    }

    fn from_pe(bytes: &[u8]) -> error::Result<Self> {
        let parsed_pe = goblin::pe::PE::parse(bytes)?;
        if !parsed_pe.is_64 {
            return Err(error::Error::NotPe32Plus);
        }
        let optional_header = parsed_pe.header.optional_header.ok_or(error::Error::NoOptionalHeader)?;

        let mut pe = PeInfo {
            entry_point_offset: optional_header.standard_fields.address_of_entry_point as usize,
            section_alignment: optional_header.windows_fields.section_alignment,
            size_of_image: optional_header.windows_fields.size_of_image,
            size_of_headers: optional_header.windows_fields.size_of_headers as usize,
            sections: parsed_pe.sections.into_iter().collect(),
            ..Default::default()
        };

        if let Some(reloc_section) = optional_header.data_directories.get_base_relocation_table() {
            pe.reloc_dir = Some(*reloc_section);
        }

        // image_base is the first of the windows fields.
        pe.image_base_header_field_offset = parsed_pe.header.dos_header.pe_pointer as usize
            + SIZEOF_PE32_SIGNATURE
            + SIZEOF_COFF_HEADER
            + SIZEOF_STANDARD_FIELDS_64;

        Ok(pe)
    }

    /// Load offset from the SMRAM base assigned to the image at build time.
    ///
    /// The build tools store it in the PointerToRelocations and PointerToLinenumbers fields of the first section
    /// that does not contain code. Zero there means no fixed address was assigned.
    pub fn fixed_load_offset(&self) -> Option<u64> {
        let section = self.sections.iter().find(|s| s.characteristics & IMAGE_SCN_CNT_CODE == 0)?;
        let value = (section.pointer_to_linenumbers as u64) << 32 | section.pointer_to_relocations as u64;
        (value != 0).then_some(value)
    }
}

/// Attempts to load the image into the specified bytes buffer.
///
/// Copies the provided image, section by section, into the zero'd out buffer after copying the
/// headers, returning an error if it failed.
///
/// ## Errors
///
/// Returns [`BufferTooShort`](error::Error::BufferTooShort) error if either of the buffers provided are
/// not large enough to contain the image as specified by the image header.
pub fn load_image(pe_info: &PeInfo, image: &[u8], loaded_image: &mut [u8]) -> error::Result<()> {
    loaded_image.fill(0);

    let size_of_headers = pe_info.size_of_headers;
    let dst =
        loaded_image.get_mut(..size_of_headers).ok_or(error::Error::BufferTooShort(size_of_headers, "loaded_image"))?;
    let src = image.get(..size_of_headers).ok_or(error::Error::BufferTooShort(size_of_headers, "image"))?;
    dst.copy_from_slice(src);

    for section in &pe_info.sections {
        let mut size = section.virtual_size;
        if size == 0 || size > section.size_of_raw_data {
            size = section.size_of_raw_data;
        }

        let dst = loaded_image
            .get_mut((section.virtual_address as usize)..(section.virtual_address as usize + size as usize))
            .ok_or(error::Error::BufferTooShort(size as usize, "loaded_image"))?;
        let src = image
            .get((section.pointer_to_raw_data as usize)..(section.pointer_to_raw_data as usize + size as usize))
            .ok_or(error::Error::BufferTooShort(size as usize, "image"))?;
        dst.copy_from_slice(src)
    }
    Ok(())
}

/// Attempts to relocate the loaded image to the specified destination.
///
/// Rewrites the image base in the header and applies every base relocation fixup.
///
/// ## Errors
///
/// Returns [`BufferTooShort`](error::Error::BufferTooShort) error if the relocation directory or a fixup lies
/// outside the image, and [`UnsupportedRelocation`](error::Error::UnsupportedRelocation) for fixup types other
/// than absolute, high-low and dir64.
pub fn relocate_image(pe_info: &PeInfo, destination: u64, image: &mut [u8]) -> error::Result<()> {
    let base = image.pread_with::<u64>(pe_info.image_base_header_field_offset, LE)?;
    image.pwrite_with::<u64>(destination, pe_info.image_base_header_field_offset, LE)?;

    let adjustment = destination.wrapping_sub(base);

    let Some(dir) = pe_info.reloc_dir else {
        return Ok(());
    };
    if adjustment == 0 {
        return Ok(());
    }

    let relocation_data = image
        .get((dir.virtual_address as usize)..(dir.virtual_address as usize + dir.size as usize))
        .ok_or(error::Error::BufferTooShort(dir.size as usize, "image"))?;

    let relocation_blocks = parse_relocation_blocks(relocation_data)?;
    for reloc_block in &relocation_blocks {
        for reloc in &reloc_block.relocations {
            let fixup = (reloc_block.block_header.page_rva + reloc.offset()) as usize;

            match reloc.fixup_type() {
                IMAGE_REL_BASED_ABSOLUTE => {}
                IMAGE_REL_BASED_HIGHLOW => {
                    let value = image.pread_with::<u32>(fixup, LE)?;
                    image.pwrite_with(value.wrapping_add(adjustment as u32), fixup, LE)?;
                }
                IMAGE_REL_BASED_DIR64 => {
                    let value = image.pread_with::<u64>(fixup, LE)?;
                    image.pwrite_with(value.wrapping_add(adjustment), fixup, LE)?;
                }
                other => return Err(error::Error::UnsupportedRelocation(other)),
            }
        }
    }
    Ok(())
}
