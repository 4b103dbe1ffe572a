//! Firmware volume, firmware file and section layouts.
//!
//! Only the read side is provided: volumes are walked in place, files are located by type and sections are
//! returned as borrowed slices into the volume image.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_sdk::error::EfiError;
use r_efi::efi;
use scroll::{Pread, LE};

/// '_FVH'
pub const FVH_SIGNATURE: u32 = u32::from_le_bytes(*b"_FVH");

/// Offset of the signature field within a firmware volume header.
pub const FVH_SIGNATURE_OFFSET: usize = 0x28;

pub mod file_type {
    pub const RAW: u8 = 0x01;
    pub const FREEFORM: u8 = 0x02;
    pub const SECURITY_CORE: u8 = 0x03;
    pub const PEI_CORE: u8 = 0x04;
    pub const DXE_CORE: u8 = 0x05;
    pub const PEIM: u8 = 0x06;
    pub const DRIVER: u8 = 0x07;
    pub const APPLICATION: u8 = 0x09;
    pub const MM: u8 = 0x0A;
    pub const FIRMWARE_VOLUME_IMAGE: u8 = 0x0B;
    pub const MM_CORE: u8 = 0x0D;
    pub const MM_STANDALONE: u8 = 0x0E;
    pub const MM_CORE_STANDALONE: u8 = 0x0F;
    pub const FFS_PAD: u8 = 0xF0;
}

pub mod section_type {
    pub const COMPRESSION: u8 = 0x01;
    pub const GUID_DEFINED: u8 = 0x02;
    pub const PE32: u8 = 0x10;
    pub const PIC: u8 = 0x11;
    pub const TE: u8 = 0x12;
    pub const DXE_DEPEX: u8 = 0x13;
    pub const VERSION: u8 = 0x14;
    pub const USER_INTERFACE: u8 = 0x15;
    pub const FIRMWARE_VOLUME_IMAGE: u8 = 0x17;
    pub const RAW: u8 = 0x19;
    pub const MM_DEPEX: u8 = 0x1C;
}

const FFS_ATTRIB_LARGE_FILE: u8 = 0x01;
const FILE_HEADER_SIZE: usize = 0x18;
const FILE_HEADER2_SIZE: usize = 0x20;
const SECTION_HEADER_SIZE: usize = 4;
const SECTION_HEADER2_SIZE: usize = 8;

/// Errors raised while reading firmware file system structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfsError {
    /// The volume header is malformed or does not carry the `_FVH` signature.
    InvalidHeader,
    /// A file or section declared a size that runs past its container.
    Truncated,
    /// No file or section matched the search.
    NotFound,
}

impl From<FfsError> for EfiError {
    fn from(value: FfsError) -> Self {
        match value {
            FfsError::InvalidHeader | FfsError::Truncated => EfiError::VolumeCorrupted,
            FfsError::NotFound => EfiError::NotFound,
        }
    }
}

impl From<scroll::Error> for FfsError {
    fn from(_: scroll::Error) -> Self {
        FfsError::Truncated
    }
}

/// Fixed portion of a firmware volume header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeHeader {
    pub file_system_guid: efi::Guid,
    pub fv_length: u64,
    pub signature: u32,
    pub attributes: u32,
    pub header_length: u16,
    pub checksum: u16,
    pub ext_header_offset: u16,
    pub revision: u8,
}

impl VolumeHeader {
    pub const SIZE: usize = 0x38;

    /// Reads the header at the start of `bytes`, requiring the `_FVH` signature.
    pub fn read(bytes: &[u8]) -> Result<Self, FfsError> {
        let guid: &[u8; 16] = bytes.get(0x10..0x20).and_then(|b| b.try_into().ok()).ok_or(FfsError::Truncated)?;
        let header = Self {
            file_system_guid: efi::Guid::from_bytes(guid),
            fv_length: bytes.pread_with(0x20, LE)?,
            signature: bytes.pread_with(FVH_SIGNATURE_OFFSET, LE)?,
            attributes: bytes.pread_with(0x2C, LE)?,
            header_length: bytes.pread_with(0x30, LE)?,
            checksum: bytes.pread_with(0x32, LE)?,
            ext_header_offset: bytes.pread_with(0x34, LE)?,
            revision: bytes.pread_with(0x37, LE)?,
        };
        if header.signature != FVH_SIGNATURE || (header.header_length as usize) < Self::SIZE {
            return Err(FfsError::InvalidHeader);
        }
        Ok(header)
    }
}

/// A firmware volume image borrowed from memory.
#[derive(Debug, Clone, Copy)]
pub struct Volume<'a> {
    header: VolumeHeader,
    bytes: &'a [u8],
}

impl<'a> Volume<'a> {
    /// Wraps a volume image. `bytes` may be longer than the volume; it is truncated to `FvLength`.
    pub fn new(bytes: &'a [u8]) -> Result<Self, FfsError> {
        let header = VolumeHeader::read(bytes)?;
        let bytes = bytes.get(..header.fv_length as usize).ok_or(FfsError::Truncated)?;
        Ok(Self { header, bytes })
    }

    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    /// Iterates over the files in the volume, stopping at free space or the first malformed header.
    pub fn files(&self) -> Files<'a> {
        let mut offset = self.header.header_length as usize;
        if self.header.ext_header_offset != 0 {
            let ext = self.header.ext_header_offset as usize;
            let ext_size: u32 = self.bytes.pread_with(ext + 0x10, LE).unwrap_or(0);
            offset = offset.max(ext + ext_size as usize);
        }
        Files { bytes: self.bytes, offset: align8(offset) }
    }

    /// Returns the data of the first section of `section` type in the first file of `file` type.
    pub fn find_section(&self, file: u8, section: u8) -> Result<&'a [u8], FfsError> {
        let found = self.files().find(|f| f.file_type == file).ok_or(FfsError::NotFound)?;
        found.sections().find(|s| s.section_type == section).map(|s| s.data).ok_or(FfsError::NotFound)
    }
}

/// A firmware file within a [`Volume`].
#[derive(Debug, Clone, Copy)]
pub struct File<'a> {
    pub name: efi::Guid,
    pub file_type: u8,
    pub attributes: u8,
    /// File contents following the header.
    pub data: &'a [u8],
}

impl<'a> File<'a> {
    /// Iterates over the leaf sections of the file.
    pub fn sections(&self) -> Sections<'a> {
        Sections { bytes: self.data, offset: 0 }
    }
}

pub struct Files<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Files<'a> {
    type Item = File<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let header = self.bytes.get(self.offset..self.offset + FILE_HEADER_SIZE)?;
            if header.iter().all(|b| *b == 0xFF) {
                return None;
            }
            let name: &[u8; 16] = header[..16].try_into().ok()?;
            let file_type = header[0x12];
            let attributes = header[0x13];
            let (size, header_size) = if attributes & FFS_ATTRIB_LARGE_FILE != 0 {
                (self.bytes.pread_with::<u64>(self.offset + FILE_HEADER_SIZE, LE).ok()? as usize, FILE_HEADER2_SIZE)
            } else {
                (u32::from_le_bytes([header[0x14], header[0x15], header[0x16], 0]) as usize, FILE_HEADER_SIZE)
            };
            if size < header_size {
                log::warn!("firmware file at {:#x} declares size {:#x}", self.offset, size);
                return None;
            }
            let data = self.bytes.get(self.offset + header_size..self.offset + size)?;
            self.offset = align8(self.offset + size);
            if file_type == file_type::FFS_PAD {
                continue;
            }
            return Some(File { name: efi::Guid::from_bytes(name), file_type, attributes, data });
        }
    }
}

/// A leaf section of a [`File`].
#[derive(Debug, Clone, Copy)]
pub struct Section<'a> {
    pub section_type: u8,
    /// Section contents following the header.
    pub data: &'a [u8],
}

pub struct Sections<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Sections<'a> {
    type Item = Section<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.bytes.get(self.offset..self.offset + SECTION_HEADER_SIZE)?;
        let section_type = header[3];
        let mut size = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let mut header_size = SECTION_HEADER_SIZE;
        if size == 0x00FF_FFFF {
            size = self.bytes.pread_with::<u32>(self.offset + SECTION_HEADER_SIZE, LE).ok()? as usize;
            header_size = SECTION_HEADER2_SIZE;
        }
        if size < header_size {
            return None;
        }
        let data = self.bytes.get(self.offset + header_size..self.offset + size)?;
        self.offset = (self.offset + size + 3) & !3;
        Some(Section { section_type, data })
    }
}

fn align8(value: usize) -> usize {
    (value + 7) & !7
}
