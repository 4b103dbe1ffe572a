//! Hand-off block (HOB) records and the append-only HOB list.
//!
//! A HOB list is a sequence of variable-length records, each starting with a common [`header::Hob`], terminated
//! by an end-of-list record. [`HobList`] keeps records in creation order and serializes them into the binary form
//! handed to the next boot stage.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;
use core::mem;

use fsp_sdk::error::EfiError;
use r_efi::efi;
use scroll::{Pread, LE};

/// Phase handoff information table HOB type.
pub const HANDOFF: u16 = 0x0001;
/// Memory allocation HOB type.
pub const MEMORY_ALLOCATION: u16 = 0x0002;
/// Resource descriptor HOB type.
pub const RESOURCE_DESCRIPTOR: u16 = 0x0003;
/// GUID extension HOB type.
pub const GUID_EXTENSION: u16 = 0x0004;
/// Firmware volume HOB type.
pub const FV: u16 = 0x0005;
/// CPU HOB type.
pub const CPU: u16 = 0x0006;
/// Firmware volume 2 HOB type.
pub const FV2: u16 = 0x0009;
/// End of HOB list marker.
pub const END_OF_HOB_LIST: u16 = 0xFFFF;

/// System memory resource type.
pub const EFI_RESOURCE_SYSTEM_MEMORY: u32 = 0x0000_0000;
/// Memory-mapped I/O resource type.
pub const EFI_RESOURCE_MEMORY_MAPPED_IO: u32 = 0x0000_0001;
/// I/O resource type.
pub const EFI_RESOURCE_IO: u32 = 0x0000_0002;
/// Firmware device resource type.
pub const EFI_RESOURCE_FIRMWARE_DEVICE: u32 = 0x0000_0003;
/// Reserved memory resource type.
pub const EFI_RESOURCE_MEMORY_RESERVED: u32 = 0x0000_0005;

pub const EFI_RESOURCE_ATTRIBUTE_PRESENT: u32 = 0x0000_0001;
pub const EFI_RESOURCE_ATTRIBUTE_INITIALIZED: u32 = 0x0000_0002;
pub const EFI_RESOURCE_ATTRIBUTE_TESTED: u32 = 0x0000_0004;
pub const EFI_RESOURCE_ATTRIBUTE_UNCACHEABLE: u32 = 0x0000_0400;
pub const EFI_RESOURCE_ATTRIBUTE_WRITE_COMBINEABLE: u32 = 0x0000_0800;
pub const EFI_RESOURCE_ATTRIBUTE_WRITE_THROUGH_CACHEABLE: u32 = 0x0000_1000;
pub const EFI_RESOURCE_ATTRIBUTE_WRITE_BACK_CACHEABLE: u32 = 0x0000_2000;

/// Attributes of memory that is present and initialized but has not been tested.
pub const MEMORY_NOT_TESTED_ATTRIBUTES: u32 = EFI_RESOURCE_ATTRIBUTE_PRESENT
    | EFI_RESOURCE_ATTRIBUTE_INITIALIZED
    | EFI_RESOURCE_ATTRIBUTE_UNCACHEABLE
    | EFI_RESOURCE_ATTRIBUTE_WRITE_COMBINEABLE
    | EFI_RESOURCE_ATTRIBUTE_WRITE_THROUGH_CACHEABLE
    | EFI_RESOURCE_ATTRIBUTE_WRITE_BACK_CACHEABLE;

/// Attributes of memory that is present, initialized and tested.
pub const MEMORY_TESTED_ATTRIBUTES: u32 = MEMORY_NOT_TESTED_ATTRIBUTES | EFI_RESOURCE_ATTRIBUTE_TESTED;

pub mod header {
    /// Common header at the start of every HOB.
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Hob {
        pub r#type: u16,
        pub length: u16,
        pub reserved: u32,
    }

    impl Hob {
        pub const SIZE: usize = core::mem::size_of::<Hob>();
    }
}

/// Errors produced while decoding a serialized HOB list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HobError {
    /// The list ended before an end-of-list record was found.
    Truncated,
    /// A record declared a length too small for its type or not a multiple of 8.
    InvalidLength(u16),
}

impl From<HobError> for EfiError {
    fn from(_: HobError) -> Self {
        EfiError::VolumeCorrupted
    }
}

impl From<scroll::Error> for HobError {
    fn from(_: scroll::Error) -> Self {
        HobError::Truncated
    }
}

/// Describes a range of physical address space and who owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub owner: efi::Guid,
    pub resource_type: u32,
    pub resource_attribute: u32,
    pub physical_start: u64,
    pub resource_length: u64,
}

impl ResourceDescriptor {
    /// One past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.physical_start + self.resource_length
    }
}

/// A firmware volume made available to later stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVolume {
    pub base_address: u64,
    pub length: u64,
}

/// A firmware volume extracted from a file in another volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVolume2 {
    pub base_address: u64,
    pub length: u64,
    pub fv_name: efi::Guid,
    pub file_name: efi::Guid,
}

/// Processor address space sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cpu {
    pub size_of_memory_space: u8,
    pub size_of_io_space: u8,
}

/// A single decoded HOB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hob {
    ResourceDescriptor(ResourceDescriptor),
    FirmwareVolume(FirmwareVolume),
    FirmwareVolume2(FirmwareVolume2),
    Cpu(Cpu),
    /// Opaque data tagged with a GUID. `data` may carry trailing padding after decoding.
    GuidExtension { name: efi::Guid, data: Vec<u8> },
    /// Any HOB type this crate does not interpret; `data` excludes the common header.
    Other { hob_type: u16, data: Vec<u8> },
}

impl Hob {
    /// The HOB type code written into the header.
    pub fn hob_type(&self) -> u16 {
        match self {
            Hob::ResourceDescriptor(_) => RESOURCE_DESCRIPTOR,
            Hob::FirmwareVolume(_) => FV,
            Hob::FirmwareVolume2(_) => FV2,
            Hob::Cpu(_) => CPU,
            Hob::GuidExtension { .. } => GUID_EXTENSION,
            Hob::Other { hob_type, .. } => *hob_type,
        }
    }

    fn write_body(&self, out: &mut Vec<u8>) {
        match self {
            Hob::ResourceDescriptor(rd) => {
                out.extend_from_slice(rd.owner.as_bytes());
                out.extend_from_slice(&rd.resource_type.to_le_bytes());
                out.extend_from_slice(&rd.resource_attribute.to_le_bytes());
                out.extend_from_slice(&rd.physical_start.to_le_bytes());
                out.extend_from_slice(&rd.resource_length.to_le_bytes());
            }
            Hob::FirmwareVolume(fv) => {
                out.extend_from_slice(&fv.base_address.to_le_bytes());
                out.extend_from_slice(&fv.length.to_le_bytes());
            }
            Hob::FirmwareVolume2(fv) => {
                out.extend_from_slice(&fv.base_address.to_le_bytes());
                out.extend_from_slice(&fv.length.to_le_bytes());
                out.extend_from_slice(fv.fv_name.as_bytes());
                out.extend_from_slice(fv.file_name.as_bytes());
            }
            Hob::Cpu(cpu) => {
                out.extend_from_slice(&[cpu.size_of_memory_space, cpu.size_of_io_space, 0, 0, 0, 0, 0, 0]);
            }
            Hob::GuidExtension { name, data } => {
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(data);
            }
            Hob::Other { data, .. } => out.extend_from_slice(data),
        }
    }

    /// Appends the serialized record, header included, padded to an 8-byte multiple.
    fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&[0u8; header::Hob::SIZE]);
        self.write_body(out);
        while (out.len() - start) % 8 != 0 {
            out.push(0);
        }
        let length = (out.len() - start) as u16;
        out[start..start + 2].copy_from_slice(&self.hob_type().to_le_bytes());
        out[start + 2..start + 4].copy_from_slice(&length.to_le_bytes());
    }

    fn parse(hob_type: u16, body: &[u8]) -> Result<Self, HobError> {
        let mut offset = 0usize;
        let guid = |offset: &mut usize| -> Result<efi::Guid, HobError> {
            let bytes: &[u8; 16] =
                body.get(*offset..*offset + 16).and_then(|b| b.try_into().ok()).ok_or(HobError::Truncated)?;
            *offset += 16;
            Ok(efi::Guid::from_bytes(bytes))
        };

        let hob = match hob_type {
            RESOURCE_DESCRIPTOR => Hob::ResourceDescriptor(ResourceDescriptor {
                owner: guid(&mut offset)?,
                resource_type: body.gread_with(&mut offset, LE)?,
                resource_attribute: body.gread_with(&mut offset, LE)?,
                physical_start: body.gread_with(&mut offset, LE)?,
                resource_length: body.gread_with(&mut offset, LE)?,
            }),
            FV => Hob::FirmwareVolume(FirmwareVolume {
                base_address: body.gread_with(&mut offset, LE)?,
                length: body.gread_with(&mut offset, LE)?,
            }),
            FV2 => Hob::FirmwareVolume2(FirmwareVolume2 {
                base_address: body.gread_with(&mut offset, LE)?,
                length: body.gread_with(&mut offset, LE)?,
                fv_name: guid(&mut offset)?,
                file_name: guid(&mut offset)?,
            }),
            CPU => Hob::Cpu(Cpu {
                size_of_memory_space: body.gread_with(&mut offset, LE)?,
                size_of_io_space: body.gread_with(&mut offset, LE)?,
            }),
            GUID_EXTENSION => Hob::GuidExtension { name: guid(&mut offset)?, data: body[16..].to_vec() },
            other => Hob::Other { hob_type: other, data: body.to_vec() },
        };
        Ok(hob)
    }
}

/// An ordered, append-only collection of HOBs.
///
/// Records cannot be modified or removed once pushed. Iteration order is creation order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HobList {
    hobs: Vec<Hob>,
}

impl HobList {
    /// Creates an empty list.
    pub const fn new() -> Self {
        Self { hobs: Vec::new() }
    }

    /// Appends a record to the end of the list.
    pub fn push(&mut self, hob: Hob) {
        self.hobs.push(hob);
    }

    /// Iterates over the records in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Hob> {
        self.hobs.iter()
    }

    pub fn len(&self) -> usize {
        self.hobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hobs.is_empty()
    }

    /// Appends a resource descriptor without an owner.
    pub fn build_resource_descriptor(&mut self, resource_type: u32, attribute: u32, start: u64, length: u64) {
        self.build_resource_descriptor_with_owner(resource_type, attribute, start, length, fsp_sdk::guids::ZERO);
    }

    /// Appends a resource descriptor tagged with `owner`.
    pub fn build_resource_descriptor_with_owner(
        &mut self,
        resource_type: u32,
        attribute: u32,
        start: u64,
        length: u64,
        owner: efi::Guid,
    ) {
        self.push(Hob::ResourceDescriptor(ResourceDescriptor {
            owner,
            resource_type,
            resource_attribute: attribute,
            physical_start: start,
            resource_length: length,
        }));
    }

    /// Appends a firmware volume record.
    pub fn build_fv(&mut self, base_address: u64, length: u64) {
        self.push(Hob::FirmwareVolume(FirmwareVolume { base_address, length }));
    }

    /// Appends a CPU record.
    pub fn build_cpu(&mut self, size_of_memory_space: u8, size_of_io_space: u8) {
        self.push(Hob::Cpu(Cpu { size_of_memory_space, size_of_io_space }));
    }

    /// Appends a GUID-tagged data record.
    pub fn build_guid_data(&mut self, name: efi::Guid, data: &[u8]) {
        self.push(Hob::GuidExtension { name, data: data.to_vec() });
    }

    /// Iterates over every resource descriptor.
    pub fn resource_descriptors(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.hobs.iter().filter_map(|hob| match hob {
            Hob::ResourceDescriptor(rd) => Some(rd),
            _ => None,
        })
    }

    /// Returns the first resource descriptor owned by `owner`.
    pub fn find_resource_by_owner(&self, owner: &efi::Guid) -> Option<&ResourceDescriptor> {
        self.resource_descriptors().find(|rd| rd.owner == *owner)
    }

    /// Returns the data of the first GUID extension record named `name`.
    pub fn guid_hob_data(&self, name: &efi::Guid) -> Option<&[u8]> {
        self.hobs.iter().find_map(|hob| match hob {
            Hob::GuidExtension { name: n, data } if n == name => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Iterates over every firmware volume 2 record.
    pub fn fv2_volumes(&self) -> impl Iterator<Item = &FirmwareVolume2> {
        self.hobs.iter().filter_map(|hob| match hob {
            Hob::FirmwareVolume2(fv) => Some(fv),
            _ => None,
        })
    }

    /// Serializes the list, end-of-list record included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for hob in &self.hobs {
            hob.write_to(&mut out);
        }
        out.extend_from_slice(&END_OF_HOB_LIST.to_le_bytes());
        out.extend_from_slice(&(header::Hob::SIZE as u16).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out
    }

    /// Decodes a serialized list, stopping at the end-of-list record.
    pub fn parse(bytes: &[u8]) -> Result<Self, HobError> {
        let mut list = HobList::new();
        let mut offset = 0usize;
        loop {
            let mut cursor = offset;
            let hob_type: u16 = bytes.gread_with(&mut cursor, LE)?;
            let length: u16 = bytes.gread_with(&mut cursor, LE)?;
            if hob_type == END_OF_HOB_LIST {
                return Ok(list);
            }
            if (length as usize) < header::Hob::SIZE || length % 8 != 0 {
                return Err(HobError::InvalidLength(length));
            }
            let body = bytes.get(offset + header::Hob::SIZE..offset + length as usize).ok_or(HobError::Truncated)?;
            list.push(Hob::parse(hob_type, body)?);
            offset += length as usize;
        }
    }

    /// Decodes a list that lives at a raw physical address.
    ///
    /// ## Safety
    ///
    /// `address` must point at a well-formed HOB list that stays mapped and unmodified for the call.
    pub unsafe fn from_address(address: usize) -> Result<Self, HobError> {
        let mut length = 0usize;
        loop {
            // SAFETY: each header is inside the list per the caller's contract.
            let header = unsafe { core::ptr::read_unaligned((address + length) as *const header::Hob) };
            if header.r#type == END_OF_HOB_LIST {
                length += header::Hob::SIZE;
                break;
            }
            if (header.length as usize) < mem::size_of::<header::Hob>() {
                return Err(HobError::InvalidLength(header.length));
            }
            length += header.length as usize;
        }
        // SAFETY: the walk above established `length` bytes of valid list.
        Self::parse(unsafe { core::slice::from_raw_parts(address as *const u8, length) })
    }
}
