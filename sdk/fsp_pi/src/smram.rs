//! SMRAM descriptors and the SMRAM reservation GUID HOB.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;

use bitflags::bitflags;
use scroll::{Pread, LE};

use crate::hob::HobError;

bitflags! {
    /// SMRAM region state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RegionState: u64 {
        const OPEN = 0x0000_0001;
        const CLOSED = 0x0000_0002;
        const LOCKED = 0x0000_0004;
        const CACHEABLE = 0x0000_0008;
        const ALLOCATED = 0x0000_0010;
        const NEEDS_TESTING = 0x0000_0020;
        const NEEDS_ECC_INITIALIZATION = 0x0000_0040;
    }
}

/// One SMRAM range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmramDescriptor {
    pub physical_start: u64,
    pub cpu_start: u64,
    pub physical_size: u64,
    pub region_state: RegionState,
}

impl SmramDescriptor {
    pub const SIZE: usize = 32;

    /// One past the last CPU-visible byte of the range.
    pub fn cpu_end(&self) -> u64 {
        self.cpu_start + self.physical_size
    }
}

/// Offset of the first descriptor in the GUID HOB data; the u32 count is padded to 8 bytes.
const DESCRIPTOR_OFFSET: usize = 8;

/// Encodes the data of an SMRAM reservation GUID HOB.
pub fn encode_descriptor_block(descriptors: &[SmramDescriptor]) -> Vec<u8> {
    let mut data = Vec::with_capacity(DESCRIPTOR_OFFSET + descriptors.len() * SmramDescriptor::SIZE);
    data.extend_from_slice(&(descriptors.len() as u32).to_le_bytes());
    data.extend_from_slice(&[0u8; 4]);
    for descriptor in descriptors {
        data.extend_from_slice(&descriptor.physical_start.to_le_bytes());
        data.extend_from_slice(&descriptor.cpu_start.to_le_bytes());
        data.extend_from_slice(&descriptor.physical_size.to_le_bytes());
        data.extend_from_slice(&descriptor.region_state.bits().to_le_bytes());
    }
    data
}

/// Decodes the data of an SMRAM reservation GUID HOB.
pub fn decode_descriptor_block(data: &[u8]) -> Result<Vec<SmramDescriptor>, HobError> {
    let count: u32 = data.pread_with(0, LE)?;
    let mut offset = DESCRIPTOR_OFFSET;
    let mut descriptors = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let physical_start: u64 = data.gread_with(&mut offset, LE)?;
        let cpu_start: u64 = data.gread_with(&mut offset, LE)?;
        let physical_size: u64 = data.gread_with(&mut offset, LE)?;
        let state: u64 = data.gread_with(&mut offset, LE)?;
        descriptors.push(SmramDescriptor {
            physical_start,
            cpu_start,
            physical_size,
            region_state: RegionState::from_bits_retain(state),
        });
    }
    Ok(descriptors)
}
