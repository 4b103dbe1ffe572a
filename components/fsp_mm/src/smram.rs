//! SMRAM range table.
//!
//! Holds the SMRAM descriptors reported by the memory initialization stage, picks the range the MM core is loaded
//! into and carves the image's space from the tail of that range. The window helpers apply open, close and lock
//! transitions through [`SmramAccess`] and refuse every transition once SMRAM is locked.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;

use fsp_pi::{
    hob::HobList,
    smram::{decode_descriptor_block, encode_descriptor_block, RegionState, SmramDescriptor},
};
use fsp_sdk::{
    base::{size_to_pages, SIZE_1MB, SIZE_256KB, SIZE_4GB, UEFI_PAGE_MASK, UEFI_PAGE_SHIFT, UEFI_PAGE_SIZE},
    error::{BootError, EfiError},
    guids,
};

use crate::service::smram_access::SmramAccess;

/// Smallest range the MM core may be loaded into.
pub const MIN_IPL_RANGE_SIZE: u64 = (SIZE_256KB - UEFI_PAGE_SIZE) as u64;

/// Range states that exclude a range from holding the MM core.
const UNUSABLE_STATES: RegionState = RegionState::ALLOCATED
    .union(RegionState::NEEDS_TESTING)
    .union(RegionState::NEEDS_ECC_INITIALIZATION);

/// Space claimed at the tail of an SMRAM range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Carveout {
    /// Index of the range the space was taken from.
    pub index: usize,
    /// Bytes claimed, a whole number of pages.
    pub size: u64,
    /// CPU address of the first claimed byte.
    pub destination: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SmramRangeTable {
    ranges: Vec<SmramDescriptor>,
}

impl SmramRangeTable {
    pub fn new(ranges: Vec<SmramDescriptor>) -> Self {
        Self { ranges }
    }

    /// Reads the ranges from the SMRAM memory GUID HOB.
    pub fn from_hobs(hobs: &HobList) -> Result<Self, BootError> {
        let data = hobs.guid_hob_data(&guids::SMM_SMRAM_MEMORY).ok_or(BootError::ResourceNotFound)?;
        let ranges = decode_descriptor_block(data).map_err(|_| BootError::ConfigurationInvalid)?;
        if ranges.is_empty() {
            return Err(BootError::ResourceNotFound);
        }
        Ok(Self { ranges })
    }

    pub fn ranges(&self) -> &[SmramDescriptor] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Encoded descriptor count and array, in the layout of the SMRAM memory GUID HOB.
    pub fn descriptor_block(&self) -> Vec<u8> {
        encode_descriptor_block(&self.ranges)
    }

    /// Index of the range the MM core should be loaded into.
    ///
    /// The largest usable range entirely within `[1 MiB, 4 GiB)` wins; among equal sizes the first one listed is
    /// kept.
    pub fn select_ipl_range(&self) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (index, range) in self.ranges.iter().enumerate() {
            if range.region_state.intersects(UNUSABLE_STATES) {
                continue;
            }
            if range.cpu_start < SIZE_1MB as u64 || range.cpu_end() > SIZE_4GB as u64 {
                continue;
            }
            if range.physical_size < MIN_IPL_RANGE_SIZE {
                continue;
            }
            match best {
                Some((_, size)) if range.physical_size <= size => {}
                _ => best = Some((index, range.physical_size)),
            }
        }
        best.map(|(index, _)| index)
    }

    /// The region to mark cacheable while the MM core is loaded into range `index`.
    ///
    /// The range is grown over every range that is adjacent in CPU address space, on either side, until no more
    /// neighbours are found.
    pub fn cache_range(&self, index: usize) -> Option<(u64, u64)> {
        let range = self.ranges.get(index)?;
        let mut base = range.cpu_start;
        let mut size = range.physical_size;
        loop {
            let mut grown = false;
            for other in &self.ranges {
                if other.cpu_start < base && base == other.cpu_end() {
                    base = other.cpu_start;
                    size += other.physical_size;
                    grown = true;
                } else if base + size == other.cpu_start && other.physical_size > 0 {
                    size += other.physical_size;
                    grown = true;
                }
            }
            if !grown {
                break;
            }
        }
        Some((base, size))
    }

    /// Claims space for an image of `image_size` bytes at the tail of range `index`.
    ///
    /// One extra `section_alignment` is claimed so the image base can be aligned inside the carved space. The range
    /// must be page aligned in size and strictly larger than the claim.
    pub fn carve(&mut self, index: usize, image_size: u64, section_alignment: u64) -> Result<Carveout, BootError> {
        let range = self.ranges.get_mut(index).ok_or(BootError::ResourceNotFound)?;
        let request = image_size.checked_add(section_alignment).ok_or(BootError::ResourceExhausted)?;
        let size = (size_to_pages(request as usize) as u64) << UEFI_PAGE_SHIFT;

        if range.physical_size & UEFI_PAGE_MASK as u64 != 0 || range.physical_size <= size {
            return Err(BootError::ResourceExhausted);
        }

        range.physical_size -= size;
        Ok(Carveout { index, size, destination: range.cpu_start + range.physical_size })
    }

    /// Records a successful carve as an allocated range so nothing else reuses it.
    pub fn commit(&mut self, carve: Carveout) -> Result<(), BootError> {
        let range = *self.ranges.get(carve.index).ok_or(BootError::ResourceNotFound)?;
        self.ranges.push(SmramDescriptor {
            physical_start: range.physical_start + range.physical_size,
            cpu_start: carve.destination,
            physical_size: carve.size,
            region_state: range.region_state | RegionState::ALLOCATED,
        });
        Ok(())
    }

    /// Gives the space of a failed carve back to its range, dropping its allocated entry if one was committed.
    pub fn restore(&mut self, carve: Carveout) {
        self.ranges.retain(|r| {
            !(r.cpu_start == carve.destination
                && r.physical_size == carve.size
                && r.region_state.contains(RegionState::ALLOCATED))
        });
        if let Some(range) = self.ranges.get_mut(carve.index) {
            range.physical_size += carve.size;
        }
    }

    /// Opens SMRAM and marks every range open.
    pub fn open(&mut self, access: &dyn SmramAccess) -> Result<(), EfiError> {
        open_window(access)?;
        self.set_state(RegionState::OPEN, RegionState::CLOSED);
        Ok(())
    }

    /// Closes SMRAM and marks every range closed.
    pub fn close(&mut self, access: &dyn SmramAccess) -> Result<(), EfiError> {
        close_window(access)?;
        self.set_state(RegionState::CLOSED, RegionState::OPEN);
        Ok(())
    }

    fn set_state(&mut self, set: RegionState, clear: RegionState) {
        for range in self.ranges.iter_mut() {
            range.region_state.remove(clear);
            range.region_state.insert(set);
        }
    }
}

/// Makes SMRAM visible outside of MM.
pub fn open_window(access: &dyn SmramAccess) -> Result<(), EfiError> {
    if access.lock_state() {
        log::error!(target: "mm_ipl", "SMRAM window is locked and cannot be opened");
        return Err(EfiError::AccessDenied);
    }
    access.open()?;
    log::info!(target: "mm_ipl", "SMM IPL opened SMRAM window");
    Ok(())
}

/// Hides SMRAM from code running outside of MM.
pub fn close_window(access: &dyn SmramAccess) -> Result<(), EfiError> {
    if access.lock_state() {
        log::warn!(target: "mm_ipl", "SMRAM window is locked; close ignored");
        return Err(EfiError::AccessDenied);
    }
    access.close()?;
    log::info!(target: "mm_ipl", "SMM IPL closed SMRAM window");
    Ok(())
}

/// Locks SMRAM until reset.
pub fn lock_window(access: &dyn SmramAccess) -> Result<(), EfiError> {
    if access.lock_state() {
        return Err(EfiError::AccessDenied);
    }
    access.lock()?;
    log::info!(target: "mm_ipl", "SMM IPL locked SMRAM window");
    Ok(())
}
