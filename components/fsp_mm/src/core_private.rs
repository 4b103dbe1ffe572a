//! State shared between the MM IPL and the MM core.
//!
//! The IPL allocates one [`MmCorePrivate`] outside of SMRAM and publishes its address in the MM core data GUID HOB.
//! The MM core reads the communication mailbox from it on every software MMI and writes back the reply size and
//! status. Fields are atomics because the MM core accesses the structure from a different execution mode; there
//! is still only one request in flight at a time.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use fsp_pi::hob::HobList;
use fsp_sdk::{error::EfiError, guids};
use r_efi::efi;

/// `"smmc"` in little-endian byte order.
pub const MM_CORE_PRIVATE_SIGNATURE: u32 = u32::from_le_bytes(*b"smmc");

/// The MM core image as loaded into SMRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreImage {
    pub base: u64,
    pub size: u64,
    pub entry_point: u64,
}

#[repr(C)]
#[derive(Debug)]
pub struct MmCorePrivate {
    signature: u32,
    in_mm: AtomicBool,
    entry_point_registered: AtomicBool,
    image_base: AtomicU64,
    image_size: AtomicU64,
    entry_point: AtomicU64,
    mmram_ranges: AtomicU64,
    mmram_range_count: AtomicU64,
    standalone_bfv_address: AtomicU64,
    communication_buffer: AtomicU64,
    buffer_size: AtomicU64,
    return_status: AtomicU64,
}

impl Default for MmCorePrivate {
    fn default() -> Self {
        Self::new()
    }
}

impl MmCorePrivate {
    pub const fn new() -> Self {
        Self {
            signature: MM_CORE_PRIVATE_SIGNATURE,
            in_mm: AtomicBool::new(false),
            entry_point_registered: AtomicBool::new(false),
            image_base: AtomicU64::new(0),
            image_size: AtomicU64::new(0),
            entry_point: AtomicU64::new(0),
            mmram_ranges: AtomicU64::new(0),
            mmram_range_count: AtomicU64::new(0),
            standalone_bfv_address: AtomicU64::new(0),
            communication_buffer: AtomicU64::new(0),
            buffer_size: AtomicU64::new(0),
            return_status: AtomicU64::new(0),
        }
    }

    /// Allocates a structure that lives until reset and records its address in `hobs`.
    pub fn publish(hobs: &mut HobList) -> &'static MmCorePrivate {
        let private: &'static MmCorePrivate = Box::leak(Box::new(MmCorePrivate::new()));
        let address = private as *const MmCorePrivate as u64;
        hobs.build_guid_data(guids::MM_CORE_DATA_HOB, &address.to_le_bytes());
        private
    }

    /// Finds the structure published in `hobs`.
    ///
    /// Returns `Unsupported` when the MM core data HOB is absent, which means no MM core was loaded.
    ///
    /// ## Safety
    ///
    /// The address in the HOB must point to a live `MmCorePrivate`.
    pub unsafe fn from_hobs(hobs: &HobList) -> Result<&'static MmCorePrivate, EfiError> {
        let data = hobs.guid_hob_data(&guids::MM_CORE_DATA_HOB).ok_or(EfiError::Unsupported)?;
        let bytes: [u8; 8] = data.get(..8).and_then(|b| b.try_into().ok()).ok_or(EfiError::Unsupported)?;
        let address = u64::from_le_bytes(bytes);
        if address == 0 {
            return Err(EfiError::Unsupported);
        }
        let private = &*(address as *const MmCorePrivate);
        if private.signature != MM_CORE_PRIVATE_SIGNATURE {
            return Err(EfiError::Unsupported);
        }
        Ok(private)
    }

    pub fn in_mm(&self) -> bool {
        self.in_mm.load(Ordering::SeqCst)
    }

    /// Sets the in-MM flag and returns the previous value.
    pub fn set_in_mm(&self, in_mm: bool) -> bool {
        self.in_mm.swap(in_mm, Ordering::SeqCst)
    }

    pub fn entry_point_registered(&self) -> bool {
        self.entry_point_registered.load(Ordering::SeqCst)
    }

    /// Called on behalf of the MM core once its MMI entry point is installed.
    pub fn register_entry_point(&self) {
        self.entry_point_registered.store(true, Ordering::SeqCst);
    }

    /// Places a request in the mailbox.
    pub fn post_request(&self, buffer: u64, size: u64) {
        self.return_status.store(efi::Status::SUCCESS.as_usize() as u64, Ordering::SeqCst);
        self.communication_buffer.store(buffer, Ordering::SeqCst);
        self.buffer_size.store(size, Ordering::SeqCst);
    }

    /// Writes the reply to the outstanding request.
    pub fn set_reply(&self, size: u64, status: efi::Status) {
        self.buffer_size.store(size, Ordering::SeqCst);
        self.return_status.store(status.as_usize() as u64, Ordering::SeqCst);
    }

    pub fn communication_buffer(&self) -> u64 {
        self.communication_buffer.load(Ordering::SeqCst)
    }

    pub fn buffer_size(&self) -> u64 {
        self.buffer_size.load(Ordering::SeqCst)
    }

    pub fn return_status(&self) -> efi::Status {
        efi::Status::from_usize(self.return_status.load(Ordering::SeqCst) as usize)
    }

    /// Clears the mailbox once the request is finished.
    pub fn clear_request(&self) {
        self.communication_buffer.store(0, Ordering::SeqCst);
    }

    pub fn record_core_image(&self, image: CoreImage) {
        self.image_base.store(image.base, Ordering::SeqCst);
        self.image_size.store(image.size, Ordering::SeqCst);
        self.entry_point.store(image.entry_point, Ordering::SeqCst);
    }

    pub fn core_image(&self) -> CoreImage {
        CoreImage {
            base: self.image_base.load(Ordering::SeqCst),
            size: self.image_size.load(Ordering::SeqCst),
            entry_point: self.entry_point.load(Ordering::SeqCst),
        }
    }

    /// Records where the SMRAM descriptor array lives and how many entries it holds.
    pub fn publish_mmram_ranges(&self, address: u64, count: u64) {
        self.mmram_ranges.store(address, Ordering::SeqCst);
        self.mmram_range_count.store(count, Ordering::SeqCst);
    }

    pub fn mmram_ranges(&self) -> (u64, u64) {
        (self.mmram_ranges.load(Ordering::SeqCst), self.mmram_range_count.load(Ordering::SeqCst))
    }

    pub fn set_standalone_bfv_address(&self, address: u64) {
        self.standalone_bfv_address.store(address, Ordering::SeqCst);
    }

    pub fn standalone_bfv_address(&self) -> u64 {
        self.standalone_bfv_address.load(Ordering::SeqCst)
    }
}
