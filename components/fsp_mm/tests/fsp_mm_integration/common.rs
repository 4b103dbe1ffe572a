//! Common Test Infrastructure for FSP MM Integration Tests
//!
//! A simulated MM core, stateful SMRAM and cache fakes, and builders for the firmware volume and PE32+ image the
//! IPL loads.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use fsp_memory::mtrr::{CacheController, CacheType};
use fsp_mm::{
    component::communicator::{MM_DISPATCH_RESTART, MM_DISPATCH_SUCCESS},
    config::{CommunicateBuffer, EfiMmCommunicateHeader, MmCommunicationConfiguration},
    core_private::MmCorePrivate,
    ipl::MmCoreLauncher,
    service::{SmramAccess, SwMmiTrigger},
};
use fsp_pi::{
    hob::HobList,
    smram::{encode_descriptor_block, RegionState, SmramDescriptor},
};
use fsp_sdk::{error::EfiError, guids};
use r_efi::efi;

use core::pin::Pin;

pub const SMRAM_BASE: u64 = 0x7F00_0000;
pub const SMRAM_SIZE: u64 = 0x100_0000;

pub const IMAGE_BASE: u64 = 0x2000_0000;
pub const SIZE_OF_IMAGE: u32 = 0x4000;
pub const ENTRY_POINT: u32 = 0x1000;
pub const POINTER_RVA: usize = 0x2010;
/// Pages claimed from SMRAM for the image: its size plus one section alignment.
pub const CARVE_SIZE: u64 = 0x5000;

pub static ECHO_HANDLER: efi::Guid =
    efi::Guid::from_fields(0x5A9C_0B31, 0x7E21, 0x4C6A, 0x9D, 0x04, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

/// Stands in for the MM core: registers its entry point when started and answers every software MMI by reading
/// the request from the shared mailbox.
#[derive(Default)]
pub struct SimulatedMmCore {
    private: Cell<Option<&'static MmCorePrivate>>,
    pub requests: RefCell<Vec<(efi::Guid, Vec<u8>)>>,
    pub written: RefCell<Vec<(u64, Vec<u8>)>>,
    pub entry_points: RefCell<Vec<u64>>,
    pub triggers: Cell<usize>,
    pub pending_restarts: Cell<usize>,
}

impl SimulatedMmCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a dispatcher restart for the next `count` dispatch requests.
    pub fn with_restarts(count: usize) -> Self {
        let core = Self::default();
        core.pending_restarts.set(count);
        core
    }

    pub fn private(&self) -> Option<&'static MmCorePrivate> {
        self.private.get()
    }

    pub fn request_guids(&self) -> Vec<efi::Guid> {
        self.requests.borrow().iter().map(|(guid, _)| *guid).collect()
    }
}

unsafe impl MmCoreLauncher for SimulatedMmCore {
    unsafe fn write_image(&self, destination: u64, image: &[u8]) -> Result<(), EfiError> {
        self.written.borrow_mut().push((destination, image.to_vec()));
        Ok(())
    }

    fn invalidate_instruction_cache(&self, _base: u64, _length: u64) {}

    unsafe fn start_core(&self, entry_point: u64, hob_list: &'static [u8]) -> efi::Status {
        self.entry_points.borrow_mut().push(entry_point);
        let Ok(hobs) = HobList::parse(hob_list) else {
            return efi::Status::INVALID_PARAMETER;
        };
        match MmCorePrivate::from_hobs(&hobs) {
            Ok(private) => {
                private.register_entry_point();
                self.private.set(Some(private));
                efi::Status::SUCCESS
            }
            Err(err) => err.into(),
        }
    }
}

unsafe impl SwMmiTrigger for SimulatedMmCore {
    unsafe fn trigger_sw_mmi(
        &self,
        _command: Option<&[u8]>,
        periodic: bool,
        activation_interval: u64,
    ) -> fsp_sdk::error::Result<()> {
        if periodic || activation_interval != 0 {
            return Err(EfiError::DeviceError);
        }
        self.triggers.set(self.triggers.get() + 1);

        let private = self.private.get().ok_or(EfiError::NotReady)?;
        let size = private.buffer_size() as usize;
        let buffer = core::slice::from_raw_parts_mut(private.communication_buffer() as *mut u8, size);
        let header = EfiMmCommunicateHeader::from_bytes(buffer).ok_or(EfiError::InvalidParameter)?;
        let data = &mut buffer[EfiMmCommunicateHeader::size()..];
        let length = header.message_length.min(data.len());
        self.requests.borrow_mut().push((header.header_guid, data[..length].to_vec()));

        let status = if header.header_guid == guids::EVENT_DXE_DISPATCH {
            let restarts = self.pending_restarts.get();
            if restarts > 0 {
                self.pending_restarts.set(restarts - 1);
                data[0] = MM_DISPATCH_RESTART;
            } else {
                data[0] = MM_DISPATCH_SUCCESS;
            }
            efi::Status::SUCCESS
        } else if header.header_guid == ECHO_HANDLER {
            efi::Status::SUCCESS
        } else if header.header_guid == guids::MM_UEFI_INFO
            || header.header_guid == guids::MM_FV_DISPATCH
            || header.header_guid == guids::DXE_SMM_READY_TO_LOCK_PROTOCOL
            || header.header_guid == guids::END_OF_DXE_EVENT_GROUP
            || header.header_guid == guids::EVENT_LEGACY_BOOT
        {
            efi::Status::SUCCESS
        } else {
            efi::Status::NOT_FOUND
        };

        private.set_reply(size as u64, status);
        Ok(())
    }
}

/// SMRAM controller that tracks its state like the chipset does.
#[derive(Default)]
pub struct FakeSmramAccess {
    open: Cell<bool>,
    locked: Cell<bool>,
    pub opens: Cell<usize>,
    pub closes: Cell<usize>,
    pub locks: Cell<usize>,
}

impl SmramAccess for FakeSmramAccess {
    fn open(&self) -> fsp_sdk::error::Result<()> {
        if self.locked.get() {
            return Err(EfiError::AccessDenied);
        }
        self.opens.set(self.opens.get() + 1);
        self.open.set(true);
        Ok(())
    }

    fn close(&self) -> fsp_sdk::error::Result<()> {
        self.closes.set(self.closes.get() + 1);
        self.open.set(false);
        Ok(())
    }

    fn lock(&self) -> fsp_sdk::error::Result<()> {
        self.locks.set(self.locks.get() + 1);
        self.open.set(false);
        self.locked.set(true);
        Ok(())
    }

    fn open_state(&self) -> bool {
        self.open.get()
    }

    fn lock_state(&self) -> bool {
        self.locked.get()
    }
}

/// Records the cache attributes applied.
#[derive(Default)]
pub struct RecordingCache {
    pub ranges: Vec<(u64, u64, CacheType)>,
}

impl CacheController for RecordingCache {
    fn reset(&mut self) -> Result<(), EfiError> {
        self.ranges.clear();
        Ok(())
    }

    fn set_attributes(&mut self, base: u64, length: u64, cache_type: CacheType) -> Result<(), EfiError> {
        self.ranges.push((base, length, cache_type));
        Ok(())
    }
}

pub fn smram_hobs() -> HobList {
    let mut hobs = HobList::new();
    let range =
        SmramDescriptor { physical_start: SMRAM_BASE, cpu_start: SMRAM_BASE, physical_size: SMRAM_SIZE, region_state: RegionState::CLOSED };
    hobs.build_guid_data(guids::SMM_SMRAM_MEMORY, &encode_descriptor_block(&[range]));
    hobs
}

pub fn communication_config(buffer_size: usize) -> MmCommunicationConfiguration {
    let buffer: &'static mut [u8] = Box::leak(vec![0u8; buffer_size].into_boxed_slice());
    MmCommunicationConfiguration {
        comm_buffers: vec![unsafe { CommunicateBuffer::new(Pin::new(buffer), 0) }],
        ..Default::default()
    }
}

fn put(bytes: &mut [u8], offset: usize, value: &[u8]) {
    bytes[offset..offset + value.len()].copy_from_slice(value);
}

/// A PE32+ image with a `ret` at the entry point, one absolute pointer to it in `.data`, and a dir64 relocation
/// for that pointer.
pub fn core_image() -> Vec<u8> {
    let mut image = vec![0u8; 0x800];
    put(&mut image, 0, b"MZ");
    put(&mut image, 0x3C, &0x80u32.to_le_bytes());
    put(&mut image, 0x80, b"PE\0\0");

    // COFF header: x64, three sections, PE32+ optional header size.
    put(&mut image, 0x84, &0x8664u16.to_le_bytes());
    put(&mut image, 0x86, &3u16.to_le_bytes());
    put(&mut image, 0x94, &0xF0u16.to_le_bytes());
    put(&mut image, 0x96, &0x22u16.to_le_bytes());

    let opt = 0x98;
    put(&mut image, opt, &0x20Bu16.to_le_bytes());
    put(&mut image, opt + 4, &0x200u32.to_le_bytes());
    put(&mut image, opt + 16, &ENTRY_POINT.to_le_bytes());
    put(&mut image, opt + 20, &0x1000u32.to_le_bytes());
    put(&mut image, opt + 24, &IMAGE_BASE.to_le_bytes());
    put(&mut image, opt + 32, &0x1000u32.to_le_bytes());
    put(&mut image, opt + 36, &0x200u32.to_le_bytes());
    put(&mut image, opt + 56, &SIZE_OF_IMAGE.to_le_bytes());
    put(&mut image, opt + 60, &0x200u32.to_le_bytes());
    put(&mut image, opt + 68, &0xBu16.to_le_bytes());
    put(&mut image, opt + 108, &16u32.to_le_bytes());
    put(&mut image, opt + 112 + 5 * 8, &0x3000u32.to_le_bytes());
    put(&mut image, opt + 112 + 5 * 8 + 4, &12u32.to_le_bytes());

    let sections = opt + 0xF0;
    for (index, (name, virtual_size, rva, raw, characteristics)) in [
        (b".text\0\0\0", 0x100u32, 0x1000u32, 0x200u32, 0x6000_0020u32),
        (b".data\0\0\0", 0x100, 0x2000, 0x400, 0xC000_0040),
        (b".reloc\0\0", 12, 0x3000, 0x600, 0x4200_0040),
    ]
    .into_iter()
    .enumerate()
    {
        let header = sections + index * 40;
        put(&mut image, header, name);
        put(&mut image, header + 8, &virtual_size.to_le_bytes());
        put(&mut image, header + 12, &rva.to_le_bytes());
        put(&mut image, header + 16, &0x200u32.to_le_bytes());
        put(&mut image, header + 20, &raw.to_le_bytes());
        put(&mut image, header + 36, &characteristics.to_le_bytes());
    }

    image[0x200] = 0xC3;
    put(&mut image, 0x410, &(IMAGE_BASE + ENTRY_POINT as u64).to_le_bytes());
    put(&mut image, 0x600, &0x2000u32.to_le_bytes());
    put(&mut image, 0x604, &12u32.to_le_bytes());
    put(&mut image, 0x608, &0xA010u16.to_le_bytes());
    image
}

/// A firmware volume with a driver file followed by the standalone MM core file.
pub fn core_volume(pe: &[u8]) -> &'static [u8] {
    let length = 0x1000 + pe.len();
    let mut fv = vec![0u8; 0x38];
    fv[0x10..0x20].copy_from_slice(guids::EFI_FIRMWARE_FILE_SYSTEM2.as_bytes());
    put(&mut fv, 0x20, &(length as u64).to_le_bytes());
    put(&mut fv, 0x28, b"_FVH");
    put(&mut fv, 0x30, &0x38u16.to_le_bytes());
    fv[0x37] = 2;

    for (index, (file_type, body)) in [(0x07u8, &[0u8; 4][..]), (0x0F, pe)].into_iter().enumerate() {
        while fv.len() % 8 != 0 {
            fv.push(0xFF);
        }
        let section_size = (4 + body.len()) as u32;
        let file_size = 0x18 + section_size;
        let mut header = vec![0u8; 0x18];
        header[0] = index as u8 + 1;
        header[0x12] = file_type;
        header[0x14..0x17].copy_from_slice(&file_size.to_le_bytes()[..3]);
        fv.extend_from_slice(&header);
        fv.extend_from_slice(&section_size.to_le_bytes()[..3]);
        fv.push(0x10);
        fv.extend_from_slice(body);
    }
    fv.resize(length, 0xFF);
    Box::leak(fv.into_boxed_slice())
}

/// HOBs describing SMRAM plus one extracted firmware volume for the gateway to dispatch.
pub fn boot_hobs() -> HobList {
    let mut hobs = smram_hobs();
    hobs.push(fsp_pi::hob::Hob::FirmwareVolume2(fsp_pi::hob::FirmwareVolume2 {
        base_address: 0xFF80_0000,
        length: 0x4_0000,
        fv_name: guids::EFI_FIRMWARE_FILE_SYSTEM2,
        file_name: ECHO_HANDLER,
    }));
    hobs
}

/// Loads the simulated core into SMRAM without running the dispatcher.
pub fn load_simulated_core(
    hobs: &mut HobList,
    core: &SimulatedMmCore,
    access: &FakeSmramAccess,
) -> Result<&'static MmCorePrivate, EfiError> {
    let volume = core_volume(&core_image());
    let volumes = [fsp_mm::ipl::FirmwareVolumeImage { base: 0xFFC0_0000, bytes: volume }];
    let mut cache = RecordingCache::default();
    fsp_mm::ipl::MmIpl::new(Default::default(), access, &mut cache, core).load_core(hobs, &volumes)
}
