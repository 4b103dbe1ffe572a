//! MM Initial Program Loader (IPL)
//!
//! Loads the standalone MM core from a firmware volume into SMRAM and runs it once so it can install its MMI entry
//! point, then asks it to dispatch its drivers.
//!
//! The IPL is the one part of the boot flow that reports failure to its caller instead of halting: without a usable
//! SMRAM range or a loadable core the platform continues without MM. On every failure path SMRAM is closed again
//! and `Unsupported` is returned.
//!
//! ## Logging
//!
//! Progress is logged with the `mm_ipl` target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{boxed::Box, vec, vec::Vec};

use fsp_memory::mtrr::{CacheController, CacheType};
use fsp_pi::{
    fw_fs::{file_type, section_type, Volume},
    hob::{Hob, HobList},
    smram::SmramDescriptor,
};
use fsp_sdk::{
    base::{align_up, UEFI_PAGE_SHIFT},
    error::EfiError,
};
use r_efi::efi;

use crate::component::communicator::{MmCommunicator, RealMmExecutor};
use crate::config::{MmCommunicationConfiguration, MmIplConfiguration};
use crate::core_private::{CoreImage, MmCorePrivate};
use crate::pecoff::{self, PeInfo};
use crate::service::{smram_access::SmramAccess, SwMmiTrigger};
use crate::smram::SmramRangeTable;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// MMI command value used while the IPL still owns the boot flow.
const IPL_MMI_COMMAND: u8 = 0;

/// Places the MM core in SMRAM and transfers control to it.
///
/// ## Safety
///
/// Implementations write to and execute from raw physical addresses handed to them by the IPL.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub unsafe trait MmCoreLauncher {
    /// Copies the loaded image to `destination`.
    ///
    /// ## Safety
    ///
    /// `destination` must be the start of at least `image.len()` writable bytes of open SMRAM.
    unsafe fn write_image(&self, destination: u64, image: &[u8]) -> Result<(), EfiError>;

    /// Makes freshly written code visible to instruction fetch.
    fn invalidate_instruction_cache(&self, base: u64, length: u64);

    /// Calls the MM core entry point with the HOB list as its only argument.
    ///
    /// ## Safety
    ///
    /// `entry_point` must be the entry of a relocated image written by [`Self::write_image`].
    unsafe fn start_core(&self, entry_point: u64, hob_list: &'static [u8]) -> efi::Status;
}

fsp_sdk::if_x64! {
    /// Launches the MM core on the executing processor.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SmramLauncher;

    unsafe impl MmCoreLauncher for SmramLauncher {
        unsafe fn write_image(&self, destination: u64, image: &[u8]) -> Result<(), EfiError> {
            if destination == 0 {
                return Err(EfiError::InvalidParameter);
            }
            core::ptr::copy_nonoverlapping(image.as_ptr(), destination as *mut u8, image.len());
            Ok(())
        }

        fn invalidate_instruction_cache(&self, _base: u64, _length: u64) {
            // x86 snoops instruction fetches against data writes; only ordering is needed.
            core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
        }

        unsafe fn start_core(&self, entry_point: u64, hob_list: &'static [u8]) -> efi::Status {
            let entry: extern "efiapi" fn(*const core::ffi::c_void) -> efi::Status =
                core::mem::transmute(entry_point as usize);
            entry(hob_list.as_ptr() as *const core::ffi::c_void)
        }
    }
}

/// A firmware volume and the address it is mapped at.
#[derive(Debug, Clone, Copy)]
pub struct FirmwareVolumeImage<'a> {
    pub base: u64,
    pub bytes: &'a [u8],
}

impl FirmwareVolumeImage<'static> {
    /// Maps every firmware volume reported in `hobs`.
    ///
    /// ## Safety
    ///
    /// Every FV HOB must describe readable memory that stays mapped for the rest of boot.
    pub unsafe fn from_hobs(hobs: &HobList) -> Vec<Self> {
        hobs.iter()
            .filter_map(|hob| match hob {
                Hob::FirmwareVolume(fv) if fv.base_address != 0 && fv.length != 0 => Some(Self {
                    base: fv.base_address,
                    bytes: core::slice::from_raw_parts(fv.base_address as *const u8, fv.length as usize),
                }),
                _ => None,
            })
            .collect()
    }
}

/// Finds the PE32 section of the first standalone MM core file in `volumes`.
///
/// Returns the base of the volume holding it along with the image bytes.
pub fn find_core_image<'a>(volumes: &[FirmwareVolumeImage<'a>]) -> Result<(u64, &'a [u8]), EfiError> {
    for fv in volumes {
        let volume = match Volume::new(fv.bytes) {
            Ok(volume) => volume,
            Err(err) => {
                log::debug!(target: "mm_ipl", "Skipping firmware volume at {:#x}: {:?}", fv.base, err);
                continue;
            }
        };
        if let Ok(image) = volume.find_section(file_type::MM_CORE_STANDALONE, section_type::PE32) {
            log::info!(target: "mm_ipl", "MM core found in firmware volume at {:#x}", fv.base);
            return Ok((fv.base, image));
        }
    }
    log::error!(target: "mm_ipl", "No standalone MM core in {} firmware volumes", volumes.len());
    Err(EfiError::NotFound)
}

pub struct MmIpl<'a> {
    config: MmIplConfiguration,
    smram_access: &'a dyn SmramAccess,
    cache: &'a mut dyn CacheController,
    launcher: &'a dyn MmCoreLauncher,
}

impl<'a> MmIpl<'a> {
    pub fn new(
        config: MmIplConfiguration,
        smram_access: &'a dyn SmramAccess,
        cache: &'a mut dyn CacheController,
        launcher: &'a dyn MmCoreLauncher,
    ) -> Self {
        Self { config, smram_access, cache, launcher }
    }

    /// Loads and starts the MM core, then runs the MM driver dispatcher through a software MMI.
    pub fn entry_point(
        &mut self,
        hobs: &mut HobList,
        volumes: &[FirmwareVolumeImage<'_>],
        communication: &MmCommunicationConfiguration,
        sw_mmi_trigger: &dyn SwMmiTrigger,
    ) -> Result<&'static MmCorePrivate, EfiError> {
        let private = self.load_core(hobs, volumes)?;

        let communicator = MmCommunicator::new(communication, private, self.smram_access)
            .with_executor(Box::new(RealMmExecutor::with_command(sw_mmi_trigger, IPL_MMI_COMMAND)));
        match communicator.run_dispatcher() {
            Ok(restarts) => log::info!(target: "mm_ipl", "MM drivers dispatched ({} restarts)", restarts),
            Err(err) => log::warn!(target: "mm_ipl", "MM driver dispatch failed: {:?}", err),
        }

        Ok(private)
    }

    /// Loads the MM core into SMRAM and runs its entry point.
    ///
    /// Publishes the shared [`MmCorePrivate`] in `hobs` before anything else so the core can find it.
    pub fn load_core(
        &mut self,
        hobs: &mut HobList,
        volumes: &[FirmwareVolumeImage<'_>],
    ) -> Result<&'static MmCorePrivate, EfiError> {
        let private = MmCorePrivate::publish(hobs);
        log::debug!(target: "mm_ipl", "MM core private data at {:p}", private);

        let mut table = SmramRangeTable::from_hobs(hobs)?;
        table.open(self.smram_access)?;

        let Some(index) = table.select_ipl_range() else {
            log::error!(target: "mm_ipl", "SMM IPL could not find a large enough SMRAM region to load SMM Core");
            self.close(&mut table);
            return Err(EfiError::Unsupported);
        };

        let range = table.ranges()[index];
        log::info!(target: "mm_ipl", "SMM IPL found SMRAM window {:#x} - {:#x}", range.cpu_start, range.cpu_end() - 1);

        if let Some((base, length)) = table.cache_range(index) {
            if let Err(err) = self.cache.set_attributes(base, length, CacheType::WriteBack) {
                log::warn!(target: "mm_ipl", "Could not make SMRAM {:#x}+{:#x} write-back: {:?}", base, length, err);
            }
        }

        if let Err(err) = self.execute_core(&mut table, index, hobs, volumes, private) {
            log::error!(target: "mm_ipl", "SMM IPL could not load and execute SMM Core from SMRAM: {:?}", err);
            self.close(&mut table);
            return Err(EfiError::Unsupported);
        }

        Ok(private)
    }

    fn close(&self, table: &mut SmramRangeTable) {
        if let Err(err) = table.close(self.smram_access) {
            log::warn!(target: "mm_ipl", "Could not close SMRAM: {:?}", err);
        }
    }

    fn execute_core(
        &self,
        table: &mut SmramRangeTable,
        index: usize,
        hobs: &HobList,
        volumes: &[FirmwareVolumeImage<'_>],
        private: &'static MmCorePrivate,
    ) -> Result<(), EfiError> {
        let (fv_base, image) = find_core_image(volumes)?;
        let pe_info = PeInfo::parse(image)?;
        let range = table.ranges()[index];

        let (destination, carve) = match self.fixed_address(&pe_info, &range) {
            Some(address) => (address, None),
            None => {
                let carve =
                    table.carve(index, pe_info.size_of_image as u64, pe_info.section_alignment as u64)?;
                table.commit(carve)?;
                (carve.destination, Some(carve))
            }
        };

        publish_ranges(table, private);
        private.set_standalone_bfv_address(fv_base);

        let result = self.place_and_start(&pe_info, image, destination, hobs, private);
        if result.is_err() {
            if let Some(carve) = carve {
                table.restore(carve);
            }
            private.publish_mmram_ranges(0, 0);
        }
        result
    }

    /// The build-time assigned load address, when enabled and inside the SMRAM code region.
    fn fixed_address(&self, pe_info: &PeInfo, range: &SmramDescriptor) -> Option<u64> {
        if !self.config.load_module_at_fixed_address {
            return None;
        }
        let code_size = (self.config.fixed_code_page_count as u64) << UEFI_PAGE_SHIFT;
        let address = pe_info.fixed_load_offset().map(|offset| range.cpu_start.wrapping_add(offset));
        match address {
            Some(address) if address >= range.cpu_start && address < range.cpu_start + code_size => {
                log::info!(target: "mm_ipl", "Loading MM core at fixed address {:#x}", address);
                Some(address)
            }
            _ => {
                log::info!(target: "mm_ipl", "Loading MM core at fixed address failed, allocating from SMRAM instead");
                None
            }
        }
    }

    fn place_and_start(
        &self,
        pe_info: &PeInfo,
        image: &[u8],
        destination: u64,
        hobs: &HobList,
        private: &MmCorePrivate,
    ) -> Result<(), EfiError> {
        let alignment = (pe_info.section_alignment as u64).max(1);
        let image_address = align_up(destination, alignment).map_err(|_| EfiError::LoadError)?;
        log::info!(target: "mm_ipl", "SMM IPL loading SMM Core at SMRAM address {:#x}", image_address);

        let mut loaded = vec![0u8; pe_info.size_of_image as usize];
        pecoff::load_image(pe_info, image, &mut loaded)?;
        pecoff::relocate_image(pe_info, image_address, &mut loaded)?;

        // SAFETY: the destination lies in an open SMRAM range sized for the image.
        unsafe { self.launcher.write_image(image_address, &loaded)? };
        self.launcher.invalidate_instruction_cache(image_address, loaded.len() as u64);

        let entry_point = image_address + pe_info.entry_point_offset as u64;
        log::info!(target: "mm_ipl", "SMM IPL calling SMM Core at SMRAM address {:#x}", entry_point);
        private.record_core_image(CoreImage { base: image_address, size: loaded.len() as u64, entry_point });
        log::debug!(target: "mm_ipl", "SmmCoreImageBase - {:#018x}", image_address);
        log::debug!(target: "mm_ipl", "SmmCoreImageSize - {:#018x}", loaded.len());
        log::debug!(target: "mm_ipl", "SmmCoreEntryPoint - {:#018x}", entry_point);

        let hob_list: &'static [u8] = Box::leak(hobs.to_bytes().into_boxed_slice());
        // SAFETY: the image was just written and relocated for `image_address`.
        let status = unsafe { self.launcher.start_core(entry_point, hob_list) };
        EfiError::status_to_result(status)
    }
}

/// Hands the current range table to the MM core.
fn publish_ranges(table: &SmramRangeTable, private: &MmCorePrivate) {
    let block: &'static [u8] = Box::leak(table.descriptor_block().into_boxed_slice());
    // The encoded block starts with the padded descriptor count.
    private.publish_mmram_ranges(block.as_ptr() as u64 + 8, table.len() as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pecoff::test_image;
    use crate::service::smram_access::MockSmramAccess;

    use fsp_memory::mtrr::MockCacheController;
    use fsp_pi::smram::{encode_descriptor_block, RegionState};
    use fsp_sdk::guids;
    use mockall::predicate::eq;
    use scroll::{Pread, LE};
    use std::sync::{Arc, Mutex};

    const SMRAM_BASE: u64 = 0x7F00_0000;
    const SMRAM_SIZE: u64 = 0x100_0000;

    fn descriptor(start: u64, size: u64, state: RegionState) -> SmramDescriptor {
        SmramDescriptor { physical_start: start, cpu_start: start, physical_size: size, region_state: state }
    }

    fn hobs_with(ranges: &[SmramDescriptor]) -> HobList {
        let mut hobs = HobList::new();
        hobs.build_guid_data(guids::SMM_SMRAM_MEMORY, &encode_descriptor_block(ranges));
        hobs
    }

    /// A volume holding one standalone MM core file with `pe` as its PE32 section.
    fn core_volume(pe: &[u8]) -> Vec<u8> {
        let length = 0x1000 + pe.len();
        let mut fv = vec![0u8; 0x38];
        fv[0x10..0x20].copy_from_slice(guids::EFI_FIRMWARE_FILE_SYSTEM2.as_bytes());
        fv[0x20..0x28].copy_from_slice(&(length as u64).to_le_bytes());
        fv[0x28..0x2C].copy_from_slice(b"_FVH");
        fv[0x30..0x32].copy_from_slice(&0x38u16.to_le_bytes());
        fv[0x37] = 2;

        let section_size = (4 + pe.len()) as u32;
        let file_size = 0x18 + section_size;
        let mut header = vec![0u8; 0x18];
        header[0] = 1;
        header[0x12] = file_type::MM_CORE_STANDALONE;
        header[0x14..0x17].copy_from_slice(&file_size.to_le_bytes()[..3]);
        fv.extend_from_slice(&header);
        fv.extend_from_slice(&section_size.to_le_bytes()[..3]);
        fv.push(section_type::PE32);
        fv.extend_from_slice(pe);
        fv.resize(length, 0xFF);
        fv
    }

    fn leaked_volume(pe: &[u8]) -> &'static [u8] {
        Box::leak(core_volume(pe).into_boxed_slice())
    }

    fn open_access() -> MockSmramAccess {
        let mut access = MockSmramAccess::new();
        access.expect_lock_state().return_const(false);
        access.expect_open().times(1).returning(|| Ok(()));
        access
    }

    fn cache_expecting(base: u64, length: u64) -> MockCacheController {
        let mut cache = MockCacheController::new();
        cache
            .expect_set_attributes()
            .with(eq(base), eq(length), eq(CacheType::WriteBack))
            .times(1)
            .returning(|_, _, _| Ok(()));
        cache
    }

    /// A launcher that keeps the written image and returns `status` from the core entry point.
    fn recording_launcher(status: efi::Status, written: Arc<Mutex<Vec<(u64, Vec<u8>)>>>) -> MockMmCoreLauncher {
        let mut launcher = MockMmCoreLauncher::new();
        launcher.expect_write_image().returning(move |destination, image| {
            written.lock().unwrap().push((destination, image.to_vec()));
            Ok(())
        });
        launcher.expect_invalidate_instruction_cache().returning(|_, _| ());
        launcher.expect_start_core().returning(move |_, _| status);
        launcher
    }

    #[test]
    fn test_core_image_found_in_second_volume() {
        let pe = test_image::build(0);
        let garbage = [0u8; 0x40];
        let volumes = [
            FirmwareVolumeImage { base: 0x1000, bytes: &garbage },
            FirmwareVolumeImage { base: 0xFF00_0000, bytes: leaked_volume(&pe) },
        ];
        let (base, image) = find_core_image(&volumes).unwrap();
        assert_eq!(base, 0xFF00_0000);
        assert_eq!(image, &pe[..]);
    }

    #[test]
    fn test_core_image_missing() {
        assert_eq!(find_core_image(&[]).err(), Some(EfiError::NotFound));
    }

    #[test]
    fn test_load_core_carves_relocates_and_starts() {
        let mut hobs = hobs_with(&[descriptor(SMRAM_BASE, SMRAM_SIZE, RegionState::CLOSED)]);
        let pe = test_image::build(0);
        let volumes = [FirmwareVolumeImage { base: 0xFF80_0000, bytes: leaked_volume(&pe) }];

        let access = open_access();
        let mut cache = cache_expecting(SMRAM_BASE, SMRAM_SIZE);
        let written = Arc::new(Mutex::new(Vec::new()));
        let expected_base = SMRAM_BASE + SMRAM_SIZE - 0x5000;
        let mut launcher = MockMmCoreLauncher::new();
        let written_clone = written.clone();
        launcher.expect_write_image().times(1).returning(move |destination, image| {
            written_clone.lock().unwrap().push((destination, image.to_vec()));
            Ok(())
        });
        launcher.expect_invalidate_instruction_cache().with(eq(expected_base), eq(0x4000)).times(1).returning(|_, _| ());
        launcher
            .expect_start_core()
            .withf(move |entry, hob_list| *entry == expected_base + 0x1000 && HobList::parse(hob_list).is_ok())
            .times(1)
            .returning(|_, _| efi::Status::SUCCESS);

        let private = MmIpl::new(MmIplConfiguration::default(), &access, &mut cache, &launcher)
            .load_core(&mut hobs, &volumes)
            .unwrap();

        let written = written.lock().unwrap();
        assert_eq!(written.len(), 1);
        let (destination, image) = &written[0];
        assert_eq!(*destination, expected_base);
        let pointer: u64 = image.pread_with(test_image::POINTER_RVA, LE).unwrap();
        assert_eq!(pointer, expected_base + 0x1000);
        assert_eq!(image[test_image::ENTRY_POINT as usize], 0xC3);

        assert_eq!(
            private.core_image(),
            CoreImage { base: expected_base, size: 0x4000, entry_point: expected_base + 0x1000 }
        );
        assert_eq!(private.standalone_bfv_address(), 0xFF80_0000);
        assert_eq!(private.mmram_ranges().1, 2);
        assert!(core::ptr::eq(unsafe { MmCorePrivate::from_hobs(&hobs) }.unwrap(), private));
    }

    #[test]
    fn test_published_ranges_mark_core_allocated() {
        let mut hobs = hobs_with(&[descriptor(SMRAM_BASE, SMRAM_SIZE, RegionState::CLOSED)]);
        let pe = test_image::build(0);
        let volumes = [FirmwareVolumeImage { base: 0, bytes: leaked_volume(&pe) }];

        let access = open_access();
        let mut cache = cache_expecting(SMRAM_BASE, SMRAM_SIZE);
        let launcher = recording_launcher(efi::Status::SUCCESS, Arc::new(Mutex::new(Vec::new())));

        let private = MmIpl::new(MmIplConfiguration::default(), &access, &mut cache, &launcher)
            .load_core(&mut hobs, &volumes)
            .unwrap();

        let (address, count) = private.mmram_ranges();
        let bytes = unsafe { core::slice::from_raw_parts(address as *const u8, count as usize * SmramDescriptor::SIZE) };
        let mut block = (count as u32).to_le_bytes().to_vec();
        block.extend_from_slice(&[0; 4]);
        block.extend_from_slice(bytes);
        let ranges = fsp_pi::smram::decode_descriptor_block(&block).unwrap();

        assert_eq!(ranges[0].physical_size, SMRAM_SIZE - 0x5000);
        assert!(ranges[0].region_state.contains(RegionState::OPEN));
        assert_eq!(ranges[1].cpu_start, SMRAM_BASE + SMRAM_SIZE - 0x5000);
        assert_eq!(ranges[1].physical_size, 0x5000);
        assert!(ranges[1].region_state.contains(RegionState::ALLOCATED));
    }

    #[test]
    fn test_largest_range_selected_and_cache_range_merged() {
        let mut hobs = hobs_with(&[
            descriptor(0x7F00_0000, 0x10_0000, RegionState::CLOSED),
            descriptor(0x7F10_0000, 0x40_0000, RegionState::CLOSED),
            descriptor(0x9000_0000, 0x20_0000, RegionState::CLOSED | RegionState::ALLOCATED),
        ]);
        let pe = test_image::build(0);
        let volumes = [FirmwareVolumeImage { base: 0, bytes: leaked_volume(&pe) }];

        let access = open_access();
        let mut cache = cache_expecting(0x7F00_0000, 0x50_0000);
        let written = Arc::new(Mutex::new(Vec::new()));
        let launcher = recording_launcher(efi::Status::SUCCESS, written.clone());

        MmIpl::new(MmIplConfiguration::default(), &access, &mut cache, &launcher)
            .load_core(&mut hobs, &volumes)
            .unwrap();

        assert_eq!(written.lock().unwrap()[0].0, 0x7F10_0000 + 0x40_0000 - 0x5000);
    }

    #[test]
    fn test_fixed_address_inside_code_region() {
        let mut hobs = hobs_with(&[descriptor(SMRAM_BASE, SMRAM_SIZE, RegionState::CLOSED)]);
        let pe = test_image::build(0x2_0000);
        let volumes = [FirmwareVolumeImage { base: 0, bytes: leaked_volume(&pe) }];

        let access = open_access();
        let mut cache = cache_expecting(SMRAM_BASE, SMRAM_SIZE);
        let written = Arc::new(Mutex::new(Vec::new()));
        let launcher = recording_launcher(efi::Status::SUCCESS, written.clone());
        let config = MmIplConfiguration { load_module_at_fixed_address: true, fixed_code_page_count: 0x40 };

        let private = MmIpl::new(config, &access, &mut cache, &launcher).load_core(&mut hobs, &volumes).unwrap();

        assert_eq!(written.lock().unwrap()[0].0, SMRAM_BASE + 0x2_0000);
        // Nothing was carved, so the range table is unchanged.
        assert_eq!(private.mmram_ranges().1, 1);
    }

    #[test]
    fn test_fixed_address_outside_code_region_falls_back_to_carve() {
        let mut hobs = hobs_with(&[descriptor(SMRAM_BASE, SMRAM_SIZE, RegionState::CLOSED)]);
        let pe = test_image::build(0x8_0000);
        let volumes = [FirmwareVolumeImage { base: 0, bytes: leaked_volume(&pe) }];

        let access = open_access();
        let mut cache = cache_expecting(SMRAM_BASE, SMRAM_SIZE);
        let written = Arc::new(Mutex::new(Vec::new()));
        let launcher = recording_launcher(efi::Status::SUCCESS, written.clone());
        let config = MmIplConfiguration { load_module_at_fixed_address: true, fixed_code_page_count: 0x40 };

        MmIpl::new(config, &access, &mut cache, &launcher).load_core(&mut hobs, &volumes).unwrap();

        assert_eq!(written.lock().unwrap()[0].0, SMRAM_BASE + SMRAM_SIZE - 0x5000);
    }

    #[test]
    fn test_no_usable_range_closes_smram() {
        let mut hobs = hobs_with(&[
            descriptor(0x8_0000, 0x10_0000, RegionState::CLOSED),
            descriptor(0x7F00_0000, 0x1_0000, RegionState::CLOSED),
            descriptor(0x8000_0000, 0x100_0000, RegionState::CLOSED | RegionState::NEEDS_TESTING),
        ]);
        let mut access = open_access();
        access.expect_close().times(1).returning(|| Ok(()));
        let mut cache = MockCacheController::new();
        cache.expect_set_attributes().never();
        let mut launcher = MockMmCoreLauncher::new();
        launcher.expect_start_core().never();

        let result = MmIpl::new(MmIplConfiguration::default(), &access, &mut cache, &launcher).load_core(&mut hobs, &[]);
        assert_eq!(result.err(), Some(EfiError::Unsupported));
    }

    #[test]
    fn test_missing_core_closes_smram() {
        let mut hobs = hobs_with(&[descriptor(SMRAM_BASE, SMRAM_SIZE, RegionState::CLOSED)]);
        let mut access = open_access();
        access.expect_close().times(1).returning(|| Ok(()));
        let mut cache = cache_expecting(SMRAM_BASE, SMRAM_SIZE);
        let mut launcher = MockMmCoreLauncher::new();
        launcher.expect_write_image().never();

        let result = MmIpl::new(MmIplConfiguration::default(), &access, &mut cache, &launcher).load_core(&mut hobs, &[]);
        assert_eq!(result.err(), Some(EfiError::Unsupported));
    }

    #[test]
    fn test_failing_core_entry_restores_range() {
        let mut hobs = hobs_with(&[descriptor(SMRAM_BASE, SMRAM_SIZE, RegionState::CLOSED)]);
        let pe = test_image::build(0);
        let volumes = [FirmwareVolumeImage { base: 0, bytes: leaked_volume(&pe) }];

        let mut access = open_access();
        access.expect_close().times(1).returning(|| Ok(()));
        let mut cache = cache_expecting(SMRAM_BASE, SMRAM_SIZE);
        let launcher = recording_launcher(efi::Status::LOAD_ERROR, Arc::new(Mutex::new(Vec::new())));

        let result = MmIpl::new(MmIplConfiguration::default(), &access, &mut cache, &launcher).load_core(&mut hobs, &volumes);
        assert_eq!(result.err(), Some(EfiError::Unsupported));

        let private = unsafe { MmCorePrivate::from_hobs(&hobs) }.unwrap();
        assert_eq!(private.mmram_ranges(), (0, 0));
    }

    #[test]
    fn test_cache_failure_does_not_stop_load() {
        let mut hobs = hobs_with(&[descriptor(SMRAM_BASE, SMRAM_SIZE, RegionState::CLOSED)]);
        let pe = test_image::build(0);
        let volumes = [FirmwareVolumeImage { base: 0, bytes: leaked_volume(&pe) }];

        let access = open_access();
        let mut cache = MockCacheController::new();
        cache.expect_set_attributes().times(1).returning(|_, _, _| Err(EfiError::OutOfResources));
        let launcher = recording_launcher(efi::Status::SUCCESS, Arc::new(Mutex::new(Vec::new())));

        assert!(MmIpl::new(MmIplConfiguration::default(), &access, &mut cache, &launcher)
            .load_core(&mut hobs, &volumes)
            .is_ok());
    }

    #[test]
    fn test_missing_smram_hob() {
        let mut hobs = HobList::new();
        let access = MockSmramAccess::new();
        let mut cache = MockCacheController::new();
        let launcher = MockMmCoreLauncher::new();

        let result = MmIpl::new(MmIplConfiguration::default(), &access, &mut cache, &launcher).load_core(&mut hobs, &[]);
        assert_eq!(result.err(), Some(EfiError::NotFound));
    }
}
