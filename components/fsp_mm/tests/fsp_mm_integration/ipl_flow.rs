//! MM IPL Integration Tests
//!
//! Loads the simulated MM core through the IPL and runs the driver dispatcher over the shared mailbox.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use super::common::*;

use fsp_mm::{
    config::MmIplConfiguration,
    ipl::{FirmwareVolumeImage, MmIpl},
    service::SmramAccess,
};
use fsp_pi::{hob::HobList, smram::RegionState};
use fsp_sdk::{error::EfiError, guids};

#[test]
fn entry_point_starts_core_and_dispatches_drivers() {
    let core = SimulatedMmCore::new();
    let access = FakeSmramAccess::default();
    let mut cache = RecordingCache::default();
    let mut hobs = smram_hobs();
    let volumes = [FirmwareVolumeImage { base: 0xFFC0_0000, bytes: core_volume(&core_image()) }];
    let communication = communication_config(0x1000);

    let private = MmIpl::new(MmIplConfiguration::default(), &access, &mut cache, &core)
        .entry_point(&mut hobs, &volumes, &communication, &core)
        .expect("MM core should load");

    assert!(private.entry_point_registered());
    assert!(core.private().is_some_and(|started| core::ptr::eq(started, private)));
    assert_eq!(core.request_guids(), vec![guids::EVENT_DXE_DISPATCH]);
    assert_eq!(core.triggers.get(), 1);
    assert_eq!(access.closes.get(), 0);
    assert!(access.open_state());

    let destination = SMRAM_BASE + SMRAM_SIZE - CARVE_SIZE;
    let image = private.core_image();
    assert_eq!(image.base, destination);
    assert_eq!(image.entry_point, destination + ENTRY_POINT as u64);
    assert_eq!(*core.entry_points.borrow(), vec![destination + ENTRY_POINT as u64]);
    assert_eq!(private.standalone_bfv_address(), 0xFFC0_0000);

    let written = core.written.borrow();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].0, destination);
    let pointer = u64::from_le_bytes(written[0].1[POINTER_RVA..POINTER_RVA + 8].try_into().unwrap());
    assert_eq!(pointer, destination + ENTRY_POINT as u64);

    assert_eq!(cache.ranges.len(), 1);
    assert_eq!(cache.ranges[0].0, SMRAM_BASE);
}

#[test]
fn published_ranges_mark_the_core_allocation() {
    let core = SimulatedMmCore::new();
    let access = FakeSmramAccess::default();
    let mut hobs = smram_hobs();

    let private = load_simulated_core(&mut hobs, &core, &access).unwrap();

    let (address, count) = private.mmram_ranges();
    assert_eq!(count, 2);

    let descriptors = unsafe {
        core::slice::from_raw_parts(address as *const u8, count as usize * fsp_pi::smram::SmramDescriptor::SIZE)
    };
    let allocated = descriptors.chunks(fsp_pi::smram::SmramDescriptor::SIZE).any(|descriptor| {
        let start = u64::from_le_bytes(descriptor[8..16].try_into().unwrap());
        let state = u64::from_le_bytes(descriptor[24..32].try_into().unwrap());
        start == SMRAM_BASE + SMRAM_SIZE - CARVE_SIZE && state & RegionState::ALLOCATED.bits() != 0
    });
    assert!(allocated);
}

#[test]
fn dispatcher_restarts_until_core_reports_success() {
    let core = SimulatedMmCore::with_restarts(2);
    let access = FakeSmramAccess::default();
    let mut cache = RecordingCache::default();
    let mut hobs = smram_hobs();
    let volumes = [FirmwareVolumeImage { base: 0xFFC0_0000, bytes: core_volume(&core_image()) }];
    let communication = communication_config(0x1000);

    MmIpl::new(MmIplConfiguration::default(), &access, &mut cache, &core)
        .entry_point(&mut hobs, &volumes, &communication, &core)
        .unwrap();

    assert_eq!(core.triggers.get(), 3);
    assert_eq!(core.request_guids(), vec![guids::EVENT_DXE_DISPATCH; 3]);
    assert_eq!(access.closes.get(), 2);
    assert_eq!(core.pending_restarts.get(), 0);
}

#[test]
fn missing_core_volume_closes_smram_without_raising_mmis() {
    let core = SimulatedMmCore::new();
    let access = FakeSmramAccess::default();
    let mut cache = RecordingCache::default();
    let mut hobs = smram_hobs();
    let communication = communication_config(0x1000);

    let result = MmIpl::new(MmIplConfiguration::default(), &access, &mut cache, &core).entry_point(
        &mut hobs,
        &[],
        &communication,
        &core,
    );

    assert_eq!(result.err(), Some(EfiError::Unsupported));
    assert_eq!(access.opens.get(), 1);
    assert_eq!(access.closes.get(), 1);
    assert!(!access.open_state());
    assert_eq!(core.triggers.get(), 0);
    assert!(core.written.borrow().is_empty());
}

#[test]
fn missing_smram_description_is_not_found() {
    let core = SimulatedMmCore::new();
    let access = FakeSmramAccess::default();
    let mut hobs = HobList::new();

    assert_eq!(load_simulated_core(&mut hobs, &core, &access).err(), Some(EfiError::NotFound));
    assert_eq!(access.opens.get(), 0);
}

#[test]
fn locked_smram_cannot_be_loaded() {
    let core = SimulatedMmCore::new();
    let access = FakeSmramAccess::default();
    fsp_mm::smram::lock_window(&access).unwrap();
    let mut hobs = smram_hobs();

    assert_eq!(load_simulated_core(&mut hobs, &core, &access).err(), Some(EfiError::AccessDenied));
    assert!(core.entry_points.borrow().is_empty());
}

#[test]
fn firmware_volumes_are_mapped_from_hobs() {
    let volume = core_volume(&core_image());
    let mut hobs = smram_hobs();
    hobs.build_fv(volume.as_ptr() as u64, volume.len() as u64);
    hobs.build_fv(0, 0x1000);

    let volumes = unsafe { FirmwareVolumeImage::from_hobs(&hobs) };
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].base, volume.as_ptr() as u64);
    assert_eq!(volumes[0].bytes.len(), volume.len());

    let (fv_base, image) = fsp_mm::ipl::find_core_image(&volumes).unwrap();
    assert_eq!(fv_base, volume.as_ptr() as u64);
    assert_eq!(image, &core_image()[..]);
}
