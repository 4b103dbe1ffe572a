//! Typed access to the API entry points of an FSP component.
//!
//! An [`FspBinary`] is built once per component from the image bytes and the address the image was found at. The
//! information header is validated at that point, and afterwards callers only see typed methods. Entry addresses are
//! derived from the header's offset table and invoked through an [`FspCallGate`].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;

use fsp_pi::fsp_header::{FspInfoHeader, FSP_INFO_HEADER_SIZE};
use fsp_sdk::error::{BootError, EfiError, Result};
use r_efi::efi;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Offset of the FSP information header from the start of a component image.
pub const FSP_INFO_HEADER_OFFSET: usize = 0x94;

/// Lifecycle phases reported through the notify-phase API.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyPhase {
    AfterPciEnumeration = 0x20,
    ReadyToBoot = 0x40,
    EndOfFirmware = 0xF0,
}

impl NotifyPhase {
    /// The phases in the order the loader reports them.
    pub const SEQUENCE: [NotifyPhase; 3] =
        [NotifyPhase::AfterPciEnumeration, NotifyPhase::ReadyToBoot, NotifyPhase::EndOfFirmware];
}

/// Transfers control to an FSP API entry point.
///
/// ## Safety
///
/// Implementations execute foreign code at arbitrary addresses.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub unsafe trait FspCallGate {
    /// Calls `entry` with two pointer-sized arguments and returns its status.
    ///
    /// ## Safety
    ///
    /// `entry` must be the address of an FSP API and the arguments must satisfy that API's contract.
    unsafe fn call(&mut self, entry: u64, arg0: u64, arg1: u64) -> efi::Status;
}

fsp_sdk::if_x64! {
    /// Calls entry points directly with the `efiapi` convention.
    #[derive(Debug, Default)]
    pub struct DirectCallGate;

    unsafe impl FspCallGate for DirectCallGate {
        unsafe fn call(&mut self, entry: u64, arg0: u64, arg1: u64) -> efi::Status {
            // SAFETY: caller guarantees `entry` is an FSP API with this signature.
            let api: extern "efiapi" fn(u64, u64) -> efi::Status = unsafe { core::mem::transmute(entry as usize) };
            api(arg0, arg1)
        }
    }
}

#[repr(C)]
struct NotifyPhaseParams {
    phase: u32,
}

/// A validated FSP component.
pub struct FspBinary<G: FspCallGate> {
    header: FspInfoHeader,
    image: &'static [u8],
    gate: G,
}

impl<G: FspCallGate> FspBinary<G> {
    /// Validates the component mapped at `base` whose bytes are `image`.
    ///
    /// Fails with [`BootError::ConfigurationInvalid`] if the header is truncated, its signature is wrong, its
    /// declared image base is not `base`, or its config region lies outside the image.
    pub fn new(image: &'static [u8], base: u64, gate: G) -> core::result::Result<Self, BootError> {
        let header_bytes = image
            .get(FSP_INFO_HEADER_OFFSET..FSP_INFO_HEADER_OFFSET + FSP_INFO_HEADER_SIZE)
            .ok_or(BootError::ConfigurationInvalid)?;
        let header = FspInfoHeader::validate(header_bytes, base)?;
        let cfg_end = header.cfg_region_offset as usize + header.cfg_region_size as usize;
        if cfg_end > image.len() {
            log::error!(target: "fsp_boot", "FSP config region {:#x} runs past the image", cfg_end);
            return Err(BootError::ConfigurationInvalid);
        }
        Ok(Self { header, image, gate })
    }

    pub fn header(&self) -> &FspInfoHeader {
        &self.header
    }

    pub fn image(&self) -> &'static [u8] {
        self.image
    }

    /// A copy of the component's default config region.
    pub fn default_upd(&self) -> Vec<u8> {
        let start = self.header.cfg_region_offset as usize;
        self.image[start..start + self.header.cfg_region_size as usize].to_vec()
    }

    fn entry(&self, offset: u32) -> Option<u64> {
        (offset != 0).then(|| self.header.image_base as u64 + offset as u64)
    }

    /// Runs memory-init with `upd` and returns the address of the produced HOB list.
    pub fn memory_init(&mut self, upd: &mut [u8]) -> Result<u64> {
        let Some(entry) = self.entry(self.header.fsp_memory_init_entry_offset) else {
            log::error!(target: "fsp_boot", "FSP-M has no memory-init entry");
            return Err(BootError::ConfigurationInvalid.into());
        };
        let mut hob_list: u64 = 0;
        log::info!(target: "fsp_boot", "Call FspMemoryInit ...");
        // SAFETY: the entry comes from a validated header; both pointers outlive the call.
        let status = unsafe { self.gate.call(entry, upd.as_mut_ptr() as u64, &mut hob_list as *mut u64 as u64) };
        log::info!(target: "fsp_boot", "FspMemoryInit: {:?}", status);
        EfiError::status_to_result(status)?;
        Ok(hob_list)
    }

    pub fn temp_ram_exit(&mut self) -> Result<()> {
        let entry = self.entry(self.header.temp_ram_exit_entry_offset).ok_or(EfiError::Unsupported)?;
        log::info!(target: "fsp_boot", "Call FspTempRamExit ...");
        // SAFETY: the entry comes from a validated header; a null parameter block is allowed.
        let status = unsafe { self.gate.call(entry, 0, 0) };
        log::info!(target: "fsp_boot", "FspTempRamExit: {:?}", status);
        EfiError::status_to_result(status)
    }

    pub fn silicon_init(&mut self, upd: &mut [u8]) -> Result<()> {
        let Some(entry) = self.entry(self.header.fsp_silicon_init_entry_offset) else {
            log::error!(target: "fsp_boot", "FSP-S has no silicon-init entry");
            return Err(BootError::ConfigurationInvalid.into());
        };
        log::info!(target: "fsp_boot", "Call FspSiliconInit ...");
        // SAFETY: the entry comes from a validated header; `upd` outlives the call.
        let status = unsafe { self.gate.call(entry, upd.as_mut_ptr() as u64, 0) };
        log::info!(target: "fsp_boot", "FspSiliconInit: {:?}", status);
        EfiError::status_to_result(status)
    }

    pub fn notify_phase(&mut self, phase: NotifyPhase) -> Result<()> {
        let entry = self.entry(self.header.notify_phase_entry_offset).ok_or(EfiError::Unsupported)?;
        let mut params = NotifyPhaseParams { phase: phase as u32 };
        log::info!(target: "fsp_boot", "Call FspNotifyPhase({:02X}) ...", phase as u32);
        // SAFETY: the entry comes from a validated header; `params` outlives the call.
        let status = unsafe { self.gate.call(entry, &mut params as *mut NotifyPhaseParams as u64, 0) };
        log::info!(target: "fsp_boot", "FspNotifyPhase: {:?}", status);
        EfiError::status_to_result(status)
    }
}
