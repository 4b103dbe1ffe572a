//! Platform Initialization (PI) and FSP binary structures.
//!
//! Everything in this crate describes data that crosses a binary boundary: the hand-off block (HOB) list shared
//! between boot stages, the FSP information header and its UPD configuration blocks, firmware volume metadata, and
//! the SMRAM descriptors published for the MM IPL.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod fsp_header;
pub mod fw_fs;
pub mod hob;
pub mod smram;
pub mod upd;

/// Boot mode values understood by the FSP.
pub mod boot_mode {
    /// Full configuration.
    pub const BOOT_WITH_FULL_CONFIGURATION: u32 = 0x00;
    /// Minimal configuration.
    pub const BOOT_WITH_MINIMAL_CONFIGURATION: u32 = 0x01;
    /// No configuration changes since last boot.
    pub const BOOT_ASSUMING_NO_CONFIGURATION_CHANGES: u32 = 0x02;
    /// S3 resume.
    pub const BOOT_ON_S3_RESUME: u32 = 0x11;
    /// Flash update.
    pub const BOOT_ON_FLASH_UPDATE: u32 = 0x12;
}
