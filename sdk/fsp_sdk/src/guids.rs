//! Well-known GUIDs used across the boot stages.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use r_efi::efi;

/// The all-zero GUID.
pub const ZERO: efi::Guid = efi::Guid::from_fields(0, 0, 0, 0, 0, &[0, 0, 0, 0, 0, 0]);

/// Owner of the resource descriptor describing memory reserved for the FSP.
pub const FSP_RESERVED_MEMORY_RESOURCE_HOB: efi::Guid =
    efi::Guid::from_fields(0x69a79759, 0x1373, 0x4367, 0xa6, 0xc4, &[0xc7, 0xf5, 0x9e, 0xfd, 0x98, 0x6e]);

/// Owner of the resource descriptor describing memory reserved for the boot loader below top of low memory.
pub const FSP_BOOT_LOADER_TOLUM_HOB: efi::Guid =
    efi::Guid::from_fields(0x73ff4f56, 0xaa8e, 0x4451, 0xb3, 0x16, &[0x36, 0x35, 0x36, 0x67, 0xad, 0x44]);

/// Owner of the resource descriptor describing the TSEG (SMRAM) region.
pub const FSP_RESERVED_MEMORY_RESOURCE_HOB_TSEG: efi::Guid =
    efi::Guid::from_fields(0xd038747c, 0xd00c, 0x4980, 0xb3, 0x19, &[0x49, 0x01, 0x99, 0xa4, 0x7d, 0x55]);

/// GUID HOB carrying the SMRAM descriptor block.
pub const SMM_SMRAM_MEMORY: efi::Guid =
    efi::Guid::from_fields(0x6dadf1d1, 0xd4cc, 0x4910, 0xbb, 0x6e, &[0x82, 0xb1, 0xfd, 0x80, 0xff, 0x3d]);

/// GUID HOB pointing at the MM core private data shared between the IPL and the MM core.
pub const MM_CORE_DATA_HOB: efi::Guid =
    efi::Guid::from_fields(0xa160bf99, 0x2aa4, 0x4d7d, 0x99, 0x93, &[0x89, 0x9c, 0xb1, 0x2d, 0xf3, 0x76]);

/// Event group signaled to run the MM driver dispatcher.
pub const EVENT_DXE_DISPATCH: efi::Guid =
    efi::Guid::from_fields(0x7081e22f, 0xcac6, 0x4053, 0x94, 0x68, &[0x67, 0x57, 0x82, 0xcf, 0x88, 0xe5]);

/// Protocol installed when DXE is ready for MM to be locked.
pub const DXE_SMM_READY_TO_LOCK_PROTOCOL: efi::Guid =
    efi::Guid::from_fields(0x60ff8964, 0xe906, 0x41d0, 0xaf, 0xed, &[0xf2, 0x41, 0xe9, 0x74, 0xe0, 0x8e]);

/// End of DXE event group.
pub const END_OF_DXE_EVENT_GROUP: efi::Guid =
    efi::Guid::from_fields(0x02ce967a, 0xdd7e, 0x4ffc, 0x9e, 0xe7, &[0x81, 0x0c, 0xf0, 0x47, 0x08, 0x80]);

/// Ready to boot event group.
pub const EVENT_READY_TO_BOOT: efi::Guid =
    efi::Guid::from_fields(0x7ce88fb3, 0x4bd7, 0x4679, 0x87, 0xa8, &[0xa8, 0xd8, 0xde, 0xe5, 0x0d, 0x2b]);

/// Legacy boot event group.
pub const EVENT_LEGACY_BOOT: efi::Guid =
    efi::Guid::from_fields(0x2a571201, 0x4966, 0x47f6, 0x8b, 0x86, &[0xf3, 0x1e, 0x41, 0xf3, 0x2f, 0x10]);

/// Virtual address change event group.
pub const EVENT_VIRTUAL_ADDRESS_CHANGE: efi::Guid =
    efi::Guid::from_fields(0x13fa7698, 0xc831, 0x49c7, 0x87, 0xea, &[0x8f, 0x43, 0xfc, 0xc2, 0x51, 0x96]);

/// Message sent to MM carrying the address of the UEFI system table.
pub const MM_UEFI_INFO: efi::Guid =
    efi::Guid::from_fields(0xa37721e4, 0x8c0b, 0x4bca, 0xb5, 0xe8, &[0xe9, 0x02, 0xa0, 0x25, 0x51, 0x4e]);

/// Message sent to MM asking it to dispatch drivers from a firmware volume.
pub const MM_FV_DISPATCH: efi::Guid =
    efi::Guid::from_fields(0xb65694cc, 0x09e3, 0x4c3b, 0xb5, 0xcd, &[0x05, 0xf4, 0x4d, 0x3c, 0xdb, 0xff]);

/// Firmware File System 2 GUID.
pub const EFI_FIRMWARE_FILE_SYSTEM2: efi::Guid =
    efi::Guid::from_fields(0x8c8ce578, 0x8a3d, 0x4f1c, 0x99, 0x35, &[0x89, 0x61, 0x85, 0xc3, 0x2d, 0xd3]);

/// Firmware File System 3 GUID.
pub const EFI_FIRMWARE_FILE_SYSTEM3: efi::Guid =
    efi::Guid::from_fields(0x5473c07a, 0x3dcb, 0x4dca, 0xbd, 0x6f, &[0x1e, 0x96, 0x89, 0xe7, 0x34, 0x9a]);
