//! Firmware volume and reserved resource reporting.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_pi::{
    fw_fs::{FVH_SIGNATURE, FVH_SIGNATURE_OFFSET},
    hob::{HobList, ResourceDescriptor, EFI_RESOURCE_SYSTEM_MEMORY},
};
use fsp_sdk::{base::SIZE_4GB, error::BootError, guids};
use r_efi::efi;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Receives each firmware volume found in the FSP image.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait FvRegistrar {
    fn register_fv(&mut self, base_address: u64, length: u64);
}

impl FvRegistrar for HobList {
    fn register_fv(&mut self, base_address: u64, length: u64) {
        self.build_fv(base_address, length);
    }
}

/// Walks the firmware volumes laid out back to back from the start of `image`, which is mapped at `image_base`.
///
/// The walk stops at the first block without the `_FVH` signature, at a zero or overrunning length, or once the
/// cursor reaches the last byte of the image. Returns the number of volumes registered.
pub fn report_firmware_volumes(image_base: u64, image: &[u8], registrar: &mut dyn FvRegistrar) -> usize {
    let end = image.len().saturating_sub(1);
    let mut offset = 0usize;
    let mut count = 0;
    while offset < end {
        let signature = image
            .get(offset + FVH_SIGNATURE_OFFSET..offset + FVH_SIGNATURE_OFFSET + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        if signature != Some(FVH_SIGNATURE) {
            break;
        }
        let fits = |length: u64| (offset as u64).checked_add(length).is_some_and(|end| end <= image.len() as u64);
        let length = match read_u64(image, offset + 0x20) {
            Some(length) if length != 0 && fits(length) => length,
            other => {
                log::warn!(target: "fsp_memory", "FV at {:#x} has bad length {:x?}", image_base + offset as u64, other);
                break;
            }
        };
        log::info!(target: "fsp_memory", "install FV {:#x} + {:#x}", image_base + offset as u64, length);
        registrar.register_fv(image_base + offset as u64, length);
        offset += length as usize;
        count += 1;
    }
    count
}

/// Returns the first resource descriptor owned by `owner`.
pub fn find_resource_by_owner<'a>(hobs: &'a HobList, owner: &efi::Guid) -> Option<&'a ResourceDescriptor> {
    hobs.find_resource_by_owner(owner)
}

/// Top of low memory: the end of the FSP reserved region plus the boot loader reserved region, if any.
pub fn top_of_low_memory(hobs: &HobList) -> Result<u64, BootError> {
    let reserved =
        find_resource_by_owner(hobs, &guids::FSP_RESERVED_MEMORY_RESOURCE_HOB).ok_or(BootError::ResourceNotFound)?;
    let mut tolum = reserved.end();
    if let Some(boot_loader) = find_resource_by_owner(hobs, &guids::FSP_BOOT_LOADER_TOLUM_HOB) {
        tolum += boot_loader.resource_length;
    }
    Ok(tolum)
}

/// Sums system memory below and above 4 GiB.
pub fn system_memory_size(hobs: &HobList) -> (u64, u64) {
    hobs.resource_descriptors().filter(|rd| rd.resource_type == EFI_RESOURCE_SYSTEM_MEMORY).fold(
        (0, 0),
        |(low, high), rd| {
            if rd.physical_start >= SIZE_4GB as u64 {
                (low, high + rd.resource_length)
            } else {
                (low + rd.resource_length, high)
            }
        },
    )
}

fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    bytes.get(offset..offset + 8).and_then(|b| b.try_into().ok()).map(u64::from_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsp_pi::hob::{EFI_RESOURCE_MEMORY_RESERVED, MEMORY_TESTED_ATTRIBUTES};
    use mockall::{predicate::eq, Sequence};

    fn fv_header(length: u64) -> Vec<u8> {
        let mut fv = vec![0u8; length as usize];
        fv[0x20..0x28].copy_from_slice(&length.to_le_bytes());
        fv[0x28..0x2C].copy_from_slice(b"_FVH");
        fv
    }

    #[test]
    fn test_three_volume_image() {
        let base = 0xFFE0_0000;
        let mut image = fv_header(0x1000);
        image.extend(fv_header(0x2000));
        image.extend(fv_header(0x800));

        let mut registrar = MockFvRegistrar::new();
        let mut seq = Sequence::new();
        for (offset, length) in [(0, 0x1000), (0x1000, 0x2000), (0x3000, 0x800)] {
            registrar
                .expect_register_fv()
                .with(eq(base + offset), eq(length))
                .times(1)
                .in_sequence(&mut seq)
                .return_const(());
        }
        assert_eq!(report_firmware_volumes(base, &image, &mut registrar), 3);
    }

    #[test]
    fn test_walk_stops_at_missing_signature() {
        let mut image = fv_header(0x1000);
        image.extend(vec![0xFFu8; 0x1000]);
        let mut hobs = HobList::new();
        assert_eq!(report_firmware_volumes(0x1000_0000, &image, &mut hobs), 1);
        assert_eq!(hobs.len(), 1);
    }

    #[test]
    fn test_walk_stops_at_overrun_or_zero_length() {
        let mut image = fv_header(0x1000);
        image[0x20..0x28].copy_from_slice(&0x2000u64.to_le_bytes());
        let mut registrar = MockFvRegistrar::new();
        registrar.expect_register_fv().never();
        assert_eq!(report_firmware_volumes(0, &image, &mut registrar), 0);

        image[0x20..0x28].copy_from_slice(&0u64.to_le_bytes());
        assert_eq!(report_firmware_volumes(0, &image, &mut registrar), 0);

        // A length that wraps the address space ends the walk after the good volume.
        let mut image = fv_header(0x1000);
        let mut corrupt = fv_header(0x100);
        corrupt[0x20..0x28].copy_from_slice(&u64::MAX.to_le_bytes());
        image.extend(corrupt);
        let mut registrar = MockFvRegistrar::new();
        registrar.expect_register_fv().with(eq(0), eq(0x1000)).times(1).return_const(());
        assert_eq!(report_firmware_volumes(0, &image, &mut registrar), 1);
    }

    #[test]
    fn test_walk_does_not_read_past_truncated_tail() {
        let mut image = fv_header(0x100);
        image.extend([0u8; 0x10]);
        let mut hobs = HobList::new();
        assert_eq!(report_firmware_volumes(0, &image, &mut hobs), 1);
    }

    fn reserved(hobs: &mut HobList, start: u64, length: u64, owner: efi::Guid) {
        hobs.build_resource_descriptor_with_owner(
            EFI_RESOURCE_MEMORY_RESERVED,
            MEMORY_TESTED_ATTRIBUTES,
            start,
            length,
            owner,
        );
    }

    #[test]
    fn test_top_of_low_memory() {
        let mut hobs = HobList::new();
        assert_eq!(top_of_low_memory(&hobs), Err(BootError::ResourceNotFound));

        hobs.build_resource_descriptor(EFI_RESOURCE_SYSTEM_MEMORY, MEMORY_TESTED_ATTRIBUTES, 0x10_0000, 0x7000_0000);
        reserved(&mut hobs, 0x7EC0_0000, 0x40_0000, guids::FSP_RESERVED_MEMORY_RESOURCE_HOB);
        assert_eq!(top_of_low_memory(&hobs), Ok(0x7F00_0000));

        reserved(&mut hobs, 0x7F00_0000, 0x20_0000, guids::FSP_BOOT_LOADER_TOLUM_HOB);
        assert_eq!(top_of_low_memory(&hobs), Ok(0x7F20_0000));
    }

    #[test]
    fn test_system_memory_size() {
        let mut hobs = HobList::new();
        hobs.build_resource_descriptor(EFI_RESOURCE_SYSTEM_MEMORY, MEMORY_TESTED_ATTRIBUTES, 0, 0xA_0000);
        hobs.build_resource_descriptor(EFI_RESOURCE_SYSTEM_MEMORY, MEMORY_TESTED_ATTRIBUTES, 0x10_0000, 0x100_0000);
        hobs.build_resource_descriptor(EFI_RESOURCE_SYSTEM_MEMORY, MEMORY_TESTED_ATTRIBUTES, 0x1_0000_0000, 0x1000);
        reserved(&mut hobs, 0x7EC0_0000, 0x40_0000, guids::FSP_RESERVED_MEMORY_RESOURCE_HOB);
        assert_eq!(system_memory_size(&hobs), (0x10A_0000, 0x1000));
    }
}
