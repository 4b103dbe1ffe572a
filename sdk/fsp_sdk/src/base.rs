//! Base Definitions
//!
//! Sizes, page math, and alignment helpers used throughout the boot-stage crates.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// EFI memory allocation functions work in units of EFI_PAGEs that are 4KB.
pub const UEFI_PAGE_SIZE: usize = 0x1000;

/// The mask to apply to an address to get the page offset.
pub const UEFI_PAGE_MASK: usize = UEFI_PAGE_SIZE - 1;

/// The shift to apply to an address to get the page frame number.
pub const UEFI_PAGE_SHIFT: usize = 12;

/// 4KB, 4096 bytes, 0x1000, 2^12
pub const SIZE_4KB: usize = 0x1000;

/// 64KB, 65536 bytes, 0x10000, 2^16
pub const SIZE_64KB: usize = 0x10000;

/// 128KB, 0x20000, 2^17
pub const SIZE_128KB: usize = 0x20000;

/// 256KB, 0x40000, 2^18
pub const SIZE_256KB: usize = 0x40000;

/// 384KB, 0x60000
pub const SIZE_384KB: usize = 0x60000;

/// 640KB, 0xA0000
pub const SIZE_640KB: usize = 0xA0000;

/// 1MB, 0x100000, 2^20
pub const SIZE_1MB: usize = 0x100000;

/// 16MB, 0x1000000, 2^24
pub const SIZE_16MB: usize = 0x1000000;

/// 256MB, 0x10000000, 2^28
pub const SIZE_256MB: usize = 0x10000000;

/// 4GB, 0x100000000, 2^32
pub const SIZE_4GB: usize = 0x100000000;

/// Highest bit of a native status word. Set on status values that represent an error.
pub const MAX_BIT: usize = 1 << (usize::BITS - 1);

/// Converts a byte count to the number of UEFI pages needed to hold it.
#[inline]
pub const fn size_to_pages(size: usize) -> usize {
    (size >> UEFI_PAGE_SHIFT) + if size & UEFI_PAGE_MASK != 0 { 1 } else { 0 }
}

/// Converts a number of UEFI pages to a byte count.
#[inline]
pub const fn pages_to_size(pages: usize) -> usize {
    pages << UEFI_PAGE_SHIFT
}

/// Aligns the given address down to the nearest boundary specified by align.
///
/// ## Errors
///
/// Returns an error if `align` is not a power of two.
///
/// ## Example
///
/// ```rust
/// use fsp_sdk::base::align_down;
///
/// assert_eq!(align_down(0x1FFF, 0x1000), Ok(0x1000));
/// ```
#[inline]
pub const fn align_down(addr: u64, align: u64) -> Result<u64, &'static str> {
    if !align.is_power_of_two() {
        return Err("`align` must be a power of two");
    }
    Ok(addr & !(align - 1))
}

/// Aligns the given address up to the nearest boundary specified by align.
///
/// ## Errors
///
/// Returns an error if `align` is not a power of two or the aligned value overflows.
///
/// ## Example
///
/// ```rust
/// use fsp_sdk::base::align_up;
///
/// assert_eq!(align_up(0x1001, 0x1000), Ok(0x2000));
/// ```
#[inline]
pub const fn align_up(addr: u64, align: u64) -> Result<u64, &'static str> {
    if !align.is_power_of_two() {
        return Err("`align` must be a power of two");
    }
    let align_mask = align - 1;
    if addr & align_mask == 0 {
        Ok(addr)
    } else {
        match (addr | align_mask).checked_add(1) {
            Some(aligned) => Ok(aligned),
            None => Err("attempt to add with overflow"),
        }
    }
}

/// Returns the smallest power of two greater than or equal to `value`, or `None` on overflow.
#[inline]
pub const fn next_power_of_two(value: u64) -> Option<u64> {
    value.checked_next_power_of_two()
}

/// Stops forward progress after a fatal boot failure.
///
/// On the firmware target the processor is parked in a `hlt` loop with interrupts disabled. Host builds panic with
/// the failure message.
pub fn dead_loop(reason: core::fmt::Arguments) -> ! {
    cfg_if::cfg_if! {
        if #[cfg(all(target_os = "uefi", target_arch = "x86_64"))] {
            let _ = reason;
            x86_64::instructions::interrupts::disable();
            loop {
                x86_64::instructions::hlt();
            }
        } else {
            panic!("{}", reason);
        }
    }
}
