//! Cache policy applied once temporary RAM is torn down.
//!
//! The policy covers all of low memory with one write-back range rounded up to a power of two and punches the excess
//! back to uncacheable, which uses far fewer variable MTRRs than describing each region on its own. The legacy
//! window below 1 MiB is fixed: conventional memory write-back, VGA uncacheable and the option ROM area
//! write-protected.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
mod controller;

pub use controller::{MsrAccess, MtrrController};

fsp_sdk::if_x64! {
    pub use controller::HardwareMsr;
}

#[cfg(any(test, feature = "mockall"))]
pub use controller::MockMsrAccess;

use alloc::vec::Vec;

use fsp_sdk::{
    base::{next_power_of_two, SIZE_256MB, SIZE_4GB},
    error::EfiError,
};

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Memory types understood by the MTRRs.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    Uncacheable = 0,
    WriteCombining = 1,
    WriteThrough = 4,
    WriteProtected = 5,
    WriteBack = 6,
}

/// One range of the cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRange {
    pub base: u64,
    pub length: u64,
    pub cache_type: CacheType,
}

impl CacheRange {
    const fn new(base: u64, length: u64, cache_type: CacheType) -> Self {
        Self { base, length, cache_type }
    }
}

/// Programs memory cache types.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait CacheController {
    /// Drops every existing range, including the cache-as-RAM setup, and makes uncacheable the default type.
    fn reset(&mut self) -> Result<(), EfiError>;

    /// Applies `cache_type` to `[base, base + length)`.
    fn set_attributes(&mut self, base: u64, length: u64, cache_type: CacheType) -> Result<(), EfiError>;
}

/// The smallest range starting at zero that the policy uses to cover `low_memory_length` bytes with one write-back
/// range.
///
/// This is the next power of two at or above the length. If that reaches 4 GiB the length is instead rounded up to a
/// 256 MiB boundary, so the range never covers the MMIO hole below 4 GiB.
pub fn largest_covering_range(low_memory_length: u64) -> u64 {
    let covering = next_power_of_two(low_memory_length).unwrap_or(u64::MAX);
    if covering >= SIZE_4GB as u64 {
        let mask = SIZE_256MB as u64 - 1;
        (low_memory_length + mask) & !mask
    } else {
        covering
    }
}

/// The ordered list of ranges the policy programs.
pub fn cache_policy(low_memory_length: u64, high_memory_length: u64) -> Vec<CacheRange> {
    let mut ranges = Vec::with_capacity(6);
    ranges.push(CacheRange::new(0x0_0000, 0xA_0000, CacheType::WriteBack));
    ranges.push(CacheRange::new(0xA_0000, 0x2_0000, CacheType::Uncacheable));
    ranges.push(CacheRange::new(0xC_0000, 0x4_0000, CacheType::WriteProtected));

    let covering = largest_covering_range(low_memory_length);
    ranges.push(CacheRange::new(0, covering, CacheType::WriteBack));
    if covering != low_memory_length {
        ranges.push(CacheRange::new(low_memory_length, covering - low_memory_length, CacheType::Uncacheable));
    }
    if high_memory_length != 0 {
        ranges.push(CacheRange::new(SIZE_4GB as u64, high_memory_length, CacheType::WriteBack));
    }
    ranges
}

/// Resets the cache configuration and programs the policy in order.
pub fn program_cache_policy(
    cache: &mut dyn CacheController,
    low_memory_length: u64,
    high_memory_length: u64,
) -> Result<(), EfiError> {
    cache.reset()?;
    for range in cache_policy(low_memory_length, high_memory_length) {
        log::debug!(
            target: "fsp_memory",
            "cache {:#012x} + {:#012x} -> {:?}",
            range.base,
            range.length,
            range.cache_type
        );
        cache.set_attributes(range.base, range.length, range.cache_type)?;
    }
    Ok(())
}
