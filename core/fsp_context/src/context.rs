//! The loader global context record.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::arena::ConfigHandle;

/// 'LDRG'
pub const LDR_GDATA_SIGNATURE: u32 = u32::from_le_bytes(*b"LDRG");

/// Print mask used until a platform overrides it: error, warn, info, load, fs and init.
pub const DEFAULT_DEBUG_PRINT_ERROR_LEVEL: u32 = 0x8000_004F;

/// Process-wide loader state.
///
/// All addresses are physical. The pool grows down from `mem_pool_curr_top` and up from `mem_pool_curr_bottom`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalContext {
    pub signature: u32,
    pub boot_mode: u8,
    pub stack_top: u32,
    pub mem_pool_end: u32,
    pub mem_pool_start: u32,
    pub mem_pool_curr_top: u32,
    pub mem_pool_curr_bottom: u32,
    pub mem_usable_top: u32,
    pub debug_print_error_level: u32,
    pub hob_list: u64,
    /// The active FSP-M config block.
    pub fspm_upd: Option<ConfigHandle>,
    /// The active FSP-S config block.
    pub fsps_upd: Option<ConfigHandle>,
}

impl GlobalContext {
    /// A zeroed record carrying only the signature and the default print mask.
    pub const fn new() -> Self {
        Self {
            signature: LDR_GDATA_SIGNATURE,
            boot_mode: 0,
            stack_top: 0,
            mem_pool_end: 0,
            mem_pool_start: 0,
            mem_pool_curr_top: 0,
            mem_pool_curr_bottom: 0,
            mem_usable_top: 0,
            debug_print_error_level: DEFAULT_DEBUG_PRINT_ERROR_LEVEL,
            hob_list: 0,
            fspm_upd: None,
            fsps_upd: None,
        }
    }

    /// The initial temporary-RAM record: the pool spans `pool_size` bytes above `stack_top`.
    pub const fn temporary(stack_top: u32, pool_size: u32) -> Self {
        let mut context = Self::new();
        context.stack_top = stack_top;
        context.mem_pool_start = stack_top;
        context.mem_pool_end = stack_top + pool_size;
        context.mem_pool_curr_top = context.mem_pool_end;
        context.mem_pool_curr_bottom = context.mem_pool_start;
        context
    }

    pub fn is_valid(&self) -> bool {
        self.signature == LDR_GDATA_SIGNATURE
    }

    /// The log level implied by the debug print mask.
    pub fn level_filter(&self) -> log::LevelFilter {
        fsp_sdk::log::level_filter_from_print_mask(self.debug_print_error_level)
    }
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self::new()
    }
}
