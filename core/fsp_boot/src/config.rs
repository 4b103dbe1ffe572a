//! Stage loader configuration.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use fsp_context::context::DEFAULT_DEBUG_PRINT_ERROR_LEVEL;

/// Sizes and addresses the loader uses while moving from temporary RAM into permanent memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Bytes below the FSP reserved region handed to the loader memory pool.
    pub loader_reserved_memory_size: u32,
    /// Bytes directly below the FSP reserved region kept out of the pool for the HOB and stack.
    pub loader_hob_stack_size: u32,
    /// Size of the pool carved above the temporary stack.
    pub temporary_pool_size: u32,
    /// Alignment of the permanent-memory stack top.
    pub stack_alignment: u64,
    /// Stack size passed to the payload.
    pub payload_stack_size: u32,
    /// Address the FSP components are mapped below. The payload pointer slot sits 4 bytes under it.
    pub fsp_area_base: u64,
    pub debug_print_error_level: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            loader_reserved_memory_size: 0x10_0000,
            loader_hob_stack_size: 0x1000,
            temporary_pool_size: 0xE000,
            stack_alignment: 0x100,
            payload_stack_size: 0x8_0000,
            fsp_area_base: 0xFFF8_0000,
            debug_print_error_level: DEFAULT_DEBUG_PRINT_ERROR_LEVEL,
        }
    }
}
