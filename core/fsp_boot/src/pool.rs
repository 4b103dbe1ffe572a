//! Loader pool layout in permanent memory.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::mem::size_of;

use fsp_context::GlobalContext;
use fsp_sdk::{base::align_down, error::BootError};

use crate::{
    config::LoaderConfig,
    cpu::{StageGdtTable, StageIdtTable},
};

const POOL_ALIGNMENT: u64 = 0x10;

/// Where the loader puts its state below the FSP reserved region.
///
/// The pool spans `[mem_pool_start, mem_pool_end)`. The global context, the IDT and the GDT are carved from its top
/// in that order, each aligned down to 16 bytes, and `mem_pool_curr_top` ends at the GDT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLayout {
    pub mem_pool_start: u64,
    pub mem_pool_end: u64,
    pub context: u64,
    pub idt: u64,
    pub gdt: u64,
    pub mem_pool_curr_top: u64,
    pub stack_top: u64,
    pub mem_usable_top: u64,
    /// The stack pointer used after the switch.
    pub switch_stack_top: u64,
}

impl PoolLayout {
    pub fn compute(reserved_base: u64, reserved_length: u64, config: &LoaderConfig) -> Result<Self, BootError> {
        if reserved_base == 0 {
            return Err(BootError::ResourceNotFound);
        }
        let mem_pool_start = reserved_base
            .checked_sub(config.loader_reserved_memory_size as u64)
            .ok_or(BootError::ResourceExhausted)?;
        let mem_pool_end = reserved_base - config.loader_hob_stack_size as u64;
        if mem_pool_end <= mem_pool_start {
            return Err(BootError::ConfigurationInvalid);
        }

        let carve = |top: u64, size: usize| {
            top.checked_sub(size as u64)
                .and_then(|addr| align_down(addr, POOL_ALIGNMENT).ok())
                .filter(|addr| *addr >= mem_pool_start)
                .ok_or(BootError::ResourceExhausted)
        };
        let context = carve(mem_pool_end, size_of::<GlobalContext>())?;
        let idt = carve(context, size_of::<StageIdtTable>())?;
        let gdt = carve(idt, size_of::<StageGdtTable>())?;
        let switch_stack_top =
            align_down(reserved_base, config.stack_alignment).map_err(|_| BootError::ConfigurationInvalid)?;

        Ok(Self {
            mem_pool_start,
            mem_pool_end,
            context,
            idt,
            gdt,
            mem_pool_curr_top: gdt,
            stack_top: reserved_base,
            mem_usable_top: reserved_base + reserved_length,
            switch_stack_top,
        })
    }

    /// Writes the pool bounds into the relocated context.
    pub fn apply(&self, context: &mut GlobalContext, hob_list: u64) {
        context.hob_list = hob_list;
        context.stack_top = self.stack_top as u32;
        context.mem_pool_end = self.mem_pool_end as u32;
        context.mem_pool_start = self.mem_pool_start as u32;
        context.mem_pool_curr_top = self.mem_pool_curr_top as u32;
        context.mem_pool_curr_bottom = self.mem_pool_start as u32;
        context.mem_usable_top = self.mem_usable_top as u32;
    }
}
