//! Memory-discovered sequence.
//!
//! [`MemoryTransition::on_memory_discovered`] runs once, when the memory-init API has produced permanent memory. The
//! steps are strictly ordered:
//!
//! 1. Read the physical address width and publish the CPU HOB.
//! 2. Compute the top of low memory from the FSP reserved and boot loader reserved regions.
//! 3. Migrate the config blocks into a new arena generation and repoint the global context at the new copies.
//! 4. Report memory-init completion.
//! 5. When the chain was entered through the temp-RAM-exit API, reprogram the cache and report teardown completion.
//! 6. Walk the FSP image for firmware volumes.
//!
//! Every failure in this sequence halts the machine.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;

use fsp_context::{ConfigArena, ContextSlot, ContextStore};
use fsp_pi::hob::HobList;
use fsp_sdk::fatal;

use crate::{
    config::MemoryLayoutConfig,
    cpu::{physical_address_bits, CpuInfo},
    fv_report::{report_firmware_volumes, system_memory_size, top_of_low_memory, FvRegistrar},
    mtrr::{program_cache_policy, CacheController},
};

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// The FSP API that started the current call chain.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiIndex {
    TempRamInit = 0,
    FspInit = 1,
    NotifyPhase = 2,
    MemoryInit = 3,
    TempRamExit = 4,
    SiliconInit = 5,
}

impl TryFrom<u8> for ApiIndex {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::TempRamInit,
            1 => Self::FspInit,
            2 => Self::NotifyPhase,
            3 => Self::MemoryInit,
            4 => Self::TempRamExit,
            5 => Self::SiliconInit,
            other => return Err(other),
        })
    }
}

/// Hands control back to the boot loader at the end of an API.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait FspApiCallback {
    /// Index of the API the boot loader called to start this chain.
    fn calling_index(&self) -> ApiIndex;
    /// Returns from the memory-init API with the produced HOB list.
    fn memory_init_done(&mut self, hobs: &HobList);
    /// Returns from the temp-RAM-exit API.
    fn temp_ram_exit_done(&mut self);
}

/// The loaded FSP image the firmware volumes are searched in.
#[derive(Debug, Clone, Copy)]
pub struct FspImage<'a> {
    pub base: u64,
    pub bytes: &'a [u8],
    /// Declared size of the config region. Migrated FSP-M blocks are exactly this long.
    pub cfg_region_size: usize,
}

/// Collaborators the sequence drives.
pub struct Platform<'a> {
    pub cpu: &'a dyn CpuInfo,
    pub cache: &'a mut dyn CacheController,
    pub callback: &'a mut dyn FspApiCallback,
}

/// What the sequence did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionSummary {
    pub physical_address_bits: u8,
    pub top_of_low_memory: u64,
    pub high_memory_length: u64,
    pub cache_reprogrammed: bool,
    pub firmware_volumes: usize,
}

pub struct MemoryTransition<'a, S: ContextSlot> {
    store: &'a ContextStore<S>,
    arena: &'a mut ConfigArena,
    config: MemoryLayoutConfig,
}

impl<'a, S: ContextSlot> MemoryTransition<'a, S> {
    pub fn new(store: &'a ContextStore<S>, arena: &'a mut ConfigArena, config: MemoryLayoutConfig) -> Self {
        Self { store, arena, config }
    }

    pub fn on_memory_discovered(
        &mut self,
        hobs: &mut HobList,
        image: FspImage<'_>,
        platform: Platform<'_>,
    ) -> TransitionSummary {
        log::info!(target: "fsp_memory", "Memory Discovered Notify invoked ...");

        let bits = physical_address_bits(platform.cpu, self.config.fallback_physical_address_bits);
        hobs.build_cpu(bits, self.config.io_space_bits);

        let (low, high) = system_memory_size(hobs);
        log::debug!(target: "fsp_memory", "system memory low {:#x} high {:#x}", low, high);
        let tolm = match top_of_low_memory(hobs) {
            Ok(tolm) => tolm,
            Err(err) => fatal!("FSP reserved memory resource not found: {:?}", err),
        };
        log::info!(target: "fsp_memory", "FSP TOLM = {:#010x}", tolm);

        self.migrate_config(image.cfg_region_size);

        platform.callback.memory_init_done(hobs);

        let cache_reprogrammed = platform.callback.calling_index() == ApiIndex::TempRamExit;
        if cache_reprogrammed {
            if let Err(err) = program_cache_policy(platform.cache, tolm, high) {
                fatal!("cache policy programming failed: {:?}", err);
            }
            log::info!(target: "fsp_memory", "Memory Discovered Notify completed ...");
            platform.callback.temp_ram_exit_done();
        }

        let firmware_volumes = report_firmware_volumes(image.base, image.bytes, hobs as &mut dyn FvRegistrar);

        TransitionSummary {
            physical_address_bits: bits,
            top_of_low_memory: tolm,
            high_memory_length: high,
            cache_reprogrammed,
            firmware_volumes,
        }
    }

    /// Copies the live config blocks into a new arena generation and repoints the context.
    ///
    /// After this returns, handles taken before the call no longer resolve.
    fn migrate_config(&mut self, cfg_region_size: usize) {
        let context = self.store.get().unwrap_or_else(|err| fatal!("global context unavailable: {:?}", err));
        let Some(fspm) = context.fspm_upd else {
            fatal!("FSP-M UPD was never installed");
        };

        let mut keep = Vec::with_capacity(2);
        keep.push((fspm, cfg_region_size));
        if let Some(fsps) = context.fsps_upd {
            match self.arena.get(fsps) {
                Ok(block) => keep.push((fsps, block.len())),
                Err(err) => fatal!("FSP-S UPD handle does not resolve: {:?}", err),
            }
        }

        let handles = self.arena.migrate(&keep).unwrap_or_else(|err| fatal!("UPD migration failed: {:?}", err));
        let repointed = self.store.update(|context| {
            context.fspm_upd = handles.first().copied();
            context.fsps_upd = handles.get(1).copied();
        });
        if let Err(err) = repointed {
            fatal!("global context unavailable: {:?}", err);
        }
        log::info!(
            target: "fsp_memory",
            "Migrate FSP-M UPD from {:?} to {:?}",
            fspm,
            handles.first()
        );
    }
}
