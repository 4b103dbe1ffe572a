//! The stage dispatch state machine.
//!
//! ```text
//! PreMemory -> MemoryInitCalled -> TempRamTornDown -> SiliconInitCalled -> NotifyPhase(0..=2) -> HandoffToPayload
//! ```
//!
//! Transitions are linear. Calling a step out of order, or any failed FSP call, halts the machine.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::ptr::NonNull;

use fsp_context::{ConfigArena, ContextSlot, ContextStore, GlobalContext};
use fsp_pi::{
    hob::HobList,
    upd::{apply_loader_defaults, check_fsps_upd, check_fspm_upd},
};
use fsp_sdk::{fatal, guids};

use crate::{
    config::LoaderConfig,
    cpu::{load_stage_tables, prepare_stage_tables, StageCpu, StageGdtTable, StageIdtTable},
    fsp_api::{FspBinary, FspCallGate, NotifyPhase},
    pool::PoolLayout,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PreMemory,
    MemoryInitCalled,
    TempRamTornDown,
    SiliconInitCalled,
    NotifyPhase(u8),
    HandoffToPayload,
}

pub struct StageLoader<'a, G: FspCallGate, S: ContextSlot> {
    config: LoaderConfig,
    fspm: FspBinary<G>,
    fsps: FspBinary<G>,
    store: &'a ContextStore<S>,
    arena: &'a mut ConfigArena,
    stage: Stage,
    hob_list: u64,
}

impl<'a, G: FspCallGate, S: ContextSlot> StageLoader<'a, G, S> {
    pub fn new(
        config: LoaderConfig,
        fspm: FspBinary<G>,
        fsps: FspBinary<G>,
        store: &'a ContextStore<S>,
        arena: &'a mut ConfigArena,
    ) -> Self {
        Self { config, fspm, fsps, store, arena, stage: Stage::PreMemory, hob_list: 0 }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn hob_list(&self) -> u64 {
        self.hob_list
    }

    fn advance(&mut self, from: Stage, to: Stage) {
        if self.stage != from {
            fatal!("stage {:?} cannot move to {:?}", self.stage, to);
        }
        log::debug!(target: "fsp_boot", "stage {:?} -> {:?}", from, to);
        self.stage = to;
    }

    /// Builds the temporary-RAM context at `context` and loads the stage tables.
    ///
    /// ## Safety
    ///
    /// `context`, `gdt` and `idt` must stay mapped until [`StageLoader::relocate`] and must not be accessed other
    /// than through the loader.
    pub unsafe fn install_temporary(
        &mut self,
        context: NonNull<GlobalContext>,
        stack_top: u32,
        gdt: &mut StageGdtTable,
        idt: &mut StageIdtTable,
        cpu: &mut dyn StageCpu,
    ) {
        if self.stage != Stage::PreMemory {
            fatal!("temporary context installed in stage {:?}", self.stage);
        }
        let mut initial = GlobalContext::temporary(stack_top, self.config.temporary_pool_size);
        initial.debug_print_error_level = self.config.debug_print_error_level;
        // SAFETY: caller guarantees `context` is writable.
        unsafe { context.as_ptr().write(initial) };
        load_stage_tables(gdt, idt, context.as_ptr() as u64, cpu);
        // SAFETY: caller guarantees `context` outlives the temporary phase.
        if let Err(err) = unsafe { self.store.install(context) } {
            fatal!("global context install failed: {:?}", err);
        }
        log::info!(target: "fsp_boot", "============= FSP-R Entry =============");
    }

    /// Runs memory-init with the loader's copy of the FSP-M defaults and returns the HOB list address.
    pub fn memory_init(&mut self) -> u64 {
        self.advance(Stage::PreMemory, Stage::MemoryInitCalled);

        let mut upd = self.fspm.default_upd();
        if let Err(err) = apply_loader_defaults(&mut upd).and_then(|_| check_fspm_upd(&upd)) {
            fatal!("FSP-M UPD rejected: {:?}", err);
        }
        let handle = self.arena.insert(&upd);
        if let Err(err) = self.store.update(|context| context.fspm_upd = Some(handle)) {
            fatal!("global context unavailable: {:?}", err);
        }

        let block = match self.arena.get_mut(handle) {
            Ok(block) => block,
            Err(err) => fatal!("FSP-M UPD handle does not resolve: {:?}", err),
        };
        self.hob_list = match self.fspm.memory_init(block) {
            Ok(hob_list) => hob_list,
            Err(err) => fatal!("FspMemoryInit failed: {:?}", err),
        };
        self.hob_list
    }

    /// Moves the global context and the stage tables into the pool below the FSP reserved region.
    ///
    /// Returns the stack top to switch to.
    ///
    /// ## Safety
    ///
    /// The pool described by the FSP reserved resource in `hobs` must be mapped, writable and otherwise unused.
    pub unsafe fn relocate(&mut self, hobs: &HobList, cpu: &mut dyn StageCpu) -> u64 {
        if self.stage != Stage::MemoryInitCalled || self.store.is_permanent() {
            fatal!("context relocation in stage {:?}", self.stage);
        }
        let Some(reserved) = hobs.find_resource_by_owner(&guids::FSP_RESERVED_MEMORY_RESOURCE_HOB) else {
            fatal!("FSP reserved memory resource not found");
        };
        let layout = match PoolLayout::compute(reserved.physical_start, reserved.resource_length, &self.config) {
            Ok(layout) => layout,
            Err(err) => fatal!("loader pool does not fit below {:#x}: {:?}", reserved.physical_start, err),
        };

        let gdt_ptr = layout.gdt as *mut StageGdtTable;
        let idt_ptr = layout.idt as *mut StageIdtTable;
        // SAFETY: caller guarantees the pool is writable; the layout keeps the three carves disjoint.
        let (gdt, idt) = unsafe {
            gdt_ptr.write(StageGdtTable::new());
            idt_ptr.write(StageIdtTable::new());
            (&mut *gdt_ptr, &mut *idt_ptr)
        };
        prepare_stage_tables(gdt, idt, layout.context, cpu);

        let Some(destination) = NonNull::new(layout.context as *mut GlobalContext) else {
            fatal!("loader pool carve produced a null context");
        };
        let hob_list = self.hob_list;
        // The copy must land before the new IDT makes its lookup word visible.
        // SAFETY: the destination lies in the pool, which the caller guarantees is usable.
        if let Err(err) = unsafe { self.store.relocate(destination, |context| layout.apply(context, hob_list)) } {
            fatal!("global context relocation failed: {:?}", err);
        }
        cpu.load_descriptor_tables(gdt.entries.as_ptr() as u64, gdt.limit(), idt.base(), idt.limit());

        log::info!(target: "fsp_boot", "Switch to memory stack @ {:#010x}", layout.switch_stack_top);
        layout.switch_stack_top
    }

    pub fn temp_ram_exit(&mut self) {
        if !self.store.is_permanent() {
            fatal!("temporary RAM teardown while the global context still lives in it");
        }
        self.advance(Stage::MemoryInitCalled, Stage::TempRamTornDown);
        if let Err(err) = self.fspm.temp_ram_exit() {
            fatal!("FspTempRamExit failed: {:?}", err);
        }
    }

    pub fn silicon_init(&mut self) {
        self.advance(Stage::TempRamTornDown, Stage::SiliconInitCalled);

        let upd = self.fsps.default_upd();
        if let Err(err) = check_fsps_upd(&upd) {
            fatal!("FSP-S UPD rejected: {:?}", err);
        }
        let handle = self.arena.insert(&upd);
        if let Err(err) = self.store.update(|context| context.fsps_upd = Some(handle)) {
            fatal!("global context unavailable: {:?}", err);
        }
        let block = match self.arena.get_mut(handle) {
            Ok(block) => block,
            Err(err) => fatal!("FSP-S UPD handle does not resolve: {:?}", err),
        };
        if let Err(err) = self.fsps.silicon_init(block) {
            fatal!("FspSiliconInit failed: {:?}", err);
        }
    }

    pub fn notify_phases(&mut self) {
        for (index, phase) in NotifyPhase::SEQUENCE.into_iter().enumerate() {
            let from = match index {
                0 => Stage::SiliconInitCalled,
                n => Stage::NotifyPhase(n as u8 - 1),
            };
            self.advance(from, Stage::NotifyPhase(index as u8));
            if let Err(err) = self.fsps.notify_phase(phase) {
                fatal!("FspNotifyPhase({:?}) failed: {:?}", phase, err);
            }
        }
    }

    /// Reads the payload entry through the pointer slot below the FSP area and jumps to it.
    ///
    /// On hardware the payload does not return.
    pub fn hand_off(&mut self, cpu: &mut dyn StageCpu) {
        self.advance(Stage::NotifyPhase(2), Stage::HandoffToPayload);
        log::info!(target: "fsp_boot", "HobList is located at {:#010x}", self.hob_list);
        log::info!(target: "fsp_boot", "============= FSP-R Exit =============");

        // SAFETY: the slot and the table it points to are in the always-mapped flash region.
        let entry = unsafe {
            let table = cpu.read_u32(self.config.fsp_area_base - 4);
            cpu.read_u32(table as u64)
        };
        if entry == 0 {
            fatal!("no payload entry point");
        }
        log::info!(target: "fsp_boot", "Jump into OEM entry {:#010x}", entry);
        // SAFETY: the entry point was published by the payload image.
        unsafe { cpu.enter_payload(entry as u64, self.hob_list, self.config.payload_stack_size) };
    }

    /// Everything after the stack switch.
    pub fn continue_in_memory(&mut self, cpu: &mut dyn StageCpu) {
        self.temp_ram_exit();
        self.silicon_init();
        self.notify_phases();
        self.hand_off(cpu);
    }
}

fsp_sdk::if_x64! {
    use core::arch::asm;

    extern "efiapi" fn run_continuation(continuation: *mut &mut dyn FnMut()) {
        // SAFETY: `switch_stack` passes a pointer to a live closure reference.
        unsafe { (*continuation)() }
    }

    /// Calls `continuation` with the stack pointer at `stack_top` and restores the old stack if it returns.
    ///
    /// ## Safety
    ///
    /// `stack_top` must be the top of a mapped, writable and unused stack region.
    pub unsafe fn switch_stack(stack_top: u64, continuation: &mut dyn FnMut()) {
        let mut continuation = continuation;
        // SAFETY: caller guarantees the stack. r12 is callee-saved in the efiapi ABI.
        unsafe {
            asm!(
                "mov r12, rsp",
                "mov rsp, rax",
                "sub rsp, 0x20",
                "call {entry}",
                "mov rsp, r12",
                entry = sym run_continuation,
                in("rax") stack_top,
                in("rcx") &mut continuation as *mut &mut dyn FnMut(),
                out("r12") _,
                clobber_abi("efiapi"),
            );
        }
    }

    impl<G: FspCallGate, S: ContextSlot> StageLoader<'_, G, S> {
        /// Runs the whole sequence from temporary RAM and never returns.
        ///
        /// ## Safety
        ///
        /// Must be called once, on the temporary-RAM stack, with `context`, `gdt` and `idt` in temporary RAM.
        pub unsafe fn run(
            mut self,
            context: NonNull<GlobalContext>,
            stack_top: u32,
            gdt: &mut StageGdtTable,
            idt: &mut StageIdtTable,
            cpu: &mut dyn StageCpu,
        ) -> ! {
            // SAFETY: forwarded from the caller.
            unsafe { self.install_temporary(context, stack_top, gdt, idt, cpu) };
            let hob_list = self.memory_init();
            // SAFETY: memory-init reported a HOB list in permanent memory.
            let hobs = match unsafe { HobList::from_address(hob_list as usize) } {
                Ok(hobs) => hobs,
                Err(err) => fatal!("HOB list at {:#x} is unreadable: {:?}", hob_list, err),
            };
            // SAFETY: the pool comes from the FSP reserved resource.
            let new_stack = unsafe { self.relocate(&hobs, cpu) };
            // SAFETY: the new stack sits at the top of the loader pool.
            unsafe { switch_stack(new_stack, &mut || self.continue_in_memory(cpu)) };
            fatal!("payload returned");
        }
    }
}
