//! Processor services used by the stage loader.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
pub mod exception;
pub mod gdt;
pub mod idt;

pub use gdt::StageGdtTable;
pub use idt::StageIdtTable;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Operations on the running processor that have no host equivalent.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait StageCpu {
    /// Loads GDTR and IDTR.
    fn load_descriptor_tables(&mut self, gdt_base: u64, gdt_limit: u16, idt_base: u64, idt_limit: u16);
    /// Address of the exception stub for `vector`.
    fn exception_stub(&self, vector: u8) -> u64;
    /// The code segment selector the gates should use.
    fn code_selector(&self) -> u16;
    /// Reads a 32-bit word from physical memory.
    ///
    /// ## Safety
    ///
    /// `address` must be mapped and readable.
    unsafe fn read_u32(&self, address: u64) -> u32;
    /// Jumps to the payload with the HOB list and its stack size.
    ///
    /// ## Safety
    ///
    /// `entry` must be the payload entry point.
    unsafe fn enter_payload(&mut self, entry: u64, hob_list: u64, stack_size: u32);
}

/// Fills `gdt` and `idt` for a context at `context` and loads both.
pub fn load_stage_tables(gdt: &mut StageGdtTable, idt: &mut StageIdtTable, context: u64, cpu: &mut dyn StageCpu) {
    prepare_stage_tables(gdt, idt, context, cpu);
    cpu.load_descriptor_tables(gdt.entries.as_ptr() as u64, gdt.limit(), idt.base(), idt.limit());
}

/// Fills `gdt` and `idt` for a context at `context` without loading them.
pub fn prepare_stage_tables(gdt: &mut StageGdtTable, idt: &mut StageIdtTable, context: u64, cpu: &dyn StageCpu) {
    *gdt = StageGdtTable::new();
    idt.populate(context, cpu.code_selector(), |vector| cpu.exception_stub(vector));
}

fsp_sdk::if_x64! {
    use x86_64::{
        instructions::{segmentation::{Segment, CS}, tables::{lgdt, lidt}},
        structures::DescriptorTablePointer,
        VirtAddr,
    };

    /// [`StageCpu`] on the boot processor.
    #[derive(Debug, Default)]
    pub struct BootProcessor;

    impl StageCpu for BootProcessor {
        fn load_descriptor_tables(&mut self, gdt_base: u64, gdt_limit: u16, idt_base: u64, idt_limit: u16) {
            // SAFETY: both tables were built by `prepare_stage_tables` in memory that stays mapped for the rest of
            // boot, and the code selector in use is present in the new GDT.
            unsafe {
                lgdt(&DescriptorTablePointer { limit: gdt_limit, base: VirtAddr::new(gdt_base) });
                lidt(&DescriptorTablePointer { limit: idt_limit, base: VirtAddr::new(idt_base) });
            }
            log::debug!(target: "fsp_boot", "GDT @ {:#x}, IDT @ {:#x}", gdt_base, idt_base);
        }

        fn exception_stub(&self, vector: u8) -> u64 {
            exception::exception_stub(vector)
        }

        fn code_selector(&self) -> u16 {
            CS::get_reg().0
        }

        unsafe fn read_u32(&self, address: u64) -> u32 {
            // SAFETY: caller guarantees the address is readable.
            unsafe { core::ptr::read_volatile(address as *const u32) }
        }

        unsafe fn enter_payload(&mut self, entry: u64, hob_list: u64, stack_size: u32) {
            // SAFETY: caller guarantees `entry` is the payload entry point.
            let payload: extern "efiapi" fn(u64, u32, u32) = unsafe { core::mem::transmute(entry as usize) };
            payload(hob_list, 0, stack_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_load_stage_tables() {
        let mut gdt = StageGdtTable { entries: [0; gdt::STAGE_GDT_ENTRY_COUNT] };
        let mut idt = StageIdtTable::new();
        let gdt_base = gdt.entries.as_ptr() as u64;
        let idt_base = idt.base();

        let mut cpu = MockStageCpu::new();
        cpu.expect_code_selector().return_const(gdt::CODE64_SELECTOR);
        cpu.expect_exception_stub().times(idt::STAGE_IDT_ENTRY_COUNT).returning(|v| 0xFFF9_0000 + v as u64 * 16);
        cpu.expect_load_descriptor_tables()
            .with(eq(gdt_base), eq(55), eq(idt_base), eq(34 * 16 - 1))
            .times(1)
            .return_const(());

        load_stage_tables(&mut gdt, &mut idt, 0x7EBF_EF00, &mut cpu);
        assert_eq!(gdt, StageGdtTable::new());
        assert_eq!(idt.ldr_global, 0x7EBF_EF00);
        assert_eq!(idt.gates[14].handler(), 0xFFF9_00E0);
        assert_eq!(idt.gates[14].low.selector(), gdt::CODE64_SELECTOR);
    }
}
