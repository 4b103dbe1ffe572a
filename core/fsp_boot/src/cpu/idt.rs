//! Stage IDT with the global context word in front of it.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use bitfield_struct::bitfield;

pub const STAGE_IDT_ENTRY_COUNT: usize = 34;

pub const GATE_TYPE_INTERRUPT: u8 = 0xE;

/// Lower eight bytes of a long-mode gate descriptor.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct GateLow {
    pub offset_low: u16,
    pub selector: u16,
    #[bits(3)]
    pub ist: u8,
    #[bits(5)]
    pub reserved_0: u8,
    #[bits(4)]
    pub gate_type: u8,
    #[bits(1)]
    pub reserved_1: u8,
    #[bits(2)]
    pub dpl: u8,
    pub present: bool,
    pub offset_mid: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdtGate {
    pub low: GateLow,
    pub offset_high: u32,
    pub reserved: u32,
}

impl IdtGate {
    pub const fn missing() -> Self {
        Self { low: GateLow::new(), offset_high: 0, reserved: 0 }
    }

    /// A present ring-0 interrupt gate to `handler`.
    pub fn interrupt(handler: u64, selector: u16) -> Self {
        let low = GateLow::new()
            .with_offset_low(handler as u16)
            .with_selector(selector)
            .with_gate_type(GATE_TYPE_INTERRUPT)
            .with_present(true)
            .with_offset_mid((handler >> 16) as u16);
        Self { low, offset_high: (handler >> 32) as u32, reserved: 0 }
    }

    pub fn handler(&self) -> u64 {
        self.low.offset_low() as u64 | (self.low.offset_mid() as u64) << 16 | (self.offset_high as u64) << 32
    }
}

/// IDT storage carved from the loader pool.
///
/// `ldr_global` is the word immediately below the loaded IDT base and holds the address of the active global context.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StageIdtTable {
    pub ldr_global: u64,
    pub gates: [IdtGate; STAGE_IDT_ENTRY_COUNT],
}

impl StageIdtTable {
    pub const fn new() -> Self {
        Self { ldr_global: 0, gates: [IdtGate::missing(); STAGE_IDT_ENTRY_COUNT] }
    }

    /// Points every gate at its exception stub and records `context` in the lookup word.
    pub fn populate(&mut self, context: u64, selector: u16, stub: impl Fn(u8) -> u64) {
        self.ldr_global = context;
        for (vector, gate) in self.gates.iter_mut().enumerate() {
            *gate = IdtGate::interrupt(stub(vector as u8), selector);
        }
    }

    /// Address to load into the IDTR base.
    pub fn base(&self) -> u64 {
        self.gates.as_ptr() as u64
    }

    pub const fn limit(&self) -> u16 {
        (core::mem::size_of::<[IdtGate; STAGE_IDT_ENTRY_COUNT]>() - 1) as u16
    }
}

impl Default for StageIdtTable {
    fn default() -> Self {
        Self::new()
    }
}
