//! Locations that publish the address of the active global context.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::sync::atomic::{AtomicUsize, Ordering};

/// A single machine word holding the address of the active [`GlobalContext`](crate::GlobalContext).
///
/// A store must be observed whole by any interrupt handler that reads the slot.
pub trait ContextSlot: Sync {
    /// Returns the published address, or zero.
    fn load(&self) -> usize;
    /// Publishes `address`.
    fn store(&self, address: usize);
}

/// A slot kept in an ordinary static.
#[derive(Debug, Default)]
pub struct AtomicSlot(AtomicUsize);

impl AtomicSlot {
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }
}

impl ContextSlot for AtomicSlot {
    fn load(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn store(&self, address: usize) {
        self.0.store(address, Ordering::Release)
    }
}

fsp_sdk::if_x64! {
    /// The 8-byte word immediately below the loaded IDT base.
    ///
    /// The stage loader reserves that word when it builds its IDT, so the slot moves together with the table.
    #[derive(Debug, Default)]
    pub struct IdtSlot;

    impl ContextSlot for IdtSlot {
        fn load(&self) -> usize {
            let idtr = x86_64::instructions::tables::sidt();
            let slot = (idtr.base.as_u64() - 8) as *const u64;
            // SAFETY: the loaded IDT was built with a reserved word in front of it.
            unsafe { core::ptr::read_volatile(slot) as usize }
        }

        fn store(&self, address: usize) {
            x86_64::instructions::interrupts::without_interrupts(|| {
                let idtr = x86_64::instructions::tables::sidt();
                let slot = (idtr.base.as_u64() - 8) as *mut u64;
                // SAFETY: the loaded IDT was built with a reserved word in front of it.
                unsafe { core::ptr::write_volatile(slot, address as u64) }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_slot() {
        let slot = AtomicSlot::new();
        assert_eq!(slot.load(), 0);
        slot.store(0x7F7F_0000);
        assert_eq!(slot.load(), 0x7F7F_0000);
    }
}
