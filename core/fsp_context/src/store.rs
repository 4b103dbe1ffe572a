//! Single-writer owner of the active global context.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::ptr::NonNull;

use spin::Mutex;

use crate::{context::GlobalContext, slot::ContextSlot, ContextError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Empty,
    Temporary,
    Permanent,
}

/// Owns the pointer to the active [`GlobalContext`].
///
/// The record is installed once in temporary RAM and relocated once into permanent memory. Every write goes through
/// the store's lock, and the slot is only updated after the new record is fully written.
///
/// The closures passed to [`ContextStore::update`] and [`ContextStore::relocate`] run with the lock held and must not
/// call back into the store.
pub struct ContextStore<S: ContextSlot> {
    slot: S,
    phase: Mutex<Phase>,
}

impl<S: ContextSlot> ContextStore<S> {
    pub const fn new(slot: S) -> Self {
        Self { slot, phase: Mutex::new(Phase::Empty) }
    }

    /// Publishes the first context.
    ///
    /// ## Safety
    ///
    /// `context` must point to a record that stays mapped until [`ContextStore::relocate`] is called and that is
    /// not accessed other than through this store.
    pub unsafe fn install(&self, context: NonNull<GlobalContext>) -> Result<(), ContextError> {
        let mut phase = self.phase.lock();
        if *phase != Phase::Empty {
            return Err(ContextError::AlreadyInstalled);
        }
        // SAFETY: caller guarantees `context` is valid.
        if !unsafe { context.as_ref() }.is_valid() {
            return Err(ContextError::BadSignature);
        }
        self.slot.store(context.as_ptr() as usize);
        *phase = Phase::Temporary;
        log::debug!("Loader global data installed @ {:#x}", context.as_ptr() as usize);
        Ok(())
    }

    /// Copies the active record to `destination`, applies `update` to the copy and then repoints the slot.
    ///
    /// The old record is left untouched and is never read again through this store.
    ///
    /// ## Safety
    ///
    /// `destination` must point to writable memory for one [`GlobalContext`] that stays mapped for the rest of boot
    /// and does not overlap the active record.
    pub unsafe fn relocate(
        &self,
        destination: NonNull<GlobalContext>,
        update: impl FnOnce(&mut GlobalContext),
    ) -> Result<(), ContextError> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Empty => return Err(ContextError::NotInstalled),
            Phase::Permanent => return Err(ContextError::AlreadyInstalled),
            Phase::Temporary => (),
        }
        // SAFETY: the slot holds the record installed under the `install` contract.
        let mut copy = unsafe { core::ptr::read(self.active()?.as_ptr()) };
        update(&mut copy);
        // SAFETY: caller guarantees `destination` is writable.
        unsafe { destination.as_ptr().write(copy) };
        self.slot.store(destination.as_ptr() as usize);
        *phase = Phase::Permanent;
        log::info!("Loader global data @ {:#010x}", destination.as_ptr() as usize);
        Ok(())
    }

    /// Returns a snapshot of the active record.
    pub fn get(&self) -> Result<GlobalContext, ContextError> {
        let _phase = self.phase.lock();
        // SAFETY: the slot holds a record installed under the `install` or `relocate` contract.
        Ok(unsafe { core::ptr::read(self.active()?.as_ptr()) })
    }

    /// Mutates the active record in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut GlobalContext) -> R) -> Result<R, ContextError> {
        let _phase = self.phase.lock();
        let mut context = self.active()?;
        // SAFETY: the lock is held, so this is the only reference to the record.
        Ok(f(unsafe { context.as_mut() }))
    }

    /// Address of the active record, or zero.
    pub fn address(&self) -> usize {
        self.slot.load()
    }

    /// Whether the record has been relocated into permanent memory.
    pub fn is_permanent(&self) -> bool {
        *self.phase.lock() == Phase::Permanent
    }

    fn active(&self) -> Result<NonNull<GlobalContext>, ContextError> {
        NonNull::new(self.slot.load() as *mut GlobalContext).ok_or(ContextError::NotInstalled)
    }
}
