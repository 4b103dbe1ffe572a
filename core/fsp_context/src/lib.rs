//! Loader Global Context
//!
//! The loader keeps one process-wide [`GlobalContext`] record describing its stack, its memory pool and the HOB
//! list produced by memory-init. The record starts out in temporary RAM and is copied exactly once into permanent
//! memory. [`ContextStore`] owns the pointer to the active record and publishes it through a [`ContextSlot`], the
//! architecture-defined location code without a usable stack can still reach.
//!
//! Configuration (UPD) blocks are kept in a [`ConfigArena`]. Migrating a block into permanent memory starts a new
//! arena generation, so handles issued before the migration no longer resolve.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod arena;
pub mod context;
pub mod slot;
pub mod store;

pub use arena::{ConfigArena, ConfigHandle};
pub use context::{GlobalContext, LDR_GDATA_SIGNATURE};
pub use slot::{AtomicSlot, ContextSlot};
pub use store::ContextStore;

/// Errors raised by the context store and the config arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// No context has been installed yet.
    NotInstalled,
    /// A context is already installed, or has already been relocated.
    AlreadyInstalled,
    /// The record at the given address does not carry the loader signature.
    BadSignature,
    /// The handle was issued by an earlier arena generation or does not exist.
    StaleHandle,
    /// The block is shorter than its declared region size.
    BlockTooSmall,
}

impl From<ContextError> for fsp_sdk::error::EfiError {
    fn from(value: ContextError) -> Self {
        use fsp_sdk::error::EfiError;
        match value {
            ContextError::NotInstalled => EfiError::NotReady,
            ContextError::AlreadyInstalled => EfiError::AlreadyStarted,
            ContextError::BadSignature => EfiError::VolumeCorrupted,
            ContextError::StaleHandle => EfiError::InvalidParameter,
            ContextError::BlockTooSmall => EfiError::BadBufferSize,
        }
    }
}
