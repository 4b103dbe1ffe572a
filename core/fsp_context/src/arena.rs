//! Generation-checked storage for configuration blocks.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{vec, vec::Vec};

use crate::ContextError;

/// Names one block in a [`ConfigArena`] generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigHandle {
    generation: u32,
    index: u32,
}

impl ConfigHandle {
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Holds the config blocks of the current memory epoch.
///
/// [`ConfigArena::migrate`] copies a block into a freshly allocated buffer and discards every block of the previous
/// generation, so a handle to the pre-migration copy cannot be resolved afterwards.
#[derive(Debug, Default)]
pub struct ConfigArena {
    generation: u32,
    blocks: Vec<Vec<u8>>,
}

impl ConfigArena {
    pub const fn new() -> Self {
        Self { generation: 0, blocks: Vec::new() }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Adds a copy of `block` to the current generation.
    pub fn insert(&mut self, block: &[u8]) -> ConfigHandle {
        self.blocks.push(block.to_vec());
        ConfigHandle { generation: self.generation, index: (self.blocks.len() - 1) as u32 }
    }

    pub fn get(&self, handle: ConfigHandle) -> Result<&[u8], ContextError> {
        self.check(handle)?;
        Ok(&self.blocks[handle.index as usize])
    }

    pub fn get_mut(&mut self, handle: ConfigHandle) -> Result<&mut [u8], ContextError> {
        self.check(handle)?;
        Ok(&mut self.blocks[handle.index as usize])
    }

    /// Moves the arena to a new generation, keeping only the blocks listed in `keep`.
    ///
    /// Each kept block is copied into a new buffer of exactly its declared `region_size` bytes. The returned handles
    /// are in the same order as `keep`. On error the arena is unchanged.
    pub fn migrate(&mut self, keep: &[(ConfigHandle, usize)]) -> Result<Vec<ConfigHandle>, ContextError> {
        let mut blocks = Vec::with_capacity(keep.len());
        for (handle, region_size) in keep {
            let old = self.get(*handle)?;
            if old.len() < *region_size {
                return Err(ContextError::BlockTooSmall);
            }
            let mut new = vec![0u8; *region_size];
            new.copy_from_slice(&old[..*region_size]);
            blocks.push(new);
        }
        let generation = self.generation.wrapping_add(1);
        let handles = (0..blocks.len() as u32).map(|index| ConfigHandle { generation, index }).collect();
        self.blocks = blocks;
        self.generation = generation;
        log::debug!("config arena moved to generation {}", generation);
        Ok(handles)
    }

    fn check(&self, handle: ConfigHandle) -> Result<(), ContextError> {
        if handle.generation != self.generation || handle.index as usize >= self.blocks.len() {
            return Err(ContextError::StaleHandle);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_preserves_contents() {
        let mut arena = ConfigArena::new();
        let upd: Vec<u8> = (0..=255u8).cycle().take(0x300).collect();
        let handle = arena.insert(&upd);

        let new = arena.migrate(&[(handle, 0x300)]).unwrap();
        assert_eq!(arena.get(new[0]).unwrap(), &upd[..]);
        assert_eq!(arena.generation(), 1);
    }

    #[test]
    fn test_migrate_sizes_to_declared_region() {
        let mut arena = ConfigArena::new();
        let handle = arena.insert(&[0xAA; 0x40]);
        let new = arena.migrate(&[(handle, 0x20)]).unwrap();
        assert_eq!(arena.get(new[0]).unwrap().len(), 0x20);
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut arena = ConfigArena::new();
        let fspm = arena.insert(&[1, 2, 3, 4]);
        let fsps = arena.insert(&[5, 6]);
        let new = arena.migrate(&[(fspm, 4)]).unwrap();

        assert_eq!(arena.get(fspm), Err(ContextError::StaleHandle));
        assert_eq!(arena.get(fsps), Err(ContextError::StaleHandle));
        assert_eq!(arena.get_mut(fspm).map(|b| b.len()), Err(ContextError::StaleHandle));
        arena.get_mut(new[0]).unwrap()[0] = 9;
        assert_eq!(arena.get(new[0]).unwrap(), &[9, 2, 3, 4]);
    }

    #[test]
    fn test_short_block_leaves_arena_unchanged() {
        let mut arena = ConfigArena::new();
        let handle = arena.insert(&[0; 8]);
        assert_eq!(arena.migrate(&[(handle, 16)]), Err(ContextError::BlockTooSmall));
        assert_eq!(arena.generation(), 0);
        assert!(arena.get(handle).is_ok());
    }
}
