//! PE/COFF Base Relocation Support
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;
use scroll::Pread;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pread)]
pub struct BaseRelocationBlockHeader {
    pub page_rva: u32,
    pub block_size: u32,
}

/// One fixup: the type in the top four bits and the page offset in the low twelve.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Relocation(pub u16);

impl Relocation {
    pub fn fixup_type(&self) -> u16 {
        self.0 >> 12
    }

    pub fn offset(&self) -> u32 {
        (self.0 & 0xFFF) as u32
    }
}

#[derive(Debug, Clone)]
pub struct RelocationBlock {
    pub block_header: BaseRelocationBlockHeader,
    pub relocations: Vec<Relocation>,
}

pub(crate) fn parse_relocation_blocks(block: &[u8]) -> super::error::Result<Vec<RelocationBlock>> {
    let mut offset: usize = 0;
    let mut blocks = Vec::new();

    while offset < block.len() {
        let block_start = offset;
        let block_header: BaseRelocationBlockHeader = block.gread_with(&mut offset, scroll::LE)?;
        if (block_header.block_size as usize) < core::mem::size_of::<BaseRelocationBlockHeader>() {
            return Err(super::error::Error::BufferTooShort(block_header.block_size as usize, "relocation block"));
        }

        let mut relocations = Vec::new();
        while offset < block_start + block_header.block_size as usize {
            relocations.push(Relocation(block.gread_with(&mut offset, scroll::LE)?));
        }

        blocks.push(RelocationBlock { block_header, relocations });
        // Blocks start on a 32-bit boundary.
        offset = (offset + 3) & !3;
    }

    Ok(blocks)
}
