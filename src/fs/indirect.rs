//! Logical-to-physical block mapping for one inode.
//!
//! Logical blocks `0..DIRECT_BLOCKS` live in the inode's direct array. The
//! next `INDIRECT_ENTRIES` live in a single indirect block, allocated the
//! first time a logical block past the direct range is written.

use log::{debug, trace};

use crate::{
    disk::{Block, BlockDevice, ZERO_BLOCK},
    fs::{
        bitmap::{Bitmap, BitmapKind},
        config::{Layout, DIRECT_BLOCKS, INDIRECT_ENTRIES},
        error::{FileSystemError, Result},
        inode_table::{Inode, InodeTable},
    },
};

/// Highest logical block number + 1 an inode can address.
pub const MAX_LOGICAL_BLOCKS: usize = DIRECT_BLOCKS + INDIRECT_ENTRIES;

/// Decoded indirect block: little-endian `u16` pointers, 0 = unmapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectBlock([u16; INDIRECT_ENTRIES]);

impl IndirectBlock {
    pub fn decode(block: &Block) -> Self {
        let mut entries = [0u16; INDIRECT_ENTRIES];
        for (entry, bytes) in entries.iter_mut().zip(block.chunks_exact(2)) {
            *entry = u16::from_le_bytes([bytes[0], bytes[1]]);
        }
        Self(entries)
    }

    pub fn encode(&self) -> Block {
        let mut block = ZERO_BLOCK;
        for (bytes, entry) in block.chunks_exact_mut(2).zip(self.0.iter()) {
            bytes.copy_from_slice(&entry.to_le_bytes());
        }
        block
    }

    pub fn get(&self, slot: usize) -> u16 {
        self.0[slot]
    }

    pub fn set(&mut self, slot: usize, block_id: u16) {
        self.0[slot] = block_id;
    }

    pub fn mapped(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied().filter(|&b| b != 0)
    }
}

/// Borrowed view over the pieces block mapping needs.
pub struct BlockMap<'a> {
    disk: &'a dyn BlockDevice,
    layout: &'a Layout,
    bitmap: &'a Bitmap,
    inode_table: &'a InodeTable,
}

impl<'a> BlockMap<'a> {
    pub fn new(
        disk: &'a dyn BlockDevice,
        layout: &'a Layout,
        bitmap: &'a Bitmap,
        inode_table: &'a InodeTable,
    ) -> Self {
        Self {
            disk,
            layout,
            bitmap,
            inode_table,
        }
    }

    fn read_indirect(&self, block_id: u16) -> Result<IndirectBlock> {
        let mut block = ZERO_BLOCK;
        self.disk.read_block(u64::from(block_id), &mut block)?;
        Ok(IndirectBlock::decode(&block))
    }

    fn write_indirect(&self, block_id: u16, indirect: &IndirectBlock) -> Result<()> {
        self.disk.write_block(u64::from(block_id), &indirect.encode())?;
        Ok(())
    }

    /// Physical block behind `logical`, `None` if it was never written.
    pub fn translate(&self, inode: &Inode, logical: usize) -> Result<Option<u64>> {
        if logical >= MAX_LOGICAL_BLOCKS {
            return Err(FileSystemError::ExceedsMaxFileSize);
        }
        let pointer = if logical < DIRECT_BLOCKS {
            inode.direct[logical]
        } else if inode.indirect == 0 {
            0
        } else {
            self.read_indirect(inode.indirect)?.get(logical - DIRECT_BLOCKS)
        };
        Ok((pointer != 0).then(|| u64::from(pointer)))
    }

    /// Takes a free data block, zeroes it on disk and returns its id.
    fn alloc_block(&self) -> Result<u16> {
        let bit = self.bitmap.alloc(BitmapKind::Data)?;
        let block_id = self.layout.data_block(bit);
        if let Err(e) = self.disk.write_block(block_id, &ZERO_BLOCK) {
            self.bitmap.free(BitmapKind::Data, bit)?;
            return Err(e.into());
        }
        // Layout caps the device at u16::MAX + 1 blocks.
        Ok(block_id as u16)
    }

    /// Maps `logical` for writing, allocating the data block (and the indirect
    /// block, first time past the direct range) when needed. `inode` is
    /// updated in place and persisted whenever it changes.
    pub fn ensure_mapped(
        &self,
        inode_index: usize,
        inode: &mut Inode,
        logical: usize,
    ) -> Result<u64> {
        if let Some(block_id) = self.translate(inode, logical)? {
            return Ok(block_id);
        }

        if logical < DIRECT_BLOCKS {
            let block_id = self.alloc_block()?;
            inode.direct[logical] = block_id;
            self.inode_table.write_inode(inode_index, inode)?;
            trace!("inode {}: logical {} -> block {}", inode_index, logical, block_id);
            return Ok(u64::from(block_id));
        }

        if inode.indirect == 0 {
            inode.indirect = self.alloc_block()?;
            self.inode_table.write_inode(inode_index, inode)?;
            debug!("inode {}: indirect block {}", inode_index, inode.indirect);
        }

        let mut indirect = self.read_indirect(inode.indirect)?;
        let block_id = self.alloc_block()?;
        indirect.set(logical - DIRECT_BLOCKS, block_id);
        self.write_indirect(inode.indirect, &indirect)?;
        trace!("inode {}: logical {} -> block {}", inode_index, logical, block_id);
        Ok(u64::from(block_id))
    }

    fn release(&self, block_id: u16) -> Result<()> {
        let bit = self.layout.data_bit(u64::from(block_id)).ok_or_else(|| {
            FileSystemError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("block pointer {} outside the data region", block_id),
            ))
        })?;
        self.bitmap.free(BitmapKind::Data, bit)
    }

    /// Every block the inode holds: its direct pointers, the indirect block
    /// and the pointers stored in it. An indirect pointer outside the data
    /// region is returned but not followed.
    pub fn owned_blocks(&self, inode: &Inode) -> Result<Vec<u16>> {
        let mut blocks: Vec<u16> = inode.direct.iter().copied().filter(|&b| b != 0).collect();
        if inode.indirect != 0 {
            blocks.push(inode.indirect);
            if self.layout.data_bit(u64::from(inode.indirect)).is_some() {
                blocks.extend(self.read_indirect(inode.indirect)?.mapped());
            }
        }
        Ok(blocks)
    }

    /// Frees every data block the inode maps plus its indirect block.
    /// Returns how many blocks went back to the bitmap.
    pub fn release_all(&self, inode: &Inode) -> Result<usize> {
        let blocks = self.owned_blocks(inode)?;
        for &block_id in &blocks {
            self.release(block_id)?;
        }
        Ok(blocks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemDisk;
    use crate::fs::error::Resource;
    use std::{collections::HashSet, sync::Arc};

    struct Fixture {
        disk: Arc<MemDisk>,
        layout: Layout,
        bitmap: Bitmap,
        table: InodeTable,
    }

    impl Fixture {
        fn new(total_blocks: u64) -> Self {
            let disk = Arc::new(MemDisk::new(total_blocks));
            let layout = Layout::new(total_blocks, 16).unwrap();
            Self {
                bitmap: Bitmap::new(disk.clone(), layout),
                table: InodeTable::new(disk.clone(), layout),
                disk,
                layout,
            }
        }

        fn map(&self) -> BlockMap<'_> {
            BlockMap::new(self.disk.as_ref(), &self.layout, &self.bitmap, &self.table)
        }
    }

    #[test]
    fn indirect_block_codec() {
        let mut indirect = IndirectBlock::decode(&ZERO_BLOCK);
        indirect.set(0, 0x0102);
        indirect.set(INDIRECT_ENTRIES - 1, 600);
        let block = indirect.encode();
        assert_eq!(&block[..2], &[0x02, 0x01]);
        assert_eq!(IndirectBlock::decode(&block), indirect);
        assert_eq!(indirect.mapped().count(), 2);
    }

    #[test]
    fn every_logical_block_translates_back() {
        let fx = Fixture::new(400);
        let map = fx.map();
        let mut inode = Inode::empty();

        let mut physical = Vec::new();
        for logical in 0..MAX_LOGICAL_BLOCKS {
            assert_eq!(map.translate(&inode, logical).unwrap(), None);
            physical.push(map.ensure_mapped(0, &mut inode, logical).unwrap());
        }
        for (logical, &block_id) in physical.iter().enumerate() {
            assert_eq!(map.translate(&inode, logical).unwrap(), Some(block_id));
            assert!(fx.layout.data_bit(block_id).is_some());
        }

        let distinct: HashSet<_> = physical.iter().collect();
        assert_eq!(distinct.len(), MAX_LOGICAL_BLOCKS);
        assert!(!distinct.contains(&u64::from(inode.indirect)));

        // the persisted inode carries the same mapping
        let stored = fx.table.read_inode(0).unwrap();
        assert_eq!(stored, inode);
        assert_eq!(
            fx.bitmap.count_used(BitmapKind::Data).unwrap(),
            MAX_LOGICAL_BLOCKS + 1
        );
    }

    #[test]
    fn mapping_is_idempotent() {
        let fx = Fixture::new(100);
        let map = fx.map();
        let mut inode = Inode::empty();
        let first = map.ensure_mapped(0, &mut inode, 20).unwrap();
        let again = map.ensure_mapped(0, &mut inode, 20).unwrap();
        assert_eq!(first, again);
        // indirect + one data block, nothing in the direct range
        assert_eq!(fx.bitmap.count_used(BitmapKind::Data).unwrap(), 2);
        assert_eq!(inode.direct_count(), 0);
        assert_eq!(map.translate(&inode, 19).unwrap(), None);
    }

    #[test]
    fn release_all_returns_every_block() {
        let fx = Fixture::new(100);
        let map = fx.map();
        let mut inode = Inode::empty();
        for logical in [0, 5, 12, 13, 40] {
            map.ensure_mapped(0, &mut inode, logical).unwrap();
        }
        assert_eq!(fx.bitmap.count_used(BitmapKind::Data).unwrap(), 6);
        let owned = map.owned_blocks(&inode).unwrap();
        assert_eq!(owned.len(), 6);
        assert!(owned.contains(&inode.indirect));
        assert_eq!(map.release_all(&inode).unwrap(), 6);
        assert_eq!(fx.bitmap.count_used(BitmapKind::Data).unwrap(), 0);
    }

    #[test]
    fn fresh_blocks_are_zeroed() {
        let fx = Fixture::new(100);
        let map = fx.map();
        let dirty = [0xEEu8; crate::disk::BLOCK_SIZE];
        let target = fx.layout.data_block(0);
        fx.disk.write_block(target, &dirty).unwrap();

        let mut inode = Inode::empty();
        assert_eq!(map.ensure_mapped(0, &mut inode, 0).unwrap(), target);
        let mut block = dirty;
        fx.disk.read_block(target, &mut block).unwrap();
        assert_eq!(block, ZERO_BLOCK);
    }

    #[test]
    fn out_of_data_blocks() {
        // 33 - 19 = 14 data blocks: 13 direct, then only the indirect fits
        let fx = Fixture::new(33);
        let map = fx.map();
        let mut inode = Inode::empty();
        for logical in 0..DIRECT_BLOCKS {
            map.ensure_mapped(0, &mut inode, logical).unwrap();
        }
        assert!(matches!(
            map.ensure_mapped(0, &mut inode, DIRECT_BLOCKS),
            Err(FileSystemError::OutOfSpace(Resource::DataBlocks))
        ));
        assert_ne!(inode.indirect, 0);
        assert!(matches!(
            map.translate(&inode, MAX_LOGICAL_BLOCKS),
            Err(FileSystemError::ExceedsMaxFileSize)
        ));
    }
}
