use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    disk::{BlockDevice, ZERO_BLOCK},
    fs::{
        config::{Layout, DIRECT_BLOCKS, INODES_PER_BLOCK, INODE_SIZE},
        error::{FileSystemError, Result},
    },
};

/// On-disk inode, 32 bytes with bincode's fixed-int encoding.
///
/// Block pointers are absolute block ids; 0 means "not mapped" since block 0
/// always holds the inode bitmap.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Inode {
    pub size: u32,                         // file size in bytes
    pub direct: [u16; DIRECT_BLOCKS],      // direct block pointers
    pub indirect: u16,                     // single indirect block, 0 if none
}

impl Inode {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of blocks mapped directly (holes not counted).
    pub fn direct_count(&self) -> usize {
        self.direct.iter().filter(|&&b| b != 0).count()
    }
}

/// Fixed range of blocks holding `INODES_PER_BLOCK` inodes each.
pub struct InodeTable {
    disk: Arc<dyn BlockDevice>,
    layout: Layout,
}

impl InodeTable {
    pub fn new(disk: Arc<dyn BlockDevice>, layout: Layout) -> Self {
        Self { disk, layout }
    }

    fn locate(&self, index: usize) -> Result<(u64, usize)> {
        let block_id = self.layout.inode_block(index).ok_or_else(|| {
            FileSystemError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("inode {} outside the inode table", index),
            ))
        })?;
        Ok((block_id, (index % INODES_PER_BLOCK) * INODE_SIZE))
    }

    pub fn read_inode(&self, index: usize) -> Result<Inode> {
        let (block_id, offset) = self.locate(index)?;
        let mut block = ZERO_BLOCK;
        self.disk.read_block(block_id, &mut block)?;
        let inode = bincode::deserialize(&block[offset..offset + INODE_SIZE])?;
        Ok(inode)
    }

    /// Read-modify-write of the block owning `index`.
    pub fn write_inode(&self, index: usize, inode: &Inode) -> Result<()> {
        debug_assert!(
            self.layout.inode_block(index).is_some(),
            "inode {} outside the inode table",
            index
        );
        let (block_id, offset) = self.locate(index)?;
        let mut block = ZERO_BLOCK;
        self.disk.read_block(block_id, &mut block)?;
        bincode::serialize_into(&mut block[offset..offset + INODE_SIZE], inode)?;
        self.disk.write_block(block_id, &block)?;
        Ok(())
    }
}
