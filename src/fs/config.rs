//! Volume layout.
//!
//! ```text
//! [ inode bitmap | data bitmap | inode table | directory (1 entry / block) | data region ]
//!        0             1          2..             ..                         ..end
//! ```

use crate::{
    disk::{BLOCK_SIZE, DEFAULT_BLOCK_COUNT},
    fs::error::{FileSystemError, Result},
};

pub const INODE_BITMAP_BLOCK_ID: u64 = 0;
pub const DATA_BLOCK_BITMAP_BLOCK_ID: u64 = 1;
pub const INODE_TABLE_START_BLOCK_ID: u64 = 2;

/// Direct block pointers per inode.
pub const DIRECT_BLOCKS: usize = 13;

/// Pointers held by the single indirect block (2 bytes each).
pub const INDIRECT_ENTRIES: usize = BLOCK_SIZE / 2;

/// Encoded size of one inode: size (4) + direct (13 * 2) + indirect (2).
pub const INODE_SIZE: usize = 32;

pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// Indices one bitmap block can track.
pub const BITS_PER_BLOCK: usize = BLOCK_SIZE * 8;

pub const MAX_FILENAME_LEN: usize = 255;

/// Largest file a single level of indirection can address.
pub const MAX_FILE_SIZE: u64 = ((DIRECT_BLOCKS + INDIRECT_ENTRIES) * BLOCK_SIZE) as u64;

pub const DEFAULT_MAX_FILES: usize = 512;

pub const DEFAULT_TOTAL_BLOCKS: u64 = DEFAULT_BLOCK_COUNT;

/// Block pointers are stored as `u16`, so the device may not be larger than this.
pub const MAX_TOTAL_BLOCKS: u64 = u16::MAX as u64 + 1;

/// Where each on-disk range lives. Computed once per volume, never moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub total_blocks: u64,
    pub max_files: usize,        // inode slots == directory slots
    pub inode_table_start: u64,
    pub inode_table_blocks: u64,
    pub directory_start: u64,
    pub directory_blocks: u64,
    pub data_start: u64,
    pub data_blocks: u64, // capped by what one bitmap block can track
}

impl Layout {
    pub fn new(total_blocks: u64, max_files: usize) -> Result<Self> {
        if max_files == 0 || max_files > BITS_PER_BLOCK {
            return Err(FileSystemError::InvalidLayout(format!(
                "max files must be in 1..={}, got {}",
                BITS_PER_BLOCK, max_files
            )));
        }
        if total_blocks > MAX_TOTAL_BLOCKS {
            return Err(FileSystemError::InvalidLayout(format!(
                "{} blocks do not fit 16-bit block pointers (max {})",
                total_blocks, MAX_TOTAL_BLOCKS
            )));
        }

        let inode_table_start = INODE_TABLE_START_BLOCK_ID;
        let inode_table_blocks = max_files.div_ceil(INODES_PER_BLOCK) as u64;
        let directory_start = inode_table_start + inode_table_blocks;
        let directory_blocks = max_files as u64;
        let data_start = directory_start + directory_blocks;

        if data_start >= total_blocks {
            return Err(FileSystemError::InvalidLayout(format!(
                "{} blocks leave no data region after {} metadata blocks",
                total_blocks, data_start
            )));
        }
        let data_blocks = (total_blocks - data_start).min(BITS_PER_BLOCK as u64);

        Ok(Self {
            total_blocks,
            max_files,
            inode_table_start,
            inode_table_blocks,
            directory_start,
            directory_blocks,
            data_start,
            data_blocks,
        })
    }

    /// Inode table block holding `index`, or `None` past the table.
    pub fn inode_block(&self, index: usize) -> Option<u64> {
        let block = (index / INODES_PER_BLOCK) as u64 + self.inode_table_start;
        (index < self.max_files && block < self.directory_start).then_some(block)
    }

    /// Absolute block id behind data bitmap bit `bit`.
    pub fn data_block(&self, bit: usize) -> u64 {
        self.data_start + bit as u64
    }

    /// Data bitmap bit for an absolute block id, `None` outside the data region.
    pub fn data_bit(&self, block_id: u64) -> Option<usize> {
        (block_id >= self.data_start && block_id < self.data_start + self.data_blocks)
            .then(|| (block_id - self.data_start) as usize)
    }

    pub fn directory_range(&self) -> std::ops::Range<u64> {
        self.directory_start..self.directory_start + self.directory_blocks
    }

    /// Number of metadata blocks a format has to clear.
    pub fn metadata_blocks(&self) -> u64 {
        self.data_start
    }
}
