use std::sync::Arc;

use log::debug;

use crate::{
    disk::{BlockDevice, ZERO_BLOCK},
    fs::{
        config::{Layout, BITS_PER_BLOCK, DATA_BLOCK_BITMAP_BLOCK_ID, INODE_BITMAP_BLOCK_ID},
        error::{FileSystemError, Resource, Result},
    },
};

/// The two namespaces tracked by a bitmap block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapKind {
    Inode,
    Data,
}

impl BitmapKind {
    fn block_id(self) -> u64 {
        match self {
            BitmapKind::Inode => INODE_BITMAP_BLOCK_ID,
            BitmapKind::Data => DATA_BLOCK_BITMAP_BLOCK_ID,
        }
    }

    fn exhausted(self) -> FileSystemError {
        match self {
            BitmapKind::Inode => FileSystemError::OutOfSpace(Resource::Inodes),
            BitmapKind::Data => FileSystemError::OutOfSpace(Resource::DataBlocks),
        }
    }
}

/// Single-block bitmaps for inodes and data blocks.
///
/// Bit `i` sits in byte `i / 8`, most significant bit first. A set bit means
/// the index is allocated. Nothing is cached: every call goes to the disk.
pub struct Bitmap {
    disk: Arc<dyn BlockDevice>,
    layout: Layout,
}

#[inline]
fn mask(index: usize) -> u8 {
    0x80 >> (index % 8)
}

impl Bitmap {
    pub fn new(disk: Arc<dyn BlockDevice>, layout: Layout) -> Self {
        Self { disk, layout }
    }

    /// Number of valid indices in the namespace.
    pub fn capacity(&self, kind: BitmapKind) -> usize {
        match kind {
            BitmapKind::Inode => self.layout.max_files,
            BitmapKind::Data => self.layout.data_blocks as usize,
        }
    }

    /// First free index, or `None` when every index is taken.
    pub fn find_free(&self, kind: BitmapKind) -> Result<Option<usize>> {
        let capacity = self.capacity(kind);
        let mut block = ZERO_BLOCK;
        self.disk.read_block(kind.block_id(), &mut block)?;

        for (byte_index, byte) in block.iter().enumerate() {
            if byte_index * 8 >= capacity {
                break;
            }
            if *byte == 0xFF {
                continue;
            }
            for bit in 0..8 {
                let index = byte_index * 8 + bit;
                if index >= capacity {
                    return Ok(None);
                }
                if byte & mask(index) == 0 {
                    return Ok(Some(index));
                }
            }
        }
        Ok(None)
    }

    /// Sets or clears one bit and writes the bitmap block back.
    pub fn set_status(&self, kind: BitmapKind, index: usize, allocated: bool) -> Result<()> {
        self.check_index(kind, index)?;

        let mut block = ZERO_BLOCK;
        self.disk.read_block(kind.block_id(), &mut block)?;
        if allocated {
            block[index / 8] |= mask(index);
        } else {
            block[index / 8] &= !mask(index);
        }
        self.disk.write_block(kind.block_id(), &block)?;
        Ok(())
    }

    pub fn is_allocated(&self, kind: BitmapKind, index: usize) -> Result<bool> {
        self.check_index(kind, index)?;
        let mut block = ZERO_BLOCK;
        self.disk.read_block(kind.block_id(), &mut block)?;
        Ok(block[index / 8] & mask(index) != 0)
    }

    /// Finds a free index and marks it allocated.
    pub fn alloc(&self, kind: BitmapKind) -> Result<usize> {
        let index = self.find_free(kind)?.ok_or_else(|| kind.exhausted())?;
        self.set_status(kind, index, true)?;
        debug!("bitmap {:?}: allocated {}", kind, index);
        Ok(index)
    }

    pub fn free(&self, kind: BitmapKind, index: usize) -> Result<()> {
        self.set_status(kind, index, false)?;
        debug!("bitmap {:?}: freed {}", kind, index);
        Ok(())
    }

    pub fn count_used(&self, kind: BitmapKind) -> Result<usize> {
        let capacity = self.capacity(kind);
        let mut block = ZERO_BLOCK;
        self.disk.read_block(kind.block_id(), &mut block)?;
        Ok((0..capacity)
            .filter(|&i| block[i / 8] & mask(i) != 0)
            .count())
    }

    /// Set bits at or past the namespace capacity. A volume laid out for
    /// this geometry never has any.
    pub fn count_stray(&self, kind: BitmapKind) -> Result<usize> {
        let capacity = self.capacity(kind);
        let mut block = ZERO_BLOCK;
        self.disk.read_block(kind.block_id(), &mut block)?;
        Ok((capacity..BITS_PER_BLOCK)
            .filter(|&i| block[i / 8] & mask(i) != 0)
            .count())
    }

    fn check_index(&self, kind: BitmapKind, index: usize) -> Result<()> {
        let capacity = self.capacity(kind);
        debug_assert!(index < capacity, "{:?} index {} out of range", kind, index);
        if index >= capacity {
            return Err(FileSystemError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{:?} bitmap index {} out of range ({})", kind, index, capacity),
            )));
        }
        Ok(())
    }
}
