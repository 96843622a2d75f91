use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    disk::{BlockDevice, ZERO_BLOCK},
    fs::{
        config::{Layout, MAX_FILENAME_LEN},
        error::{FileSystemError, Resource, Result},
    },
};

bitflags! {
    /// State bits stored with every directory entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryFlags: u8 {
        const ALLOCATED = 0b0000_0001;
        const OPEN      = 0b0000_0010;
    }
}

/// One directory entry. Each entry owns a whole block.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub inode_index: u16,
    flags: u8,
    pub name: String,
}

impl DirEntry {
    pub fn new(name: &str, inode_index: u16, flags: EntryFlags) -> Self {
        Self {
            inode_index,
            flags: flags.bits(),
            name: name.to_string(),
        }
    }

    pub fn flags(&self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.flags)
    }

    pub fn is_allocated(&self) -> bool {
        self.flags().contains(EntryFlags::ALLOCATED)
    }

    pub fn is_open(&self) -> bool {
        self.flags().contains(EntryFlags::OPEN)
    }

    pub fn set_open(&mut self, open: bool) {
        let mut flags = self.flags();
        flags.set(EntryFlags::OPEN, open);
        self.flags = flags.bits();
    }
}

/// Rejects names that cannot be stored in an entry.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() > MAX_FILENAME_LEN
        || name.bytes().any(|b| b == 0 || b == b'/')
    {
        return Err(FileSystemError::IllegalFilename(name.to_string()));
    }
    Ok(())
}

/// Flat directory: a fixed range of blocks, one entry per block.
pub struct Directory {
    disk: Arc<dyn BlockDevice>,
    layout: Layout,
}

impl Directory {
    pub fn new(disk: Arc<dyn BlockDevice>, layout: Layout) -> Self {
        Self { disk, layout }
    }

    pub fn read_entry(&self, block_id: u64) -> Result<DirEntry> {
        debug_assert!(self.layout.directory_range().contains(&block_id));
        let mut block = ZERO_BLOCK;
        self.disk.read_block(block_id, &mut block)?;
        Ok(bincode::deserialize(&block)?)
    }

    /// `None` for a zeroed slot, otherwise the entry stored there. A block
    /// that does not decode as an entry is `InvalidLayout`.
    pub fn read_slot(&self, block_id: u64) -> Result<Option<DirEntry>> {
        let mut block = ZERO_BLOCK;
        self.disk.read_block(block_id, &mut block)?;
        if block == ZERO_BLOCK {
            return Ok(None);
        }
        bincode::deserialize(&block).map(Some).map_err(|e| {
            FileSystemError::InvalidLayout(format!(
                "block {} does not hold a directory entry: {}",
                block_id, e
            ))
        })
    }

    pub fn write_entry(&self, entry: &DirEntry, block_id: u64) -> Result<()> {
        debug_assert!(self.layout.directory_range().contains(&block_id));
        let mut block = ZERO_BLOCK;
        bincode::serialize_into(&mut block[..], entry)?;
        self.disk.write_block(block_id, &block)?;
        Ok(())
    }

    /// Zeroes the slot, freeing it.
    pub fn clear_entry(&self, block_id: u64) -> Result<()> {
        debug_assert!(self.layout.directory_range().contains(&block_id));
        self.disk.write_block(block_id, &ZERO_BLOCK)?;
        Ok(())
    }

    /// First allocated entry called `name`, with the block it lives in.
    /// A failed read stops the scan.
    pub fn find_by_name(&self, name: &str) -> Result<Option<(DirEntry, u64)>> {
        for block_id in self.layout.directory_range() {
            let entry = self.read_entry(block_id)?;
            if entry.is_allocated() && entry.name == name {
                return Ok(Some((entry, block_id)));
            }
        }
        Ok(None)
    }

    pub fn find_free_slot(&self) -> Result<Option<u64>> {
        for block_id in self.layout.directory_range() {
            if !self.read_entry(block_id)?.is_allocated() {
                return Ok(Some(block_id));
            }
        }
        Ok(None)
    }

    /// Stores `entry` in the first free slot.
    pub fn allocate_slot(&self, entry: &DirEntry) -> Result<u64> {
        let block_id = self
            .find_free_slot()?
            .ok_or(FileSystemError::OutOfSpace(Resource::DirectorySlots))?;
        self.write_entry(entry, block_id)?;
        Ok(block_id)
    }

    /// Allocated entries in slot order.
    pub fn list(&self) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for block_id in self.layout.directory_range() {
            let entry = self.read_entry(block_id)?;
            if entry.is_allocated() {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}
