use std::{collections::HashSet, sync::Arc};

use log::{debug, info, warn};

use crate::{
    disk::{BlockDevice, ZERO_BLOCK},
    fs::{
        bitmap::{Bitmap, BitmapKind},
        config::{Layout, MAX_FILE_SIZE},
        directory::{validate_name, DirEntry, Directory, EntryFlags},
        error::{FileSystemError, Resource, Result},
        file::{AccessMode, FileHandle},
        indirect::BlockMap,
        inode_table::{Inode, InodeTable},
    },
};

pub mod bitmap;
pub mod config;
pub mod directory;
pub mod error;
pub mod file;
pub mod indirect;
pub mod inode_table;

#[cfg(test)]
pub(crate) mod testing;

/// Usage counters for one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStats {
    pub inodes_used: usize,
    pub inodes_total: usize,
    pub data_used: usize,
    pub data_total: usize,
    pub files: usize,
    pub max_files: usize,
}

/// A mounted volume. Every mutating operation takes `&mut self`, so one
/// actor at a time touches the on-disk structures.
pub struct FileSystem {
    disk: Arc<dyn BlockDevice>,     // underlying block store
    layout: Layout,                 // where every range lives
    bitmap: Bitmap,                 // inode and data allocation
    inode_table: InodeTable,        // inode records
    directory: Directory,           // one entry per block
}

impl FileSystem {
    fn assemble(disk: Arc<dyn BlockDevice>, layout: Layout) -> Self {
        Self {
            bitmap: Bitmap::new(disk.clone(), layout),
            inode_table: InodeTable::new(disk.clone(), layout),
            directory: Directory::new(disk.clone(), layout),
            disk,
            layout,
        }
    }

    /// Lays out an empty volume on `disk`, erasing what was there.
    pub fn format(disk: Arc<dyn BlockDevice>, max_files: usize) -> Result<Self> {
        Self::format_with_progress(disk, max_files, |_, _| {})
    }

    /// Like [`format`](Self::format), calling `progress(done, total)` after
    /// each metadata block is cleared.
    pub fn format_with_progress<F>(
        disk: Arc<dyn BlockDevice>,
        max_files: usize,
        mut progress: F,
    ) -> Result<Self>
    where
        F: FnMut(u64, u64),
    {
        let layout = Layout::new(disk.block_count(), max_files)?;
        let total = layout.metadata_blocks();
        for block_id in 0..total {
            disk.write_block(block_id, &ZERO_BLOCK)?;
            progress(block_id + 1, total);
        }
        info!(
            "formatted {} blocks: {} files, {} data blocks from block {}",
            layout.total_blocks, layout.max_files, layout.data_blocks, layout.data_start
        );
        Ok(Self::assemble(disk, layout))
    }

    /// Opens an existing volume laid out for `max_files`. Nothing is written
    /// until the on-disk structures are known to fit that layout; a volume
    /// formatted with a different `max_files` is `InvalidLayout`. Open flags
    /// left behind by a previous session are then cleared, since no handle
    /// from it can still be alive.
    pub fn mount(disk: Arc<dyn BlockDevice>, max_files: usize) -> Result<Self> {
        let layout = Layout::new(disk.block_count(), max_files)?;
        let fs = Self::assemble(disk, layout);

        for (mut entry, block_id) in fs.check_volume()? {
            warn!("clearing stale open flag on {}", entry.name);
            entry.set_open(false);
            fs.directory.write_entry(&entry, block_id)?;
        }
        info!(
            "mounted {} blocks, {} files in use",
            layout.total_blocks,
            fs.bitmap.count_used(BitmapKind::Inode)?
        );
        Ok(fs)
    }

    /// Walks the bitmaps, the directory and every inode it names, checking
    /// that they agree with this layout. Returns the entries still flagged
    /// open.
    ///
    /// A leaked empty inode (allocated, unnamed, zeroed) is allowed: failed
    /// creates and deletes leave those behind.
    fn check_volume(&self) -> Result<Vec<(DirEntry, u64)>> {
        let mismatch = |what: String| {
            FileSystemError::InvalidLayout(format!(
                "{} (was the volume formatted with a different max files than {}?)",
                what, self.layout.max_files
            ))
        };

        for kind in [BitmapKind::Inode, BitmapKind::Data] {
            let stray = self.bitmap.count_stray(kind)?;
            if stray > 0 {
                return Err(mismatch(format!("{} {:?} bits set past capacity", stray, kind)));
            }
        }

        let map = self.block_map();
        let mut named = HashSet::new();
        let mut owned = HashSet::new();
        let mut open = Vec::new();
        for block_id in self.layout.directory_range() {
            let entry = match self.directory.read_slot(block_id)? {
                None => continue,
                Some(entry) if !entry.is_allocated() => {
                    return Err(mismatch(format!("stray data in directory block {}", block_id)))
                }
                Some(entry) => entry,
            };

            let inode_index = usize::from(entry.inode_index);
            if inode_index >= self.layout.max_files
                || !self.bitmap.is_allocated(BitmapKind::Inode, inode_index)?
                || !named.insert(inode_index)
            {
                return Err(mismatch(format!(
                    "{} names inode {} it does not own",
                    entry.name, inode_index
                )));
            }

            let inode = self.inode_table.read_inode(inode_index)?;
            if u64::from(inode.size) > MAX_FILE_SIZE {
                return Err(mismatch(format!("{} claims {} bytes", entry.name, inode.size)));
            }
            for pointer in map.owned_blocks(&inode)? {
                let held = match self.layout.data_bit(u64::from(pointer)) {
                    Some(bit) => self.bitmap.is_allocated(BitmapKind::Data, bit)?,
                    None => false,
                };
                if !held || !owned.insert(pointer) {
                    return Err(mismatch(format!(
                        "{} maps block {} outside its allocation",
                        entry.name, pointer
                    )));
                }
            }

            if entry.is_open() {
                open.push((entry, block_id));
            }
        }

        for inode_index in 0..self.layout.max_files {
            if named.contains(&inode_index) {
                continue;
            }
            if self.inode_table.read_inode(inode_index)? != Inode::empty() {
                return Err(mismatch(format!("unnamed inode {} holds data", inode_index)));
            }
            if self.bitmap.is_allocated(BitmapKind::Inode, inode_index)? {
                warn!("inode {} is allocated but unnamed, leaving it leaked", inode_index);
            }
        }
        Ok(open)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub(crate) fn block_map(&self) -> BlockMap<'_> {
        BlockMap::new(
            self.disk.as_ref(),
            &self.layout,
            &self.bitmap,
            &self.inode_table,
        )
    }

    /// Creates an empty file and opens it read-write.
    pub fn create(&mut self, name: &str) -> Result<FileHandle> {
        validate_name(name)?;
        if self.directory.find_by_name(name)?.is_some() {
            return Err(FileSystemError::FileAlreadyExists(name.to_string()));
        }
        // check both before touching anything so a full volume leaks nothing
        let inode_index = self
            .bitmap
            .find_free(BitmapKind::Inode)?
            .ok_or(FileSystemError::OutOfSpace(Resource::Inodes))?;
        if self.directory.find_free_slot()?.is_none() {
            return Err(FileSystemError::OutOfSpace(Resource::DirectorySlots));
        }

        let inode = Inode::empty();
        self.inode_table.write_inode(inode_index, &inode)?;
        self.bitmap.set_status(BitmapKind::Inode, inode_index, true)?;

        // max_files never exceeds one bitmap block, well inside u16
        let entry = DirEntry::new(
            name,
            inode_index as u16,
            EntryFlags::ALLOCATED | EntryFlags::OPEN,
        );
        let entry_block = self.directory.allocate_slot(&entry)?;

        debug!("created {} (inode {}, slot {})", name, inode_index, entry_block);
        Ok(FileHandle::new(entry, entry_block, inode, AccessMode::ReadWrite))
    }

    pub fn open(&mut self, name: &str, mode: AccessMode) -> Result<FileHandle> {
        validate_name(name)?;
        let (mut entry, entry_block) = self
            .directory
            .find_by_name(name)?
            .ok_or_else(|| FileSystemError::FileNotFound(name.to_string()))?;
        if entry.is_open() {
            return Err(FileSystemError::FileAlreadyOpen(name.to_string()));
        }

        let inode = self
            .inode_table
            .read_inode(usize::from(entry.inode_index))?;
        entry.set_open(true);
        self.directory.write_entry(&entry, entry_block)?;

        debug!("opened {} {:?} ({} bytes)", name, mode, inode.size);
        Ok(FileHandle::new(entry, entry_block, inode, mode))
    }

    /// Clears the open flag. The handle is closed afterwards even if the
    /// flag could not be written back.
    pub fn close(&mut self, handle: &mut FileHandle) -> Result<()> {
        if !handle.is_open() {
            return Err(FileSystemError::FileNotOpen);
        }
        handle.mark_closed();
        if let Err(e) = self.directory.write_entry(&handle.entry, handle.entry_block) {
            warn!("closing {}: could not persist entry: {}", handle.name(), e);
            return Err(e);
        }
        debug!("closed {}", handle.name());
        Ok(())
    }

    /// Removes a closed file and gives its inode and blocks back.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        let (entry, entry_block) = self
            .directory
            .find_by_name(name)?
            .ok_or_else(|| FileSystemError::FileNotFound(name.to_string()))?;
        if entry.is_open() {
            return Err(FileSystemError::FileAlreadyOpen(name.to_string()));
        }

        let inode_index = usize::from(entry.inode_index);
        let inode = self.inode_table.read_inode(inode_index)?;

        // record first, name second: a failure at any step leaks space but
        // never leaves an unnamed inode that still holds data
        self.inode_table.write_inode(inode_index, &Inode::empty())?;
        self.directory.clear_entry(entry_block)?;
        let freed = self.block_map().release_all(&inode)?;
        self.bitmap.free(BitmapKind::Inode, inode_index)?;

        debug!("deleted {} (inode {}, {} blocks freed)", name, inode_index, freed);
        Ok(())
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        if validate_name(name).is_err() {
            return Ok(false);
        }
        Ok(self.directory.find_by_name(name)?.is_some())
    }

    /// Names and sizes of every file, in directory order.
    pub fn list(&self) -> Result<Vec<(String, u64)>> {
        self.directory
            .list()?
            .into_iter()
            .map(|entry| {
                let inode = self
                    .inode_table
                    .read_inode(usize::from(entry.inode_index))?;
                Ok((entry.name, u64::from(inode.size)))
            })
            .collect()
    }

    pub fn stat(&self) -> Result<VolumeStats> {
        Ok(VolumeStats {
            inodes_used: self.bitmap.count_used(BitmapKind::Inode)?,
            inodes_total: self.bitmap.capacity(BitmapKind::Inode),
            data_used: self.bitmap.count_used(BitmapKind::Data)?,
            data_total: self.bitmap.capacity(BitmapKind::Data),
            files: self.directory.list()?.len(),
            max_files: self.layout.max_files,
        })
    }
}
