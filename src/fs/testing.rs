//! Helpers shared by the unit tests.

use std::{
    collections::HashSet,
    io::{Error, ErrorKind, Result},
    sync::{Arc, Mutex},
};

use crate::{
    disk::{Block, BlockDevice, MemDisk},
    fs::FileSystem,
};

/// A `MemDisk` that fails reads or writes of chosen blocks.
pub struct FaultyDisk {
    inner: MemDisk,
    bad_reads: Mutex<HashSet<u64>>,
    bad_writes: Mutex<HashSet<u64>>,
}

impl FaultyDisk {
    pub fn new(block_count: u64) -> Self {
        Self {
            inner: MemDisk::new(block_count),
            bad_reads: Mutex::new(HashSet::new()),
            bad_writes: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_reads_of(&self, block_id: u64) {
        self.bad_reads.lock().unwrap().insert(block_id);
    }

    pub fn fail_writes_of(&self, block_id: u64) {
        self.bad_writes.lock().unwrap().insert(block_id);
    }

    pub fn heal(&self) {
        self.bad_reads.lock().unwrap().clear();
        self.bad_writes.lock().unwrap().clear();
    }
}

impl BlockDevice for FaultyDisk {
    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()> {
        if self.bad_reads.lock().unwrap().contains(&block_id) {
            return Err(Error::new(ErrorKind::Other, format!("injected read failure at {}", block_id)));
        }
        self.inner.read_block(block_id, buf)
    }

    fn write_block(&self, block_id: u64, buf: &Block) -> Result<()> {
        if self.bad_writes.lock().unwrap().contains(&block_id) {
            return Err(Error::new(ErrorKind::Other, format!("injected write failure at {}", block_id)));
        }
        self.inner.write_block(block_id, buf)
    }

    fn block_count(&self) -> u64 {
        self.inner.block_count()
    }
}

/// Freshly formatted in-memory volume.
pub fn fresh_fs(total_blocks: u64, max_files: usize) -> FileSystem {
    let disk = Arc::new(MemDisk::new(total_blocks));
    FileSystem::format(disk, max_files).unwrap()
}

/// Freshly formatted volume whose disk can be told to fail.
pub fn faulty_fs(total_blocks: u64, max_files: usize) -> (Arc<FaultyDisk>, FileSystem) {
    let disk = Arc::new(FaultyDisk::new(total_blocks));
    let fs = FileSystem::format(disk.clone(), max_files).unwrap();
    (disk, fs)
}

/// Deterministic, non-repeating-per-block test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}
