use std::{
    fs::{File, OpenOptions},
    io::{Read, Result, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

use log::debug;

use crate::disk::{
    block_device::{check_range, BlockDevice},
    types::{Block, BLOCK_SIZE},
};

/// A disk image file on the host, addressed in `BLOCK_SIZE` units.
#[derive(Debug)]
pub struct FileDisk {
    file: Mutex<File>,
    block_count: u64,
}

impl FileDisk {
    /// Opens `path`, creating it when missing. An image smaller than
    /// `block_count` blocks is grown to that size.
    pub fn open<P: AsRef<Path>>(path: P, block_count: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;

        let wanted = block_count * BLOCK_SIZE as u64;
        let current = file.metadata()?.len();
        if current < wanted {
            debug!(
                "growing disk image {} from {} to {} bytes",
                path.as_ref().display(),
                current,
                wanted
            );
            file.set_len(wanted)?;
        }
        let block_count = file.metadata()?.len() / BLOCK_SIZE as u64;

        Ok(Self {
            file: Mutex::new(file),
            block_count,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()> {
        check_range(block_id, self.block_count)?;
        let mut file = self.lock();
        file.seek(SeekFrom::Start(block_id * BLOCK_SIZE as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&self, block_id: u64, buf: &Block) -> Result<()> {
        check_range(block_id, self.block_count)?;
        let mut file = self.lock();
        file.seek(SeekFrom::Start(block_id * BLOCK_SIZE as u64))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }
}
