use std::{io::Result, sync::Mutex};

use crate::disk::{
    block_device::{check_range, BlockDevice},
    types::{Block, ZERO_BLOCK},
};

/// A volume held entirely in memory. Used for scratch volumes and tests.
#[derive(Debug)]
pub struct MemDisk {
    blocks: Mutex<Vec<Block>>,
}

impl MemDisk {
    pub fn new(block_count: u64) -> Self {
        Self {
            blocks: Mutex::new(vec![ZERO_BLOCK; block_count as usize]),
        }
    }

    fn blocks(&self) -> std::sync::MutexGuard<'_, Vec<Block>> {
        self.blocks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()> {
        check_range(block_id, self.block_count())?;
        buf.copy_from_slice(&self.blocks()[block_id as usize]);
        Ok(())
    }

    fn write_block(&self, block_id: u64, buf: &Block) -> Result<()> {
        check_range(block_id, self.block_count())?;
        self.blocks()[block_id as usize].copy_from_slice(buf);
        Ok(())
    }

    fn block_count(&self) -> u64 {
        self.blocks().len() as u64
    }
}
