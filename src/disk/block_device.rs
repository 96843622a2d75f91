use std::io::{Error, ErrorKind, Result};

use crate::disk::types::Block;

/// Fixed-size block storage. No caching and no partial-block access.
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()>;
    fn write_block(&self, block_id: u64, buf: &Block) -> Result<()>;

    /// Total number of blocks the device exposes.
    fn block_count(&self) -> u64;
}

/// Rejects block ids past the end of the device.
pub(crate) fn check_range(block_id: u64, block_count: u64) -> Result<()> {
    if block_id >= block_count {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("block {} out of range (device has {} blocks)", block_id, block_count),
        ));
    }
    Ok(())
}
