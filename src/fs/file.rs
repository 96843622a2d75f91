//! Open-file handles and the byte-range I/O engine.

use std::fmt;

use log::trace;

use crate::{
    disk::{BLOCK_SIZE, ZERO_BLOCK},
    fs::{
        config::MAX_FILE_SIZE,
        directory::DirEntry,
        error::{FileSystemError, Result},
        inode_table::Inode,
        FileSystem,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Open(AccessMode),
    Closed,
}

/// A process-local open file: copies of its directory entry and inode plus a cursor.
#[derive(Debug)]
pub struct FileHandle {
    pub(crate) entry: DirEntry,
    pub(crate) entry_block: u64,
    pub(crate) inode: Inode,
    cursor: u64,
    state: HandleState,
}

impl FileHandle {
    pub(crate) fn new(entry: DirEntry, entry_block: u64, inode: Inode, mode: AccessMode) -> Self {
        Self {
            entry,
            entry_block,
            inode,
            cursor: 0,
            state: HandleState::Open(mode),
        }
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn mode(&self) -> Option<AccessMode> {
        match self.state {
            HandleState::Open(mode) => Some(mode),
            HandleState::Closed => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.mode().is_some()
    }

    pub fn position(&self) -> u64 {
        self.cursor
    }

    pub fn len(&self) -> u64 {
        u64::from(self.inode.size)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn inode_index(&self) -> usize {
        usize::from(self.entry.inode_index)
    }

    pub(crate) fn mark_closed(&mut self) {
        self.state = HandleState::Closed;
        self.entry.set_open(false);
    }
}

/// A write that stopped early. The first `written` bytes were committed.
#[derive(Debug)]
pub struct ShortWrite {
    pub written: usize,
    pub error: FileSystemError,
}

impl ShortWrite {
    fn nothing(error: FileSystemError) -> Self {
        Self { written: 0, error }
    }
}

impl fmt::Display for ShortWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes written)", self.error, self.written)
    }
}

impl std::error::Error for ShortWrite {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<ShortWrite> for FileSystemError {
    fn from(e: ShortWrite) -> Self {
        e.error
    }
}

/// Splits an absolute byte position into (logical block, offset in block).
#[inline]
fn locate(pos: u64) -> (usize, usize) {
    ((pos / BLOCK_SIZE as u64) as usize, (pos % BLOCK_SIZE as u64) as usize)
}

impl FileSystem {
    /// Reads up to `buf.len()` bytes at the cursor, clamped to the file size.
    /// Unwritten blocks inside the file read as zeros.
    pub fn read(&self, handle: &mut FileHandle, buf: &mut [u8]) -> Result<usize> {
        if !handle.is_open() {
            return Err(FileSystemError::FileNotOpen);
        }
        let remaining = handle.len().saturating_sub(handle.cursor);
        let n = (buf.len() as u64).min(remaining) as usize;

        let map = self.block_map();
        let mut block = ZERO_BLOCK;
        let mut done = 0;
        while done < n {
            let (logical, offset) = locate(handle.cursor);
            let chunk = (BLOCK_SIZE - offset).min(n - done);
            match map.translate(&handle.inode, logical)? {
                Some(block_id) => {
                    self.disk.read_block(block_id, &mut block)?;
                    buf[done..done + chunk].copy_from_slice(&block[offset..offset + chunk]);
                }
                None => buf[done..done + chunk].fill(0),
            }
            handle.cursor += chunk as u64;
            done += chunk;
        }
        trace!("read {} bytes from {}", done, handle.name());
        Ok(done)
    }

    /// Writes `buf` at the cursor, growing the file as needed.
    ///
    /// Nothing is written when the handle is closed or read-only, or when the
    /// write would end past `MAX_FILE_SIZE`. A failure part way through
    /// returns `ShortWrite` with the number of bytes already committed.
    pub fn write(
        &mut self,
        handle: &mut FileHandle,
        buf: &[u8],
    ) -> std::result::Result<usize, ShortWrite> {
        match handle.mode() {
            None => return Err(ShortWrite::nothing(FileSystemError::FileNotOpen)),
            Some(AccessMode::ReadOnly) => {
                return Err(ShortWrite::nothing(FileSystemError::FileReadOnly))
            }
            Some(AccessMode::ReadWrite) => {}
        }
        if handle.cursor + buf.len() as u64 > MAX_FILE_SIZE {
            return Err(ShortWrite::nothing(FileSystemError::ExceedsMaxFileSize));
        }

        let old_size = handle.inode.size;
        let mut written = 0;
        let outcome = self.write_blocks(handle, buf, &mut written);

        // keep whatever made it to disk reachable, even after a failure
        let persisted = if handle.inode.size != old_size {
            self.inode_table
                .write_inode(handle.inode_index(), &handle.inode)
        } else {
            Ok(())
        };

        match outcome.and(persisted) {
            Ok(()) => {
                trace!("wrote {} bytes to {}", written, handle.name());
                Ok(written)
            }
            Err(error) => Err(ShortWrite { written, error }),
        }
    }

    fn write_blocks(&self, handle: &mut FileHandle, buf: &[u8], written: &mut usize) -> Result<()> {
        let map = self.block_map();
        let inode_index = handle.inode_index();
        let mut block = ZERO_BLOCK;

        while *written < buf.len() {
            let (logical, offset) = locate(handle.cursor);
            let chunk = (BLOCK_SIZE - offset).min(buf.len() - *written);

            let block_id = map.ensure_mapped(inode_index, &mut handle.inode, logical)?;
            if chunk < BLOCK_SIZE {
                self.disk.read_block(block_id, &mut block)?;
            }
            block[offset..offset + chunk].copy_from_slice(&buf[*written..*written + chunk]);
            self.disk.write_block(block_id, &block)?;

            handle.cursor += chunk as u64;
            *written += chunk;
            if handle.cursor > handle.len() {
                // bounded by MAX_FILE_SIZE
                handle.inode.size = handle.cursor as u32;
            }
        }
        Ok(())
    }

    /// Moves the cursor. Past the end of the file the size grows to `pos`
    /// and is persisted, whatever the access mode; the gap reads back as
    /// zeros.
    pub fn seek(&mut self, handle: &mut FileHandle, pos: u64) -> Result<()> {
        if !handle.is_open() {
            return Err(FileSystemError::FileNotOpen);
        }
        if pos > MAX_FILE_SIZE {
            return Err(FileSystemError::ExceedsMaxFileSize);
        }
        handle.cursor = pos;
        if pos > handle.len() {
            handle.inode.size = pos as u32;
            self.inode_table
                .write_inode(handle.inode_index(), &handle.inode)?;
        }
        Ok(())
    }

    pub fn file_length(&self, handle: &FileHandle) -> u64 {
        handle.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{
        bitmap::BitmapKind,
        config::{DIRECT_BLOCKS, INDIRECT_ENTRIES},
        error::Resource,
        testing::{faulty_fs, fresh_fs, pattern},
    };

    fn read_all(fs: &FileSystem, handle: &mut FileHandle, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        let n = fs.read(handle, &mut out).unwrap();
        out.truncate(n);
        out
    }

    #[test]
    fn write_then_read_back() {
        let mut fs = fresh_fs(400, 16);
        for (i, len) in [1, BLOCK_SIZE, 3 * BLOCK_SIZE + 77].into_iter().enumerate() {
            let data = pattern(len);
            let mut f = fs.create(&format!("f{}", i)).unwrap();
            assert_eq!(fs.write(&mut f, &data).unwrap(), len);
            assert_eq!(f.position(), len as u64);
            fs.seek(&mut f, 0).unwrap();
            assert_eq!(read_all(&fs, &mut f, len), data);
            fs.close(&mut f).unwrap();
        }
    }

    #[test]
    fn partial_block_overwrite_merges() {
        let mut fs = fresh_fs(100, 16);
        let mut f = fs.create("merge").unwrap();
        fs.write(&mut f, &[b'a'; 600]).unwrap();
        fs.seek(&mut f, 510).unwrap();
        fs.write(&mut f, b"XYZW").unwrap();
        assert_eq!(fs.file_length(&f), 600);

        fs.seek(&mut f, 0).unwrap();
        let data = read_all(&fs, &mut f, 1000);
        assert_eq!(data.len(), 600);
        assert_eq!(&data[508..516], b"aaXYZWaa");
        assert!(data[..510].iter().all(|&b| b == b'a'));
    }

    #[test]
    fn read_is_clamped_to_size() {
        let mut fs = fresh_fs(100, 16);
        let mut f = fs.create("short").unwrap();
        fs.write(&mut f, b"hello").unwrap();
        fs.seek(&mut f, 2).unwrap();
        assert_eq!(read_all(&fs, &mut f, 100), b"llo");
        assert_eq!(read_all(&fs, &mut f, 100), b"");
        assert_eq!(f.position(), 5);
    }

    #[test]
    fn data_survives_reopen() {
        let mut fs = fresh_fs(400, 16);
        let data = pattern((DIRECT_BLOCKS + 4) * BLOCK_SIZE + 5);
        let mut f = fs.create("persist").unwrap();
        fs.write(&mut f, &data).unwrap();
        fs.close(&mut f).unwrap();

        let mut f = fs.open("persist", AccessMode::ReadOnly).unwrap();
        assert_eq!(f.len(), data.len() as u64);
        assert_eq!(read_all(&fs, &mut f, data.len()), data);
    }

    #[test]
    fn max_file_size_boundary() {
        let mut fs = fresh_fs(400, 16);
        let max = MAX_FILE_SIZE as usize;
        assert_eq!(max, (DIRECT_BLOCKS + INDIRECT_ENTRIES) * BLOCK_SIZE);

        let mut f = fs.create("big").unwrap();
        let err = fs.write(&mut f, &vec![1u8; max + 1]).unwrap_err();
        assert_eq!(err.written, 0);
        assert!(matches!(err.error, FileSystemError::ExceedsMaxFileSize));
        assert_eq!(f.len(), 0);
        assert_eq!(fs.stat().unwrap().data_used, 0);

        let data = pattern(max);
        assert_eq!(fs.write(&mut f, &data).unwrap(), max);
        assert_eq!(fs.file_length(&f), MAX_FILE_SIZE);

        let err = fs.write(&mut f, b"x").unwrap_err();
        assert_eq!(err.written, 0);
        assert!(matches!(err.error, FileSystemError::ExceedsMaxFileSize));

        fs.seek(&mut f, 0).unwrap();
        assert_eq!(read_all(&fs, &mut f, max), data);
    }

    #[test]
    fn seek_past_end_reads_zeros() {
        let mut fs = fresh_fs(100, 16);
        let mut f = fs.create("sparse").unwrap();
        fs.write(&mut f, b"head").unwrap();
        fs.seek(&mut f, 3000).unwrap();
        assert_eq!(f.len(), 3000);
        fs.write(&mut f, b"tail").unwrap();

        fs.seek(&mut f, 0).unwrap();
        let data = read_all(&fs, &mut f, 4000);
        assert_eq!(data.len(), 3004);
        assert_eq!(&data[..4], b"head");
        assert!(data[4..3000].iter().all(|&b| b == 0));
        assert_eq!(&data[3000..], b"tail");
        // blocks 1..5 are holes, only 0 and 5 are mapped
        assert_eq!(fs.stat().unwrap().data_used, 2);

        fs.seek(&mut f, MAX_FILE_SIZE).unwrap();
        assert!(matches!(
            fs.seek(&mut f, MAX_FILE_SIZE + 1),
            Err(FileSystemError::ExceedsMaxFileSize)
        ));
    }

    #[test]
    fn seek_extension_persists() {
        let mut fs = fresh_fs(100, 16);
        let mut f = fs.create("grow").unwrap();
        fs.seek(&mut f, 1234).unwrap();
        fs.close(&mut f).unwrap();
        let f = fs.open("grow", AccessMode::ReadOnly).unwrap();
        assert_eq!(fs.file_length(&f), 1234);
    }

    #[test]
    fn read_only_handle_rejects_writes() {
        let mut fs = fresh_fs(100, 16);
        let mut f = fs.create("ro").unwrap();
        fs.write(&mut f, b"abc").unwrap();
        fs.close(&mut f).unwrap();

        let mut f = fs.open("ro", AccessMode::ReadOnly).unwrap();
        let err = fs.write(&mut f, b"zzz").unwrap_err();
        assert_eq!(err.written, 0);
        assert!(matches!(err.error, FileSystemError::FileReadOnly));
        assert_eq!(read_all(&fs, &mut f, 10), b"abc");
    }

    #[test]
    fn seek_past_end_grows_read_only_files_too() {
        let mut fs = fresh_fs(100, 16);
        let mut f = fs.create("ro").unwrap();
        fs.write(&mut f, b"abc").unwrap();
        fs.close(&mut f).unwrap();

        let mut f = fs.open("ro", AccessMode::ReadOnly).unwrap();
        fs.seek(&mut f, 50).unwrap();
        assert_eq!(fs.file_length(&f), 50);
        fs.seek(&mut f, 0).unwrap();
        let data = read_all(&fs, &mut f, 100);
        assert_eq!(data.len(), 50);
        assert_eq!(&data[..3], b"abc");
        assert!(data[3..].iter().all(|&b| b == 0));
        // no blocks were allocated for the gap
        assert_eq!(fs.stat().unwrap().data_used, 1);

        fs.close(&mut f).unwrap();
        let f = fs.open("ro", AccessMode::ReadOnly).unwrap();
        assert_eq!(fs.file_length(&f), 50);
    }

    #[test]
    fn closed_handle_rejects_io() {
        let mut fs = fresh_fs(100, 16);
        let mut f = fs.create("gone").unwrap();
        fs.close(&mut f).unwrap();
        assert!(matches!(
            fs.read(&mut f, &mut [0u8; 4]),
            Err(FileSystemError::FileNotOpen)
        ));
        assert!(matches!(
            fs.write(&mut f, b"x").unwrap_err().error,
            FileSystemError::FileNotOpen
        ));
        assert!(matches!(fs.seek(&mut f, 0), Err(FileSystemError::FileNotOpen)));
    }

    #[test]
    fn running_out_of_blocks_returns_partial_count() {
        // 30 - 19 = 11 data blocks
        let mut fs = fresh_fs(30, 16);
        let mut f = fs.create("fill").unwrap();
        let data = pattern(12 * BLOCK_SIZE);
        let err = fs.write(&mut f, &data).unwrap_err();
        assert_eq!(err.written, 11 * BLOCK_SIZE);
        assert!(matches!(
            err.error,
            FileSystemError::OutOfSpace(Resource::DataBlocks)
        ));

        // the committed prefix is durable
        fs.close(&mut f).unwrap();
        let mut f = fs.open("fill", AccessMode::ReadOnly).unwrap();
        assert_eq!(f.len(), 11 * BLOCK_SIZE as u64);
        assert_eq!(read_all(&fs, &mut f, data.len()), &data[..11 * BLOCK_SIZE]);
    }

    #[test]
    fn io_failure_after_some_blocks_keeps_the_prefix() {
        let (disk, mut fs) = faulty_fs(100, 16);
        let mut f = fs.create("half").unwrap();
        let data = pattern(4 * BLOCK_SIZE);

        // the third data block cannot be zero-filled
        disk.fail_writes_of(fs.layout().data_start + 2);
        let err = fs.write(&mut f, &data).unwrap_err();
        assert_eq!(err.written, 2 * BLOCK_SIZE);
        assert!(matches!(err.error, FileSystemError::Io(_)));
        assert_eq!(f.len(), 2 * BLOCK_SIZE as u64);

        fs.close(&mut f).unwrap();
        let mut f = fs.open("half", AccessMode::ReadOnly).unwrap();
        assert_eq!(f.len(), 2 * BLOCK_SIZE as u64);
        assert_eq!(read_all(&fs, &mut f, data.len()), &data[..2 * BLOCK_SIZE]);
        assert_eq!(fs.bitmap.count_used(BitmapKind::Data).unwrap(), 2);
    }

    #[test]
    fn io_failure_mid_write_stops_the_loop() {
        let (disk, mut fs) = faulty_fs(100, 16);
        let mut f = fs.create("flaky").unwrap();
        fs.write(&mut f, &[7u8; BLOCK_SIZE]).unwrap();

        // the second data block will be fs.layout().data_start + 1
        disk.fail_writes_of(fs.layout().data_start + 1);
        let err = fs.write(&mut f, &[8u8; 2 * BLOCK_SIZE]).unwrap_err();
        assert_eq!(err.written, 0);
        assert!(matches!(err.error, FileSystemError::Io(_)));
        assert_eq!(f.len(), BLOCK_SIZE as u64);
        // the failed allocation was handed back
        assert_eq!(fs.bitmap.count_used(BitmapKind::Data).unwrap(), 1);
    }
}
