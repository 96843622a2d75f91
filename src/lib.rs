//! A flat, fixed-capacity file system over a block device.
//!
//! The volume is a run of 512-byte blocks: two allocation bitmaps, an inode
//! table, a directory with one entry per block, then the data region. Files
//! are addressed through 13 direct pointers and one indirect block.

pub mod disk;
pub mod fs;

pub use disk::{BlockDevice, FileDisk, MemDisk};
pub use fs::{
    error::{FileSystemError, Resource, Result},
    file::{AccessMode, FileHandle, HandleState, ShortWrite},
    FileSystem, VolumeStats,
};
