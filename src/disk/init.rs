use std::{path::PathBuf, sync::Arc};

use log::info;

use crate::{
    disk::file_disk::FileDisk,
    fs::{error::Result, FileSystem},
};

/// Where the volume lives and how to lay it out when it has to be created.
#[derive(Debug, Clone)]
pub struct VolumeOptions {
    pub path: PathBuf,
    pub blocks: u64,       // image size for a new disk
    pub max_files: usize,
    pub force_format: bool,
}

/// Milestones reported while bringing a volume up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootProgress {
    Step(&'static str),
    Formatting { done: u64, total: u64 },
}

/// Opens the disk image and mounts it, formatting first when the image is
/// new or `force_format` is set.
pub fn open_volume<F>(options: &VolumeOptions, mut report: F) -> Result<FileSystem>
where
    F: FnMut(BootProgress),
{
    report(BootProgress::Step("Initializing virtual disk..."));
    let disk_exists = options.path.exists();
    let disk = Arc::new(FileDisk::open(&options.path, options.blocks)?);

    if !disk_exists || options.force_format {
        // only a disk that is known to be new gets formatted implicitly
        report(BootProgress::Step("Formatting new file system..."));
        info!("formatting {}", options.path.display());
        return FileSystem::format_with_progress(disk, options.max_files, |done, total| {
            report(BootProgress::Formatting { done, total })
        });
    }

    report(BootProgress::Step("Mounting file system..."));
    FileSystem::mount(disk, options.max_files)
}
