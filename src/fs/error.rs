use std::fmt;

/// Which namespace ran out of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Inodes,
    DataBlocks,
    DirectorySlots,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inodes => write!(f, "no free inode"),
            Self::DataBlocks => write!(f, "no free data block"),
            Self::DirectorySlots => write!(f, "directory is full"),
        }
    }
}

/// File system error type
#[derive(Debug)]
pub enum FileSystemError {
    Io(std::io::Error),        // underlying block read/write failed
    OutOfSpace(Resource),      // no free inode, data block or directory slot
    FileNotOpen,               // handle was already closed
    FileAlreadyOpen(String),   // entry's open flag is set
    FileNotFound(String),      // no allocated entry with that name
    FileReadOnly,              // write through a read-only handle
    FileAlreadyExists(String), // create over an existing name
    ExceedsMaxFileSize,        // write or seek past the addressable size
    IllegalFilename(String),   // empty, too long, or contains NUL or '/'
    InvalidLayout(String),     // volume configuration cannot be laid out
}

impl FileSystemError {
    pub fn is_out_of_space(&self) -> bool {
        matches!(self, Self::OutOfSpace(_))
    }
}

impl From<std::io::Error> for FileSystemError {
    fn from(e: std::io::Error) -> Self {
        FileSystemError::Io(e)
    }
}

impl From<bincode::Error> for FileSystemError {
    fn from(e: bincode::Error) -> Self {
        FileSystemError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Error doing IO: {}", e),
            Self::OutOfSpace(what) => write!(f, "Out of space: {}", what),
            Self::FileNotOpen => write!(f, "File not open"),
            Self::FileAlreadyOpen(name) => write!(f, "File is already open: {}", name),
            Self::FileNotFound(name) => write!(f, "File not found: {}", name),
            Self::FileReadOnly => write!(f, "File is set to read only"),
            Self::FileAlreadyExists(name) => write!(f, "File already exists: {}", name),
            Self::ExceedsMaxFileSize => write!(f, "File exceeds max size"),
            Self::IllegalFilename(name) => write!(f, "Illegal filename: {:?}", name),
            Self::InvalidLayout(desc) => write!(f, "Invalid volume layout: {}", desc),
        }
    }
}

impl std::error::Error for FileSystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FileSystemError>;
