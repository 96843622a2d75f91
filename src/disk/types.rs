/// Size of one block on the volume: 512 bytes.
/// The block store only moves whole blocks of this size.
pub const BLOCK_SIZE: usize = 512;

/// Default number of blocks in a freshly created disk image.
pub const DEFAULT_BLOCK_COUNT: u64 = 5000;

/// One block's worth of bytes. Every disk read and write moves exactly one `Block`.
pub type Block = [u8; BLOCK_SIZE];

/// A zeroed block.
pub const ZERO_BLOCK: Block = [0; BLOCK_SIZE];
