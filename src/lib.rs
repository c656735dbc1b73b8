pub mod vfs;
pub mod fs;
pub mod shell;
pub mod storage;
pub mod superblock;
pub mod disk;
pub mod bitmap;
pub mod inode;
pub mod dir;
pub mod password;
pub(crate) mod crypto;
pub mod error;
pub use error::*;
pub use fs::{format, MountedFs};
pub use storage::{FileStorage, MemStorage, ROStorage, RWStorage, Volume};
pub use vfs::*;
pub use log::{warn, info, debug};


pub const BLK_SZ: usize = 512;
pub type Block = [u8; BLK_SZ];

pub const MAGIC: u32 = 0xf0f03410;

/// inode records packed into one inode block
pub const INODES_PER_BLOCK: usize = 16;
/// direct block pointers held by an inode
pub const POINTERS_PER_INODE: usize = 5;
/// block pointers held by an indirect block
pub const POINTERS_PER_BLOCK: usize = BLK_SZ / 4;

/// bytes addressable through the direct pointers alone
pub const DIRECT_BYTES: usize = POINTERS_PER_INODE * BLK_SZ;
pub const MAX_FILE_SIZE: usize = (POINTERS_PER_INODE + POINTERS_PER_BLOCK) * BLK_SZ;

/// name buffer, including the terminating NUL
pub const NAME_SIZE: usize = 16;
pub const NAME_MAX: usize = NAME_SIZE - 1;
pub const ENTRIES_PER_DIR: usize = 7;
pub const DIR_PER_BLOCK: usize = 2;

pub const ROOT_DIR_ID: DirID = 0;

#[macro_export]
macro_rules! blk2byte {
    ($e: expr) => {
        ($crate::BLK_SZ as u64 * $e as u64)
    };
}
