use crate::*;

/// file inode number, `blockIndex * INODES_PER_BLOCK + slot`
pub type InodeID = u32;
/// directory record number, `dirBlockIndex * DIR_PER_BLOCK + slot`
pub type DirID = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FileType {
    #[default]
    Dir,
    Reg,
}

// on-disk entry type byte: 0 for directories, 1 for regular files
impl From<FileType> for u8 {
    fn from(tp: FileType) -> u8 {
        match tp {
            FileType::Dir => 0,
            FileType::Reg => 1,
        }
    }
}

impl TryFrom<u8> for FileType {
    type Error = FsError;

    fn try_from(value: u8) -> FsResult<Self> {
        match value {
            0 => Ok(FileType::Dir),
            1 => Ok(FileType::Reg),
            _ => Err(new_error!(FsError::InvalidData)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// file inode number or directory record number, depending on `tp`
    pub inumber: u32,
    pub name: String,
    pub tp: FileType,
    pub protected: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub inumber: InodeID,
    /// file size in bytes
    pub size: usize,
    /// data blocks plus the indirect block, if any
    pub blocks: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FsInfo {
    /// File system type
    pub magic: u32,
    /// File system block size
    pub bsize: usize,
    /// Total number of blocks on the volume
    pub blocks: usize,
    /// Free blocks in the data region
    pub bfree: usize,
    /// Total number of inodes
    pub files: usize,
    /// Free inodes
    pub ffree: usize,
    /// Total number of directory records
    pub dirs: usize,
    /// Free directory records
    pub dfree: usize,
    /// Maximum filename length
    pub namemax: usize,
    /// Whether the volume is password protected
    pub protected: bool,
}
