use crate::*;
use crate::crypto::DIGEST_HEX_LEN;
use crate::disk::*;

pub const SUPERBLOCK_POS: u64 = 0;
/// password digest buffer in the superblock, NUL terminated
pub const SB_PASSWORD_SZ: usize = 257;

const SB_MAGIC_OFF: usize = 0;
const SB_BLOCKS_OFF: usize = 4;
const SB_IBLOCKS_OFF: usize = 8;
const SB_INODES_OFF: usize = 12;
const SB_DBLOCKS_OFF: usize = 16;
const SB_PROTECT_OFF: usize = 20;
const SB_PASSWORD_OFF: usize = 24;

/// Region boundaries of a volume, all derived from its block count.
///
/// ```text
/// | 0: superblock | 1..=inode_blocks | data ... | dir blocks (addressed from the end) |
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub blocks: u32,
    pub inode_blocks: u32,
    pub inodes: u32,
    pub dir_blocks: u32,
}

impl Layout {
    /// None when the inode count does not fit in 32 bits
    pub fn derive(blocks: u32) -> Option<Self> {
        let inode_blocks = blocks.div_ceil(10);
        Some(Self {
            blocks,
            inode_blocks,
            inodes: inode_blocks.checked_mul(INODES_PER_BLOCK as u32)?,
            dir_blocks: blocks.div_ceil(100),
        })
    }

    /// inode, data and directory regions are disjoint
    pub fn is_valid(&self) -> bool {
        1 + self.inode_blocks + self.dir_blocks <= self.blocks
    }

    /// first data block
    pub fn data_start(&self) -> u64 {
        self.inode_blocks as u64 + 1
    }

    /// one past the last data block
    pub fn data_end(&self) -> u64 {
        (self.blocks as u64).saturating_sub(self.dir_blocks as u64)
    }

    pub fn nr_data_blocks(&self) -> u64 {
        self.data_end().saturating_sub(self.data_start())
    }

    /// volume position of the `idx`-th inode block (0-based)
    pub fn inode_blk_pos(&self, idx: u32) -> u64 {
        idx as u64 + 1
    }

    /// volume position of the `idx`-th directory block (0-based, from the end)
    pub fn dir_blk_pos(&self, idx: u32) -> u64 {
        self.blocks as u64 - 1 - idx as u64
    }

    pub fn nr_dirs(&self) -> u32 {
        self.dir_blocks * DIR_PER_BLOCK as u32
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u32,
    pub layout: Layout,
    pub protected: bool,
    /// lowercase hex digest of the volume passphrase, empty when unset
    pub password: String,
}

impl SuperBlock {
    pub fn new(blocks: u32) -> FsResult<Self> {
        let layout = Layout::derive(blocks)
            .filter(Layout::is_valid)
            .ok_or_else(|| new_error!(FsError::InvalidParameter))?;
        Ok(Self {
            magic: MAGIC,
            layout,
            protected: false,
            password: String::new(),
        })
    }

    /// Decode block 0 and check it against the layout recomputed from its
    /// block count.
    pub fn decode(raw: &Block) -> FsResult<Self> {
        let magic = get_u32(raw, SB_MAGIC_OFF);
        let layout = Layout {
            blocks: get_u32(raw, SB_BLOCKS_OFF),
            inode_blocks: get_u32(raw, SB_IBLOCKS_OFF),
            inodes: get_u32(raw, SB_INODES_OFF),
            dir_blocks: get_u32(raw, SB_DBLOCKS_OFF),
        };

        // check constants
        if magic != MAGIC
            || Layout::derive(layout.blocks) != Some(layout)
            || !layout.is_valid()
        {
            return Err(new_error!(FsError::SuperBlockCheckFailed));
        }

        let protected = get_u32(raw, SB_PROTECT_OFF) != 0;
        let password = get_cstr(&raw[SB_PASSWORD_OFF..SB_PASSWORD_OFF + SB_PASSWORD_SZ])
            .map_err(|_| new_error!(FsError::SuperBlockCheckFailed))?;
        // a protected volume carries a full hex digest
        if protected && password.len() != DIGEST_HEX_LEN {
            return Err(new_error!(FsError::SuperBlockCheckFailed));
        }

        Ok(Self {
            magic,
            layout,
            protected,
            password,
        })
    }

    pub fn encode(&self) -> Block {
        let mut raw = [0u8; BLK_SZ];
        put_u32(&mut raw, SB_MAGIC_OFF, self.magic);
        put_u32(&mut raw, SB_BLOCKS_OFF, self.layout.blocks);
        put_u32(&mut raw, SB_IBLOCKS_OFF, self.layout.inode_blocks);
        put_u32(&mut raw, SB_INODES_OFF, self.layout.inodes);
        put_u32(&mut raw, SB_DBLOCKS_OFF, self.layout.dir_blocks);
        put_u32(&mut raw, SB_PROTECT_OFF, self.protected as u32);
        put_cstr(
            &mut raw[SB_PASSWORD_OFF..SB_PASSWORD_OFF + SB_PASSWORD_SZ],
            &self.password,
        );
        raw
    }
}
