use crate::*;
use crate::crypto::{DigestTag, DIGEST_TAG_SZ};

pub const INODE_SZ: usize = 32;
pub const DIRENT_SZ: usize = 32;
/// one directory record slot inside a directory block
pub const DIR_SZ: usize = BLK_SZ / DIR_PER_BLOCK;
const DIR_HDR_SZ: usize = 24;
pub const FILE_PASSWORD_SZ: usize = DIGEST_TAG_SZ;

/// directory number stored in unused records
pub const DIR_UNUSED: u32 = u32::MAX;

// slots 0 and 1 of every entry table
pub const DOT_SLOT: usize = 0;
pub const DOTDOT_SLOT: usize = 1;

pub fn get_u16(raw: &[u8], off: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&raw[off..off + 2]);
    u16::from_le_bytes(b)
}

pub fn put_u16(raw: &mut [u8], off: usize, v: u16) {
    raw[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

pub fn get_u32(raw: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&raw[off..off + 4]);
    u32::from_le_bytes(b)
}

pub fn put_u32(raw: &mut [u8], off: usize, v: u32) {
    raw[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

/// read a NUL terminated string, the whole buffer if no NUL is found
pub fn get_cstr(raw: &[u8]) -> FsResult<String> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8(raw[..end].to_vec()).map_err(|_| new_error!(FsError::InvalidData))
}

/// zero the buffer and copy `s` into it, always leaving a trailing NUL
pub fn put_cstr(raw: &mut [u8], s: &str) {
    raw.fill(0);
    let len = s.len().min(raw.len().saturating_sub(1));
    raw[..len].copy_from_slice(&s.as_bytes()[..len]);
}

/// Names are 1..=NAME_MAX bytes, without '/' or NUL; "." and ".." are reserved.
pub fn check_name(name: &str) -> FsResult<()> {
    if name.is_empty()
        || name.len() > NAME_MAX
        || name.contains(['/', '\0'])
        || name == "."
        || name == ".."
    {
        return Err(new_error!(FsError::InvalidFilename));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DInode {
    pub available: bool,
    /// file size in bytes
    pub size: u32,
    pub direct: [u32; POINTERS_PER_INODE],
    /// pointer to a block of POINTERS_PER_BLOCK further pointers, 0 if none
    pub indirect: u32,
}

impl DInode {
    pub fn new() -> Self {
        Self {
            available: true,
            ..Default::default()
        }
    }

    fn decode(raw: &[u8]) -> Self {
        let mut direct = [0u32; POINTERS_PER_INODE];
        for (i, p) in direct.iter_mut().enumerate() {
            *p = get_u32(raw, 8 + 4 * i);
        }
        Self {
            available: get_u32(raw, 0) != 0,
            size: get_u32(raw, 4),
            direct,
            indirect: get_u32(raw, 8 + 4 * POINTERS_PER_INODE),
        }
    }

    fn encode(&self, raw: &mut [u8]) {
        put_u32(raw, 0, self.available as u32);
        put_u32(raw, 4, self.size);
        for (i, p) in self.direct.iter().enumerate() {
            put_u32(raw, 8 + 4 * i, *p);
        }
        put_u32(raw, 8 + 4 * POINTERS_PER_INODE, self.indirect);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InodeBlock {
    pub inodes: [DInode; INODES_PER_BLOCK],
}

impl InodeBlock {
    pub fn decode(raw: &Block) -> Self {
        let mut inodes = [DInode::default(); INODES_PER_BLOCK];
        for (i, ind) in inodes.iter_mut().enumerate() {
            *ind = DInode::decode(&raw[i * INODE_SZ..(i + 1) * INODE_SZ]);
        }
        Self { inodes }
    }

    pub fn encode(&self) -> Block {
        let mut raw = [0u8; BLK_SZ];
        for (i, ind) in self.inodes.iter().enumerate() {
            ind.encode(&mut raw[i * INODE_SZ..(i + 1) * INODE_SZ]);
        }
        raw
    }

    pub fn nr_available(&self) -> usize {
        self.inodes.iter().filter(|i| i.available).count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerBlock {
    pub ptrs: [u32; POINTERS_PER_BLOCK],
}

impl PointerBlock {
    pub fn new() -> Self {
        Self { ptrs: [0; POINTERS_PER_BLOCK] }
    }

    pub fn decode(raw: &Block) -> Self {
        let mut ptrs = [0u32; POINTERS_PER_BLOCK];
        for (i, p) in ptrs.iter_mut().enumerate() {
            *p = get_u32(raw, 4 * i);
        }
        Self { ptrs }
    }

    pub fn encode(&self) -> Block {
        let mut raw = [0u8; BLK_SZ];
        for (i, p) in self.ptrs.iter().enumerate() {
            put_u32(&mut raw, 4 * i, *p);
        }
        raw
    }
}

impl Default for PointerBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DDirEntry {
    pub tp: FileType,
    pub available: bool,
    pub protected: bool,
    /// file inode number or directory record number, depending on `tp`
    pub inumber: u32,
    pub name: String,
    pub password: DigestTag,
}

impl DDirEntry {
    pub fn new(tp: FileType, inumber: u32, name: &str) -> Self {
        Self {
            tp,
            available: true,
            protected: false,
            inumber,
            name: name.to_string(),
            password: [0; FILE_PASSWORD_SZ],
        }
    }

    fn decode(raw: &[u8]) -> FsResult<Self> {
        let available = raw[1] != 0;
        if !available {
            return Ok(Self::default());
        }
        let mut password = [0u8; FILE_PASSWORD_SZ];
        password.copy_from_slice(&raw[24..24 + FILE_PASSWORD_SZ]);
        Ok(Self {
            tp: FileType::try_from(raw[0])?,
            available,
            protected: raw[2] != 0,
            inumber: get_u32(raw, 4),
            name: get_cstr(&raw[8..8 + NAME_SIZE])?,
            password,
        })
    }

    fn encode(&self, raw: &mut [u8]) {
        raw.fill(0);
        if !self.available {
            return;
        }
        raw[0] = self.tp.into();
        raw[1] = 1;
        raw[2] = self.protected as u8;
        put_u32(raw, 4, self.inumber);
        put_cstr(&mut raw[8..8 + NAME_SIZE], &self.name);
        raw[24..24 + FILE_PASSWORD_SZ].copy_from_slice(&self.password);
    }

    pub fn to_dir_entry(&self) -> DirEntry {
        DirEntry {
            inumber: self.inumber,
            name: self.name.clone(),
            tp: self.tp,
            protected: self.protected,
        }
    }
}

/// A directory record. `table` always holds exactly ENTRIES_PER_DIR slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DDirectory {
    pub available: bool,
    pub inumber: DirID,
    pub name: String,
    pub table: Vec<DDirEntry>,
}

impl DDirectory {
    pub fn unused() -> Self {
        Self {
            available: false,
            inumber: DIR_UNUSED,
            name: String::new(),
            table: vec![DDirEntry::default(); ENTRIES_PER_DIR],
        }
    }

    /// fresh directory with "." and ".." in place
    pub fn new(inumber: DirID, parent: DirID, name: &str) -> Self {
        let mut table = vec![DDirEntry::default(); ENTRIES_PER_DIR];
        table[DOT_SLOT] = DDirEntry::new(FileType::Dir, inumber, ".");
        table[DOTDOT_SLOT] = DDirEntry::new(FileType::Dir, parent, "..");
        Self {
            available: true,
            inumber,
            name: name.to_string(),
            table,
        }
    }

    pub fn parent(&self) -> DirID {
        self.table[DOTDOT_SLOT].inumber
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.table.iter().position(|e| e.available && e.name == name)
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.table.iter().skip(2).position(|e| !e.available).map(|i| i + 2)
    }

    pub fn add_entry(&mut self, entry: DDirEntry) -> FsResult<usize> {
        let slot = self.free_slot().ok_or_else(|| new_error!(FsError::DirectoryFull))?;
        self.table[slot] = entry;
        Ok(slot)
    }

    /// live entries other than "." and ".."
    pub fn children(&self) -> impl Iterator<Item = (usize, &DDirEntry)> {
        self.table.iter().enumerate().skip(2).filter(|(_, e)| e.available)
    }

    fn decode(raw: &[u8]) -> FsResult<Self> {
        if get_u16(raw, 0) == 0 {
            return Ok(Self::unused());
        }
        let table = raw[DIR_HDR_SZ..DIR_HDR_SZ + ENTRIES_PER_DIR * DIRENT_SZ]
            .chunks_exact(DIRENT_SZ)
            .map(DDirEntry::decode)
            .collect::<FsResult<Vec<_>>>()?;
        Ok(Self {
            available: true,
            inumber: get_u32(raw, 4),
            name: get_cstr(&raw[8..8 + NAME_SIZE])?,
            table,
        })
    }

    fn encode(&self, raw: &mut [u8]) {
        raw.fill(0);
        put_u16(raw, 0, self.available as u16);
        put_u32(raw, 4, self.inumber);
        put_cstr(&mut raw[8..8 + NAME_SIZE], &self.name);
        for (ent, chunk) in self.table.iter().zip(
            raw[DIR_HDR_SZ..DIR_HDR_SZ + ENTRIES_PER_DIR * DIRENT_SZ].chunks_exact_mut(DIRENT_SZ)
        ) {
            ent.encode(chunk);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirBlock {
    pub dirs: Vec<DDirectory>,
}

impl DirBlock {
    pub fn unused() -> Self {
        Self {
            dirs: vec![DDirectory::unused(); DIR_PER_BLOCK],
        }
    }

    pub fn decode(raw: &Block) -> FsResult<Self> {
        let dirs = raw
            .chunks_exact(DIR_SZ)
            .map(DDirectory::decode)
            .collect::<FsResult<Vec<_>>>()?;
        Ok(Self { dirs })
    }

    pub fn encode(&self) -> Block {
        let mut raw = [0u8; BLK_SZ];
        for (d, chunk) in self.dirs.iter().zip(raw.chunks_exact_mut(DIR_SZ)) {
            d.encode(chunk);
        }
        raw
    }

    pub fn nr_available(&self) -> usize {
        self.dirs.iter().filter(|d| d.available).count()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_sizes_fit() {
        assert_eq!(INODE_SZ * INODES_PER_BLOCK, BLK_SZ);
        assert_eq!(8 + 4 * POINTERS_PER_INODE + 4, INODE_SZ);
        assert!(DIR_HDR_SZ + ENTRIES_PER_DIR * DIRENT_SZ <= DIR_SZ);
        assert_eq!(MAX_FILE_SIZE, 68096);
    }

    #[test]
    fn inode_block_layout() {
        let mut ib = InodeBlock::default();
        ib.inodes[3] = DInode {
            available: true,
            size: 1000,
            direct: [7, 8, 0, 0, 0],
            indirect: 0,
        };
        let raw = ib.encode();
        // slot 3 starts at byte 96
        assert_eq!(get_u32(&raw, 96), 1);
        assert_eq!(get_u32(&raw, 100), 1000);
        assert_eq!(get_u32(&raw, 104), 7);
        assert_eq!(InodeBlock::decode(&raw), ib);
        assert_eq!(ib.nr_available(), 1);
    }

    #[test]
    fn directory_bootstrap() -> FsResult<()> {
        let mut db = DirBlock::unused();
        db.dirs[1] = DDirectory::new(1, 0, "docs");
        db.dirs[1].add_entry(DDirEntry::new(FileType::Reg, 4, "a.txt"))?;

        let raw = db.encode();
        // second record header
        assert_eq!(get_u16(&raw, DIR_SZ), 1);
        assert_eq!(get_u32(&raw, DIR_SZ + 4), 1);
        // first record is unused
        assert_eq!(get_u32(&raw, 4), DIR_UNUSED);

        let decoded = DirBlock::decode(&raw)?;
        assert_eq!(decoded, db);
        let d = &decoded.dirs[1];
        assert_eq!(d.lookup("."), Some(DOT_SLOT));
        assert_eq!(d.lookup(".."), Some(DOTDOT_SLOT));
        assert_eq!(d.parent(), 0);
        assert_eq!(d.lookup("a.txt"), Some(2));
        assert_eq!(d.children().count(), 1);
        assert_eq!(decoded.nr_available(), 1);
        Ok(())
    }

    #[test]
    fn entry_table_full() {
        let mut d = DDirectory::new(0, 0, "/");
        for i in 0..ENTRIES_PER_DIR - 2 {
            assert!(d.add_entry(DDirEntry::new(FileType::Reg, i as u32, &format!("f{}", i))).is_ok());
        }
        assert!(matches!(
            d.add_entry(DDirEntry::new(FileType::Reg, 9, "x")),
            Err(FsError::DirectoryFull)
        ));
    }

    #[test]
    fn bad_entry_type_is_rejected() {
        let mut raw = DirBlock::unused().encode();
        let ent = DIR_HDR_SZ;
        put_u16(&mut raw, 0, 1);
        raw[ent] = 7;
        raw[ent + 1] = 1;
        assert!(matches!(DirBlock::decode(&raw), Err(FsError::InvalidData)));
    }

    #[test]
    fn names() {
        assert!(check_name("a.txt").is_ok());
        assert!(check_name("fifteen_bytes__").is_ok());
        assert!(check_name("sixteen_bytes___").is_err());
        assert!(check_name("").is_err());
        assert!(check_name("a/b").is_err());
        assert!(check_name(".").is_err());
        assert!(check_name("..").is_err());
    }

    #[test]
    fn cstr_truncates() -> FsResult<()> {
        let mut buf = [0xffu8; 4];
        put_cstr(&mut buf, "abcdef");
        assert_eq!(buf, *b"abc\0");
        assert_eq!(get_cstr(&buf)?, "abc");
        Ok(())
    }
}
