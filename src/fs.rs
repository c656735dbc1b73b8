use crate::*;
use crate::bitmap::{BitMap, Counter};
use crate::crypto::digest_hex;
use crate::disk::*;
use crate::superblock::*;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

/// host transfer chunk
const XFER_CHUNK: usize = 8 * BLK_SZ;

/// Lay down an empty file system over the whole volume.
pub fn format(volume: &Volume) -> FsResult<()> {
    if volume.is_mounted() {
        return Err(new_error!(FsError::AlreadyMounted));
    }
    let blocks = u32::try_from(volume.size()).map_err(|_| new_error!(FsError::InvalidParameter))?;
    let sb = SuperBlock::new(blocks)?;
    let layout = sb.layout;

    info!(
        "format: {} blocks, {} inode blocks ({} inodes), {} dir blocks",
        layout.blocks, layout.inode_blocks, layout.inodes, layout.dir_blocks,
    );

    volume.write_blk(SUPERBLOCK_POS, &sb.encode())?;

    let empty_inodes = InodeBlock::default().encode();
    for idx in 0..layout.inode_blocks {
        volume.write_blk(layout.inode_blk_pos(idx), &empty_inodes)?;
    }

    let zero = [0u8; BLK_SZ];
    for pos in layout.data_start()..layout.data_end() {
        volume.write_blk(pos, &zero)?;
    }

    let mut dblk = DirBlock::unused();
    let empty_dirs = dblk.encode();
    for idx in 1..layout.dir_blocks {
        volume.write_blk(layout.dir_blk_pos(idx), &empty_dirs)?;
    }
    dblk.dirs[0] = DDirectory::new(ROOT_DIR_ID, ROOT_DIR_ID, "/");
    volume.write_blk(layout.dir_blk_pos(0), &dblk.encode())?;

    Ok(())
}

/// A mounted session. Owns every derived cache; dropping it releases the
/// volume's mount reference.
pub struct MountedFs {
    pub(crate) volume: Arc<Volume>,
    pub(crate) sb: SuperBlock,
    pub(crate) bitmap: BitMap,
    /// live inodes per inode block
    pub(crate) icnt: Counter,
    /// live directory records per directory block
    pub(crate) dcnt: Counter,
    pub(crate) cwd: DDirectory,
}

impl MountedFs {
    fn read_superblock(volume: &Volume) -> FsResult<SuperBlock> {
        let sb = SuperBlock::decode(&volume.read_blk(SUPERBLOCK_POS)?)?;
        if sb.layout.blocks as u64 > volume.size() {
            return Err(new_error!(FsError::SuperBlockCheckFailed));
        }
        Ok(sb)
    }

    /// whether mounting `volume` needs a passphrase
    pub fn is_protected(volume: &Volume) -> FsResult<bool> {
        Ok(Self::read_superblock(volume)?.protected)
    }

    pub fn mount(volume: Arc<Volume>, password: Option<&str>) -> FsResult<Self> {
        if volume.is_mounted() {
            return Err(new_error!(FsError::AlreadyMounted));
        }

        let sb = Self::read_superblock(&volume)?;
        if sb.protected {
            let pass = password.ok_or_else(|| new_error!(FsError::PermissionDenied))?;
            if digest_hex(pass) != sb.password {
                return Err(new_error!(FsError::WrongPassword));
            }
        }

        let layout = sb.layout;
        let mut bitmap = BitMap::new(
            layout.blocks as u64,
            layout.data_start()..layout.data_end(),
        );

        let mut icnt = Counter::new(layout.inode_blocks as usize, INODES_PER_BLOCK);
        for idx in 0..layout.inode_blocks {
            let pos = layout.inode_blk_pos(idx);
            let iblk = InodeBlock::decode(&volume.read_blk(pos)?);
            for ind in iblk.inodes.iter().filter(|i| i.available) {
                bitmap.set_used(pos)?;
                icnt.inc(idx as usize);
                for p in ind.direct.iter().filter(|p| **p != 0) {
                    bitmap.set_used(*p as u64)?;
                }
                if ind.indirect != 0 {
                    bitmap.set_used(ind.indirect as u64)?;
                    let pb = PointerBlock::decode(&volume.read_blk(ind.indirect as u64)?);
                    for p in pb.ptrs.iter().filter(|p| **p != 0) {
                        bitmap.set_used(*p as u64)?;
                    }
                }
            }
        }

        let mut dcnt = Counter::new(layout.dir_blocks as usize, DIR_PER_BLOCK);
        let mut root = None;
        for idx in 0..layout.dir_blocks {
            let dblk = DirBlock::decode(&volume.read_blk(layout.dir_blk_pos(idx))?)?;
            dcnt.set(idx as usize, dblk.nr_available() as u32);
            if idx == 0 {
                root = dblk.dirs.into_iter().next().filter(|d| d.available);
            }
        }
        let cwd = root.ok_or_else(|| new_error!(FsError::SuperBlockCheckFailed))?;

        volume.mount();
        info!(
            "mounted: {} blocks, {} used, {} live inodes",
            layout.blocks, bitmap.nr_used(), icnt.total(),
        );

        Ok(Self {
            volume,
            sb,
            bitmap,
            icnt,
            dcnt,
            cwd,
        })
    }

    pub fn unmount(self) {
        info!("unmounting");
        drop(self);
    }

    pub fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    pub fn finfo(&self) -> FsInfo {
        let layout = &self.sb.layout;
        FsInfo {
            magic: self.sb.magic,
            bsize: BLK_SZ,
            blocks: layout.blocks as usize,
            bfree: self.bitmap.nr_free(),
            files: layout.inodes as usize,
            ffree: self.icnt.capacity() - self.icnt.total(),
            dirs: self.dcnt.capacity(),
            dfree: self.dcnt.capacity() - self.dcnt.total(),
            namemax: NAME_MAX,
            protected: self.sb.protected,
        }
    }

    /// Copy a host file into `name` in the current directory, creating it
    /// if absent. Returns the bytes written, which may be short when the
    /// volume fills up.
    pub fn import(&mut self, host_path: &Path, name: &str, password: Option<&str>) -> FsResult<usize> {
        let mut host = io_try!(File::open(host_path));
        let host_len = io_try!(host.metadata()).len();
        if host_len > MAX_FILE_SIZE as u64 {
            return Err(new_error!(FsError::FileTooLarge));
        }

        let inumber = match self.lookup(name) {
            Some(ent) if ent.tp == FileType::Dir => {
                return Err(new_error!(FsError::IsADirectory));
            }
            Some(ent) => {
                self.check_file_access(name, password)?;
                ent.inumber
            }
            None => self.touch(name)?,
        };

        let mut buf = vec![0u8; XFER_CHUNK];
        let mut off = 0;
        loop {
            let n = io_try!(host.read(&mut buf));
            if n == 0 {
                break;
            }
            let written = self.write_data(inumber, off, &buf[..n])?;
            off += written;
            if written < n {
                warn!("import {}: volume full after {} bytes", name, off);
                break;
            }
        }

        if off == 0 && host_len > 0 {
            return Err(new_error!(FsError::StorageFull));
        }
        info!("imported {} bytes from {} to {}", off, host_path.display(), name);
        Ok(off)
    }

    /// Copy `name` in the current directory out to a new host file.
    pub fn outport(&self, name: &str, host_path: &Path, password: Option<&str>) -> FsResult<usize> {
        let ent = self.lookup(name).ok_or_else(|| new_error!(FsError::NotFound))?;
        if ent.tp == FileType::Dir {
            return Err(new_error!(FsError::IsADirectory));
        }
        self.check_file_access(name, password)?;

        let mut host = io_try!(File::create(host_path));
        let mut buf = vec![0u8; XFER_CHUNK];
        let mut off = 0;
        loop {
            let n = self.read_data(ent.inumber, off, &mut buf)?;
            if n == 0 {
                break;
            }
            io_try!(host.write_all(&buf[..n]));
            off += n;
        }
        info!("outported {} bytes from {} to {}", off, name, host_path.display());
        Ok(off)
    }
}

impl Drop for MountedFs {
    fn drop(&mut self) {
        self.volume.unmount();
        debug!("mount reference released");
    }
}

#[cfg(test)]
pub(crate) fn mkfs_in_memory(blocks: u64) -> FsResult<MountedFs> {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
    let volume = Arc::new(Volume::in_memory(blocks));
    format(&volume)?;
    MountedFs::mount(volume, None)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::RngCore;

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tinyfs-{}-{}", tag, std::process::id()))
    }

    #[test]
    fn import_outport_20_blocks() -> FsResult<()> {
        let mut fs = mkfs_in_memory(20)?;
        fs.mkdir("docs")?;
        fs.cd("docs")?;
        fs.touch("a.txt")?;

        let mut data = vec![0u8; 1000];
        rand::thread_rng().fill_bytes(&mut data);
        let host_in = temp_path("e2e-in");
        let host_out = temp_path("e2e-out");
        io_try!(std::fs::write(&host_in, &data));

        assert_eq!(fs.import(&host_in, "a.txt", None)?, 1000);
        assert_eq!(fs.stat_file("a.txt")?.size, 1000);
        assert_eq!(fs.outport("a.txt", &host_out, None)?, 1000);
        assert_eq!(io_try!(std::fs::read(&host_out)), data);

        io_try!(std::fs::remove_file(&host_in));
        io_try!(std::fs::remove_file(&host_out));
        Ok(())
    }

    #[test]
    fn import_creates_missing_file() -> FsResult<()> {
        let mut fs = mkfs_in_memory(50)?;
        let host_in = temp_path("create-in");
        io_try!(std::fs::write(&host_in, b"hello tinyfs"));

        assert_eq!(fs.import(&host_in, "new", None)?, 12);
        let ent = fs.lookup("new").ok_or(FsError::NotFound)?;
        assert_eq!(ent.tp, FileType::Reg);

        fs.mkdir("sub")?;
        assert!(matches!(fs.import(&host_in, "sub", None), Err(FsError::IsADirectory)));
        assert!(matches!(
            fs.import(&temp_path("missing"), "x", None),
            Err(FsError::IOError(_))
        ));
        assert!(fs.lookup("x").is_none());

        io_try!(std::fs::remove_file(&host_in));
        Ok(())
    }

    #[test]
    fn remount_rebuilds_same_state() -> FsResult<()> {
        let mut fs = mkfs_in_memory(60)?;
        let mut data = vec![0u8; DIRECT_BYTES + 3 * BLK_SZ + 17];
        rand::thread_rng().fill_bytes(&mut data);
        let ino = fs.touch("big")?;
        fs.write_data(ino, 0, &data)?;
        fs.mkdir("d")?;
        fs.touch("small")?;

        let used: Vec<bool> = (0..60).map(|p| fs.bitmap.is_used(p)).collect();
        let info = fs.finfo();
        let cwd = fs.cwd.clone();
        let volume = fs.volume().clone();
        fs.unmount();
        assert!(!volume.is_mounted());

        let fs = MountedFs::mount(volume, None)?;
        assert_eq!((0..60).map(|p| fs.bitmap.is_used(p)).collect::<Vec<_>>(), used);
        assert_eq!(fs.finfo(), info);
        assert_eq!(fs.cwd, cwd);

        let mut back = vec![0u8; data.len()];
        assert_eq!(fs.read_data(ino, 0, &mut back)?, data.len());
        assert_eq!(back, data);
        Ok(())
    }

    #[test]
    fn corrupt_pointer_fails_mount() -> FsResult<()> {
        let mut fs = mkfs_in_memory(20)?;
        let ino = fs.touch("f")?;
        fs.write_data(ino, 0, b"abc")?;
        let volume = fs.volume().clone();
        let layout = fs.sb.layout;
        drop(fs);

        let pos = layout.inode_blk_pos(0);
        let mut iblk = InodeBlock::decode(&volume.read_blk(pos)?);
        iblk.inodes[ino as usize].direct[1] = 20;
        volume.write_blk(pos, &iblk.encode())?;

        assert!(matches!(
            MountedFs::mount(volume.clone(), None),
            Err(FsError::CorruptPointer(20))
        ));
        assert!(!volume.is_mounted());
        Ok(())
    }

    #[test]
    fn mount_guards() -> FsResult<()> {
        let fs = mkfs_in_memory(20)?;
        let volume = fs.volume().clone();
        assert!(volume.is_mounted());
        assert!(matches!(format(&volume), Err(FsError::AlreadyMounted)));
        assert!(matches!(
            MountedFs::mount(volume.clone(), None),
            Err(FsError::AlreadyMounted)
        ));
        drop(fs);
        assert!(!volume.is_mounted());

        // unformatted
        let blank = Arc::new(Volume::in_memory(20));
        assert!(matches!(
            MountedFs::mount(blank.clone(), None),
            Err(FsError::SuperBlockCheckFailed)
        ));
        assert!(!blank.is_mounted());

        // superblock claims more blocks than the store holds
        let short = Arc::new(Volume::in_memory(30));
        short.write_blk(SUPERBLOCK_POS, &SuperBlock::new(40)?.encode())?;
        assert!(matches!(
            MountedFs::mount(short, None),
            Err(FsError::SuperBlockCheckFailed)
        ));

        // no root record
        let noroot = Arc::new(Volume::in_memory(20));
        format(&noroot)?;
        noroot.write_blk(19, &DirBlock::unused().encode())?;
        assert!(matches!(
            MountedFs::mount(noroot.clone(), None),
            Err(FsError::SuperBlockCheckFailed)
        ));
        assert!(!noroot.is_mounted());
        Ok(())
    }

    #[test]
    fn format_rejects_tiny_volume() -> FsResult<()> {
        assert!(matches!(
            format(&Volume::in_memory(2)),
            Err(FsError::InvalidParameter)
        ));
        let vol = Volume::in_memory(3);
        format(&vol)?;
        Ok(())
    }

    #[test]
    fn fresh_volume_info() -> FsResult<()> {
        let fs = mkfs_in_memory(101)?;
        let info = fs.finfo();
        assert_eq!(info.magic, MAGIC);
        assert_eq!(info.blocks, 101);
        assert_eq!(info.bfree, 101 - 1 - 11 - 2);
        assert_eq!((info.files, info.ffree), (176, 176));
        assert_eq!((info.dirs, info.dfree), (4, 3));
        assert_eq!(info.namemax, 15);
        assert!(!info.protected);
        assert_eq!(fs.cwd_name(), "/");
        assert_eq!(fs.cwd_id(), ROOT_DIR_ID);
        Ok(())
    }
}
