use crate::*;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub trait ROStorage: Send + Sync {
    fn read_blk_to(&self, pos: u64, to: &mut Block) -> FsResult<()>;

    fn read_blk(&self, pos: u64) -> FsResult<Block> {
        let mut blk: Block = [0u8; BLK_SZ];
        self.read_blk_to(pos, &mut blk)?;
        Ok(blk)
    }
}

pub trait RWStorage: ROStorage + Send + Sync {
    fn write_blk(&self, pos: u64, from: &Block) -> FsResult<()>;
    /// length in blocks
    fn get_len(&self) -> FsResult<u64>;
    fn set_len(&self, nr_blk: u64) -> FsResult<()>;
}

/// a disk image on the host file system
pub struct FileStorage {
    handle: File,
}

impl FileStorage {
    pub fn new(path: &Path) -> FsResult<Self> {
        let handle = io_try!(OpenOptions::new().read(true).write(true).open(path));
        Ok(Self { handle })
    }

    /// open or create the image and resize it to exactly `nr_blk` blocks
    pub fn create(path: &Path, nr_blk: u64) -> FsResult<Self> {
        let handle = io_try!(
            OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)
        );
        let storage = Self { handle };
        storage.set_len(nr_blk)?;
        Ok(storage)
    }
}

impl ROStorage for FileStorage {
    fn read_blk_to(&self, pos: u64, to: &mut Block) -> FsResult<()> {
        io_try!(self.handle.read_exact_at(to, blk2byte!(pos)));
        Ok(())
    }
}

impl RWStorage for FileStorage {
    fn write_blk(&self, pos: u64, from: &Block) -> FsResult<()> {
        io_try!(self.handle.write_all_at(from, blk2byte!(pos)));
        Ok(())
    }

    fn get_len(&self) -> FsResult<u64> {
        let len = io_try!(self.handle.metadata()).len();
        Ok(len / BLK_SZ as u64)
    }

    fn set_len(&self, nr_blk: u64) -> FsResult<()> {
        io_try!(self.handle.set_len(blk2byte!(nr_blk)));
        Ok(())
    }
}

/// volatile storage, mostly for tests
pub struct MemStorage {
    blks: Mutex<Vec<Block>>,
}

impl MemStorage {
    pub fn new(nr_blk: u64) -> Self {
        Self {
            blks: Mutex::new(vec![[0u8; BLK_SZ]; nr_blk as usize]),
        }
    }
}

impl ROStorage for MemStorage {
    fn read_blk_to(&self, pos: u64, to: &mut Block) -> FsResult<()> {
        let blks = mutex_lock!(self.blks);
        let blk = blks.get(pos as usize).ok_or_else(
            || new_error!(FsError::BlockOutOfRange(pos))
        )?;
        to.copy_from_slice(blk);
        Ok(())
    }
}

impl RWStorage for MemStorage {
    fn write_blk(&self, pos: u64, from: &Block) -> FsResult<()> {
        let mut blks = mutex_lock!(self.blks);
        let blk = blks.get_mut(pos as usize).ok_or_else(
            || new_error!(FsError::BlockOutOfRange(pos))
        )?;
        blk.copy_from_slice(from);
        Ok(())
    }

    fn get_len(&self) -> FsResult<u64> {
        Ok(mutex_lock!(self.blks).len() as u64)
    }

    fn set_len(&self, nr_blk: u64) -> FsResult<()> {
        mutex_lock!(self.blks).resize(nr_blk as usize, [0u8; BLK_SZ]);
        Ok(())
    }
}

/// A fixed-size block store with a mount reference count.
///
/// The block count is fixed when the volume is opened; every transfer is
/// bounds-checked against it before reaching the backend.
pub struct Volume {
    backend: Arc<dyn RWStorage>,
    blocks: u64,
    mounts: AtomicUsize,
}

impl Volume {
    pub fn new(backend: Arc<dyn RWStorage>) -> FsResult<Self> {
        let blocks = backend.get_len()?;
        Ok(Self {
            backend,
            blocks,
            mounts: AtomicUsize::new(0),
        })
    }

    /// open (or create) a disk image of `nr_blk` blocks
    pub fn open(path: &Path, nr_blk: u64) -> FsResult<Self> {
        let storage = FileStorage::create(path, nr_blk)?;
        info!("opened {} with {} blocks", path.display(), nr_blk);
        Self::new(Arc::new(storage))
    }

    pub fn in_memory(nr_blk: u64) -> Self {
        Self {
            backend: Arc::new(MemStorage::new(nr_blk)),
            blocks: nr_blk,
            mounts: AtomicUsize::new(0),
        }
    }

    pub fn size(&self) -> u64 {
        self.blocks
    }

    pub fn is_mounted(&self) -> bool {
        self.mounts.load(Ordering::SeqCst) > 0
    }

    pub fn mount(&self) {
        self.mounts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn unmount(&self) {
        let _ = self.mounts.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |m| m.checked_sub(1),
        );
    }

    fn check_pos(&self, pos: u64) -> FsResult<()> {
        if pos >= self.blocks {
            Err(new_error!(FsError::BlockOutOfRange(pos)))
        } else {
            Ok(())
        }
    }

    pub fn read_blk(&self, pos: u64) -> FsResult<Block> {
        self.check_pos(pos)?;
        self.backend.read_blk(pos)
    }

    pub fn read_blk_to(&self, pos: u64, to: &mut Block) -> FsResult<()> {
        self.check_pos(pos)?;
        self.backend.read_blk_to(pos, to)
    }

    pub fn write_blk(&self, pos: u64, from: &Block) -> FsResult<()> {
        self.check_pos(pos)?;
        self.backend.write_blk(pos, from)
    }
}
