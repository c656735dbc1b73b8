use crate::*;
use crate::disk::*;
use crate::fs::MountedFs;

/// Where the `idx`-th block of a file is referenced from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlockAddr {
    Direct(usize),
    Indirect(usize),
}

impl BlockAddr {
    fn of(blk_idx: usize) -> Option<Self> {
        if blk_idx < POINTERS_PER_INODE {
            Some(Self::Direct(blk_idx))
        } else if blk_idx < POINTERS_PER_INODE + POINTERS_PER_BLOCK {
            Some(Self::Indirect(blk_idx - POINTERS_PER_INODE))
        } else {
            None
        }
    }
}

impl MountedFs {
    /// (volume position of the inode block, slot in it)
    fn inode_pos(&self, inumber: InodeID) -> FsResult<(u64, usize)> {
        if inumber >= self.sb.layout.inodes {
            return Err(new_error!(FsError::InvalidParameter));
        }
        let idx = inumber / INODES_PER_BLOCK as u32;
        Ok((
            self.sb.layout.inode_blk_pos(idx),
            inumber as usize % INODES_PER_BLOCK,
        ))
    }

    pub fn create_inode(&mut self) -> FsResult<InodeID> {
        let candidates: Vec<usize> = self.icnt.not_full().collect();
        for idx in candidates {
            let pos = self.sb.layout.inode_blk_pos(idx as u32);
            let mut iblk = InodeBlock::decode(&self.volume.read_blk(pos)?);
            let Some(slot) = iblk.inodes.iter().position(|i| !i.available) else {
                warn!("inode block {} counted as not full but has no free slot", idx);
                continue;
            };
            iblk.inodes[slot] = DInode::new();
            self.volume.write_blk(pos, &iblk.encode())?;
            self.bitmap.set_used(pos)?;
            self.icnt.inc(idx);

            let inumber = (idx * INODES_PER_BLOCK + slot) as InodeID;
            debug!("create inode {}", inumber);
            return Ok(inumber);
        }
        Err(new_error!(FsError::NoFreeInode))
    }

    pub fn load_inode(&self, inumber: InodeID) -> FsResult<DInode> {
        let (pos, slot) = self.inode_pos(inumber)?;
        let ind = InodeBlock::decode(&self.volume.read_blk(pos)?).inodes[slot];
        if !ind.available {
            return Err(new_error!(FsError::NotFound));
        }
        Ok(ind)
    }

    /// Take a specific free slot, with the same bookkeeping as `create_inode`.
    fn claim_inode(&mut self, inumber: InodeID) -> FsResult<DInode> {
        let (pos, _) = self.inode_pos(inumber)?;
        let ind = DInode::new();
        self.store_inode(inumber, &ind)?;
        self.bitmap.set_used(pos)?;
        self.icnt.inc(inumber as usize / INODES_PER_BLOCK);
        debug!("claim inode {} on write", inumber);
        Ok(ind)
    }

    pub(crate) fn store_inode(&self, inumber: InodeID, ind: &DInode) -> FsResult<()> {
        let (pos, slot) = self.inode_pos(inumber)?;
        let mut iblk = InodeBlock::decode(&self.volume.read_blk(pos)?);
        iblk.inodes[slot] = *ind;
        self.volume.write_blk(pos, &iblk.encode())
    }

    /// Free every block the inode references, then clear its record.
    pub fn remove_inode(&mut self, inumber: InodeID) -> FsResult<()> {
        let ind = self.load_inode(inumber)?;

        for p in ind.direct.iter().filter(|p| **p != 0) {
            self.bitmap.free(*p as u64);
        }
        if ind.indirect != 0 {
            let pb = PointerBlock::decode(&self.volume.read_blk(ind.indirect as u64)?);
            for p in pb.ptrs.iter().filter(|p| **p != 0) {
                self.bitmap.free(*p as u64);
            }
            self.bitmap.free(ind.indirect as u64);
        }

        self.store_inode(inumber, &DInode::default())?;

        let (pos, _) = self.inode_pos(inumber)?;
        let idx = inumber as usize / INODES_PER_BLOCK;
        if self.icnt.dec(idx) == 0 {
            self.bitmap.free(pos);
        }
        debug!("remove inode {}", inumber);
        Ok(())
    }

    pub fn stat(&self, inumber: InodeID) -> FsResult<Metadata> {
        let ind = self.load_inode(inumber)?;
        let mut blocks = ind.direct.iter().filter(|p| **p != 0).count();
        if ind.indirect != 0 {
            let pb = PointerBlock::decode(&self.volume.read_blk(ind.indirect as u64)?);
            blocks += 1 + pb.ptrs.iter().filter(|p| **p != 0).count();
        }
        Ok(Metadata {
            inumber,
            size: ind.size as usize,
            blocks,
        })
    }

    /// Read up to `to.len()` bytes from `offset`, stopping at end of file.
    pub fn read_data(&self, inumber: InodeID, offset: usize, to: &mut [u8]) -> FsResult<usize> {
        let ind = self.load_inode(inumber)?;
        let size = ind.size as usize;
        if offset >= size {
            return Ok(0);
        }
        let len = to.len().min(size - offset);

        let pb = if ind.indirect != 0 && offset + len > DIRECT_BYTES {
            Some(PointerBlock::decode(&self.volume.read_blk(ind.indirect as u64)?))
        } else {
            None
        };

        let mut done = 0;
        while done < len {
            let cur = offset + done;
            let blk_off = cur % BLK_SZ;
            let ptr = match BlockAddr::of(cur / BLK_SZ) {
                Some(BlockAddr::Direct(i)) => ind.direct[i],
                Some(BlockAddr::Indirect(i)) => pb.as_ref().map_or(0, |pb| pb.ptrs[i]),
                None => 0,
            };
            // hole, treated as end of data
            if ptr == 0 {
                break;
            }

            let blk = self.volume.read_blk(ptr as u64)?;
            let n = (BLK_SZ - blk_off).min(len - done);
            to[done..done + n].copy_from_slice(&blk[blk_off..blk_off + n]);
            done += n;
        }
        Ok(done)
    }

    /// Write `from` at `offset`, allocating blocks as they are touched.
    ///
    /// A free inumber is brought into use first. Returns fewer bytes than
    /// requested when the volume runs out of blocks; the inode then covers
    /// exactly what was written.
    pub fn write_data(&mut self, inumber: InodeID, offset: usize, from: &[u8]) -> FsResult<usize> {
        let end = offset
            .checked_add(from.len())
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or_else(|| new_error!(FsError::FileTooLarge))?;
        let mut ind = match self.load_inode(inumber) {
            Ok(ind) => ind,
            Err(FsError::NotFound) => self.claim_inode(inumber)?,
            Err(e) => return Err(e),
        };
        if from.is_empty() {
            return Ok(0);
        }

        let mut pb = if ind.indirect != 0 && end > DIRECT_BYTES {
            PointerBlock::decode(&self.volume.read_blk(ind.indirect as u64)?)
        } else {
            PointerBlock::new()
        };
        let mut pb_dirty = false;
        let mut full = false;

        let mut done = 0;
        while done < from.len() {
            let cur = offset + done;
            let blk_off = cur % BLK_SZ;
            let Some(addr) = BlockAddr::of(cur / BLK_SZ) else {
                return Err(new_error!(FsError::FileTooLarge));
            };

            let slot = match addr {
                BlockAddr::Direct(i) => &mut ind.direct[i],
                BlockAddr::Indirect(i) => {
                    if ind.indirect == 0 {
                        let Some(p) = self.bitmap.alloc() else {
                            full = true;
                            break;
                        };
                        ind.indirect = p as u32;
                        pb = PointerBlock::new();
                    }
                    pb_dirty = true;
                    &mut pb.ptrs[i]
                }
            };

            let fresh = *slot == 0;
            if fresh {
                let Some(p) = self.bitmap.alloc() else {
                    full = true;
                    break;
                };
                *slot = p as u32;
            }
            let ptr = *slot as u64;

            let n = (BLK_SZ - blk_off).min(from.len() - done);
            let mut blk = if fresh || n == BLK_SZ {
                [0u8; BLK_SZ]
            } else {
                self.volume.read_blk(ptr)?
            };
            blk[blk_off..blk_off + n].copy_from_slice(&from[done..done + n]);
            self.volume.write_blk(ptr, &blk)?;
            done += n;
        }

        if pb_dirty {
            self.volume.write_blk(ind.indirect as u64, &pb.encode())?;
        }
        if done > 0 {
            ind.size = ind.size.max((offset + done) as u32);
        }
        self.store_inode(inumber, &ind)?;

        if full {
            warn!(
                "inode {}: partial write, {} of {} bytes at offset {}",
                inumber, done, from.len(), offset,
            );
        }
        Ok(done)
    }
}
