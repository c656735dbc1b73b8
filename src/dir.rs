use crate::*;
use crate::disk::*;
use crate::fs::MountedFs;

impl MountedFs {
    /// (volume position of the directory block, slot in it)
    fn dir_pos(&self, id: DirID) -> FsResult<(u64, usize)> {
        if id >= self.sb.layout.nr_dirs() {
            return Err(new_error!(FsError::InvalidParameter));
        }
        let idx = id / DIR_PER_BLOCK as u32;
        Ok((self.sb.layout.dir_blk_pos(idx), id as usize % DIR_PER_BLOCK))
    }

    pub(crate) fn read_dir(&self, id: DirID) -> FsResult<DDirectory> {
        let (pos, slot) = self.dir_pos(id)?;
        let mut dblk = DirBlock::decode(&self.volume.read_blk(pos)?)?;
        let dir = dblk.dirs.swap_remove(slot);
        if !dir.available {
            return Err(new_error!(FsError::NotFound));
        }
        Ok(dir)
    }

    pub(crate) fn sync_dir(&self, dir: &DDirectory) -> FsResult<()> {
        let (pos, slot) = self.dir_pos(dir.inumber)?;
        let mut dblk = DirBlock::decode(&self.volume.read_blk(pos)?)?;
        dblk.dirs[slot] = dir.clone();
        self.volume.write_blk(pos, &dblk.encode())
    }

    pub(crate) fn refresh_cwd(&mut self) -> FsResult<()> {
        self.cwd = self.read_dir(self.cwd.inumber)?;
        Ok(())
    }

    /// first free directory record, not yet written
    fn find_free_dir(&self) -> FsResult<DirID> {
        for idx in self.dcnt.not_full() {
            let pos = self.sb.layout.dir_blk_pos(idx as u32);
            let dblk = DirBlock::decode(&self.volume.read_blk(pos)?)?;
            if let Some(slot) = dblk.dirs.iter().position(|d| !d.available) {
                return Ok((idx * DIR_PER_BLOCK + slot) as DirID);
            }
        }
        Err(new_error!(FsError::DirectoryLimit))
    }

    fn clear_dir(&mut self, id: DirID) -> FsResult<()> {
        let (pos, slot) = self.dir_pos(id)?;
        let mut dblk = DirBlock::decode(&self.volume.read_blk(pos)?)?;
        dblk.dirs[slot] = DDirectory::unused();
        self.volume.write_blk(pos, &dblk.encode())?;
        self.dcnt.dec(id as usize / DIR_PER_BLOCK);
        Ok(())
    }

    /// name checks shared by touch and mkdir
    fn check_new_entry(&self, name: &str) -> FsResult<()> {
        check_name(name)?;
        if self.cwd.lookup(name).is_some() {
            return Err(new_error!(FsError::AlreadyExists));
        }
        if self.cwd.free_slot().is_none() {
            return Err(new_error!(FsError::DirectoryFull));
        }
        Ok(())
    }

    fn add_to_cwd(&mut self, entry: DDirEntry) -> FsResult<()> {
        let mut cwd = self.cwd.clone();
        cwd.add_entry(entry)?;
        self.sync_dir(&cwd)?;
        self.refresh_cwd()
    }

    /// Create an empty file in the current directory.
    pub fn touch(&mut self, name: &str) -> FsResult<InodeID> {
        self.check_new_entry(name)?;
        let inumber = self.create_inode()?;
        self.add_to_cwd(DDirEntry::new(FileType::Reg, inumber, name))?;
        debug!("touch {} -> inode {}", name, inumber);
        Ok(inumber)
    }

    pub fn mkdir(&mut self, name: &str) -> FsResult<DirID> {
        self.check_new_entry(name)?;
        let id = self.find_free_dir()?;
        self.sync_dir(&DDirectory::new(id, self.cwd.inumber, name))?;
        self.dcnt.inc(id as usize / DIR_PER_BLOCK);
        self.add_to_cwd(DDirEntry::new(FileType::Dir, id, name))?;
        debug!("mkdir {} -> dir {}", name, id);
        Ok(id)
    }

    pub fn cd(&mut self, name: &str) -> FsResult<()> {
        let ent = self.lookup(name).ok_or_else(|| new_error!(FsError::NotFound))?;
        if ent.tp != FileType::Dir {
            return Err(new_error!(FsError::NotADirectory));
        }
        self.cwd = self.read_dir(ent.inumber)?;
        Ok(())
    }

    /// all live entries of the current directory, "." and ".." included
    pub fn ls(&self) -> Vec<DirEntry> {
        self.cwd
            .table
            .iter()
            .filter(|e| e.available)
            .map(DDirEntry::to_dir_entry)
            .collect()
    }

    pub fn lookup(&self, name: &str) -> Option<DirEntry> {
        self.cwd.lookup(name).map(|slot| self.cwd.table[slot].to_dir_entry())
    }

    pub fn stat_file(&self, name: &str) -> FsResult<Metadata> {
        let ent = self.lookup(name).ok_or_else(|| new_error!(FsError::NotFound))?;
        if ent.tp == FileType::Dir {
            return Err(new_error!(FsError::IsADirectory));
        }
        self.stat(ent.inumber)
    }

    pub fn cwd_name(&self) -> &str {
        &self.cwd.name
    }

    pub fn cwd_id(&self) -> DirID {
        self.cwd.inumber
    }

    /// Remove a subdirectory of the current directory and all it holds.
    pub fn rmdir(&mut self, name: &str) -> FsResult<()> {
        let slot = self.victim_slot(name)?;
        if self.cwd.table[slot].tp != FileType::Dir {
            return Err(new_error!(FsError::NotADirectory));
        }
        self.remove_checked(slot)
    }

    /// Remove a file, or a directory recursively.
    pub fn rm(&mut self, name: &str) -> FsResult<()> {
        let slot = self.victim_slot(name)?;
        self.remove_checked(slot)
    }

    fn victim_slot(&self, name: &str) -> FsResult<usize> {
        if name == "." || name == ".." {
            return Err(new_error!(FsError::InvalidParameter));
        }
        self.cwd.lookup(name).ok_or_else(|| new_error!(FsError::NotFound))
    }

    fn remove_checked(&mut self, slot: usize) -> FsResult<()> {
        let ent = self.cwd.table[slot].clone();
        self.check_removable(&ent, 0)?;
        let parent = self.cwd.inumber;
        self.remove(parent, slot)?;
        self.refresh_cwd()?;
        info!("removed {}", ent.name);
        Ok(())
    }

    /// Walk the subtree under `ent` without touching it. Fails on the
    /// current directory or a protected file.
    fn check_removable(&self, ent: &DDirEntry, depth: u32) -> FsResult<()> {
        match ent.tp {
            FileType::Reg if ent.protected => Err(new_error!(FsError::PermissionDenied)),
            FileType::Reg => Ok(()),
            FileType::Dir => {
                if ent.inumber == self.cwd.inumber {
                    return Err(new_error!(FsError::ResourceBusy));
                }
                // deeper than the number of records means a loop
                if depth > self.sb.layout.nr_dirs() {
                    return Err(new_error!(FsError::InvalidData));
                }
                let dir = self.read_dir(ent.inumber)?;
                for (_, child) in dir.children() {
                    self.check_removable(child, depth + 1)?;
                }
                Ok(())
            }
        }
    }

    /// Remove whatever entry `slot` of directory `parent` points to and
    /// clear the entry.
    fn remove(&mut self, parent: DirID, slot: usize) -> FsResult<()> {
        let ent = self.read_dir(parent)?.table[slot].clone();
        match ent.tp {
            FileType::Dir => self.remove_directory(ent.inumber)?,
            FileType::Reg => match self.remove_inode(ent.inumber) {
                Ok(()) => {}
                Err(FsError::NotFound) => {
                    warn!("entry {} points to free inode {}", ent.name, ent.inumber);
                }
                Err(e) => return Err(e),
            },
        }

        let mut dir = self.read_dir(parent)?;
        dir.table[slot] = DDirEntry::default();
        self.sync_dir(&dir)
    }

    fn remove_directory(&mut self, id: DirID) -> FsResult<()> {
        if id == self.cwd.inumber {
            return Err(new_error!(FsError::ResourceBusy));
        }
        let dir = self.read_dir(id)?;
        let slots: Vec<usize> = dir.children().map(|(slot, _)| slot).collect();
        for slot in slots {
            self.remove(id, slot)?;
        }
        self.clear_dir(id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fs::mkfs_in_memory;

    #[test]
    fn mkdir_and_cd() -> FsResult<()> {
        let mut fs = mkfs_in_memory(20)?;
        let names: Vec<_> = fs.ls().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec![".", ".."]);

        let docs = fs.mkdir("docs")?;
        assert_eq!(docs, 1);
        let ent = fs.lookup("docs").ok_or(FsError::NotFound)?;
        assert_eq!((ent.tp, ent.inumber), (FileType::Dir, docs));

        fs.cd("docs")?;
        assert_eq!(fs.cwd_name(), "docs");
        assert_eq!(fs.cwd_id(), docs);
        assert_eq!(fs.cwd.parent(), ROOT_DIR_ID);
        fs.cd(".")?;
        assert_eq!(fs.cwd_id(), docs);
        fs.cd("..")?;
        assert_eq!(fs.cwd_id(), ROOT_DIR_ID);
        // root is its own parent
        fs.cd("..")?;
        assert_eq!(fs.cwd_name(), "/");

        // one directory block holds two records
        assert!(matches!(fs.mkdir("more"), Err(FsError::DirectoryLimit)));
        Ok(())
    }

    #[test]
    fn entry_errors() -> FsResult<()> {
        let mut fs = mkfs_in_memory(50)?;
        fs.touch("f")?;
        assert!(matches!(fs.touch("f"), Err(FsError::AlreadyExists)));
        assert!(matches!(fs.mkdir("f"), Err(FsError::AlreadyExists)));
        assert!(matches!(fs.touch("a/b"), Err(FsError::InvalidFilename)));
        assert!(matches!(fs.mkdir(".."), Err(FsError::InvalidFilename)));
        assert!(matches!(fs.touch("0123456789abcdef"), Err(FsError::InvalidFilename)));

        assert!(matches!(fs.cd("f"), Err(FsError::NotADirectory)));
        assert!(matches!(fs.cd("nope"), Err(FsError::NotFound)));
        assert!(matches!(fs.rmdir("f"), Err(FsError::NotADirectory)));
        assert!(matches!(fs.rm("nope"), Err(FsError::NotFound)));
        assert!(matches!(fs.rm("."), Err(FsError::InvalidParameter)));
        assert!(matches!(fs.rmdir(".."), Err(FsError::InvalidParameter)));
        assert!(matches!(fs.stat_file("."), Err(FsError::IsADirectory)));
        assert_eq!(fs.stat_file("f")?.size, 0);
        Ok(())
    }

    #[test]
    fn full_table_leaks_nothing() -> FsResult<()> {
        let mut fs = mkfs_in_memory(50)?;
        for i in 0..ENTRIES_PER_DIR - 2 {
            fs.touch(&format!("f{}", i))?;
        }
        let before = fs.finfo();
        assert!(matches!(fs.touch("extra"), Err(FsError::DirectoryFull)));
        assert!(matches!(fs.mkdir("extra"), Err(FsError::DirectoryFull)));
        assert_eq!(fs.finfo(), before);

        fs.rm("f2")?;
        fs.touch("extra")?;
        // first fit reuses slot 4
        assert_eq!(fs.ls()[4].name, "extra");
        Ok(())
    }

    #[test]
    fn recursive_remove() -> FsResult<()> {
        let mut fs = mkfs_in_memory(101)?;
        let fresh = fs.finfo();

        fs.mkdir("a")?;
        fs.cd("a")?;
        let f = fs.touch("f")?;
        fs.write_data(f, 0, &[1u8; 3000])?;
        fs.mkdir("b")?;
        fs.cd("b")?;
        let g = fs.touch("g")?;
        fs.write_data(g, 0, &[2u8; 100])?;
        fs.cd("..")?;
        fs.cd("..")?;

        let busy = fs.finfo();
        assert_eq!(busy.dfree, fresh.dfree - 2);
        assert_eq!(busy.ffree, fresh.ffree - 2);

        fs.rm("a")?;
        assert_eq!(fs.finfo(), fresh);
        assert!(fs.lookup("a").is_none());
        assert_eq!(fs.ls().len(), 2);
        Ok(())
    }

    #[test]
    fn rmdir_refuses_current_directory() -> FsResult<()> {
        let mut fs = mkfs_in_memory(101)?;
        let a = fs.mkdir("a")?;
        fs.cd("a")?;
        let b = fs.mkdir("b")?;

        // a damaged entry inside "b" leads back to "a", the current directory
        let mut b_dir = fs.read_dir(b)?;
        b_dir.add_entry(DDirEntry::new(FileType::Dir, a, "loop"))?;
        fs.sync_dir(&b_dir)?;

        let before = fs.finfo();
        assert!(matches!(fs.rmdir("b"), Err(FsError::ResourceBusy)));
        assert!(matches!(fs.rm("b"), Err(FsError::ResourceBusy)));
        assert_eq!(fs.finfo(), before);
        assert_eq!(fs.read_dir(b)?, b_dir);
        assert!(fs.lookup("b").is_some());
        Ok(())
    }

    #[test]
    fn dangling_file_entry_is_cleared() -> FsResult<()> {
        let mut fs = mkfs_in_memory(20)?;
        let ino = fs.touch("f")?;
        fs.remove_inode(ino)?;
        fs.rm("f")?;
        assert!(fs.lookup("f").is_none());
        Ok(())
    }
}
