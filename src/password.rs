use crate::*;
use crate::crypto::{digest_hex, digest_tag};
use crate::disk::{DDirEntry, FILE_PASSWORD_SZ};
use crate::fs::MountedFs;
use crate::superblock::SUPERBLOCK_POS;

fn check_passphrase(pass: &str) -> FsResult<()> {
    if pass.is_empty() {
        return Err(new_error!(FsError::InvalidParameter));
    }
    Ok(())
}

impl MountedFs {
    fn sync_superblock(&self) -> FsResult<()> {
        self.volume.write_blk(SUPERBLOCK_POS, &self.sb.encode())
    }

    pub fn is_volume_protected(&self) -> bool {
        self.sb.protected
    }

    fn verify_volume_password(&self, pass: &str) -> FsResult<()> {
        if !self.sb.protected {
            return Err(new_error!(FsError::NoPassword));
        }
        if digest_hex(pass) != self.sb.password {
            return Err(new_error!(FsError::WrongPassword));
        }
        Ok(())
    }

    pub fn set_password(&mut self, new: &str) -> FsResult<()> {
        check_passphrase(new)?;
        if self.sb.protected {
            return Err(new_error!(FsError::PasswordAlreadySet));
        }
        self.sb.protected = true;
        self.sb.password = digest_hex(new);
        self.sync_superblock()?;
        info!("volume password set");
        Ok(())
    }

    pub fn change_password(&mut self, old: &str, new: &str) -> FsResult<()> {
        check_passphrase(new)?;
        self.verify_volume_password(old)?;
        self.sb.password = digest_hex(new);
        self.sync_superblock()?;
        info!("volume password changed");
        Ok(())
    }

    pub fn remove_password(&mut self, old: &str) -> FsResult<()> {
        self.verify_volume_password(old)?;
        self.sb.protected = false;
        self.sb.password.clear();
        self.sync_superblock()?;
        info!("volume password removed");
        Ok(())
    }

    /// slot of a regular file in the current directory
    fn file_slot(&self, name: &str) -> FsResult<usize> {
        let slot = self.cwd.lookup(name).ok_or_else(|| new_error!(FsError::NotFound))?;
        if self.cwd.table[slot].tp == FileType::Dir {
            return Err(new_error!(FsError::IsADirectory));
        }
        Ok(slot)
    }

    fn verify_file_password(ent: &DDirEntry, pass: &str) -> FsResult<()> {
        if !ent.protected {
            return Err(new_error!(FsError::NoPassword));
        }
        if digest_tag(pass) != ent.password {
            return Err(new_error!(FsError::WrongPassword));
        }
        Ok(())
    }

    fn update_file_entry(&mut self, slot: usize, protected: bool, tag: [u8; FILE_PASSWORD_SZ]) -> FsResult<()> {
        let mut cwd = self.cwd.clone();
        cwd.table[slot].protected = protected;
        cwd.table[slot].password = tag;
        self.sync_dir(&cwd)?;
        self.refresh_cwd()
    }

    pub fn set_file_password(&mut self, name: &str, new: &str) -> FsResult<()> {
        check_passphrase(new)?;
        let slot = self.file_slot(name)?;
        if self.cwd.table[slot].protected {
            return Err(new_error!(FsError::PasswordAlreadySet));
        }
        self.update_file_entry(slot, true, digest_tag(new))?;
        info!("password set on {}", name);
        Ok(())
    }

    pub fn change_file_password(&mut self, name: &str, old: &str, new: &str) -> FsResult<()> {
        check_passphrase(new)?;
        let slot = self.file_slot(name)?;
        Self::verify_file_password(&self.cwd.table[slot], old)?;
        self.update_file_entry(slot, true, digest_tag(new))?;
        info!("password changed on {}", name);
        Ok(())
    }

    pub fn remove_file_password(&mut self, name: &str, old: &str) -> FsResult<()> {
        let slot = self.file_slot(name)?;
        Self::verify_file_password(&self.cwd.table[slot], old)?;
        self.update_file_entry(slot, false, [0; FILE_PASSWORD_SZ])?;
        info!("password removed from {}", name);
        Ok(())
    }

    /// Gate for reading or replacing the content of a protected file.
    pub fn check_file_access(&self, name: &str, password: Option<&str>) -> FsResult<()> {
        let slot = self.cwd.lookup(name).ok_or_else(|| new_error!(FsError::NotFound))?;
        let ent = &self.cwd.table[slot];
        if !ent.protected {
            return Ok(());
        }
        let pass = password.ok_or_else(|| new_error!(FsError::PermissionDenied))?;
        Self::verify_file_password(ent, pass)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fs::mkfs_in_memory;

    #[test]
    fn mount_gate() -> FsResult<()> {
        let mut fs = mkfs_in_memory(20)?;
        fs.set_password("s3cret")?;
        assert!(matches!(fs.set_password("other"), Err(FsError::PasswordAlreadySet)));
        let volume = fs.volume().clone();
        fs.unmount();

        assert!(MountedFs::is_protected(&volume)?);
        assert!(matches!(
            MountedFs::mount(volume.clone(), Some("wrong")),
            Err(FsError::WrongPassword)
        ));
        assert!(!volume.is_mounted());
        assert!(matches!(
            MountedFs::mount(volume.clone(), None),
            Err(FsError::PermissionDenied)
        ));
        assert!(!volume.is_mounted());

        let fs = MountedFs::mount(volume.clone(), Some("s3cret"))?;
        assert!(volume.is_mounted());
        assert!(fs.finfo().protected);
        Ok(())
    }

    #[test]
    fn change_and_remove() -> FsResult<()> {
        let mut fs = mkfs_in_memory(20)?;
        assert!(matches!(fs.remove_password("x"), Err(FsError::NoPassword)));
        assert!(matches!(fs.set_password(""), Err(FsError::InvalidParameter)));

        fs.set_password("one")?;
        assert!(matches!(fs.change_password("two", "three"), Err(FsError::WrongPassword)));
        fs.change_password("one", "two")?;
        assert!(matches!(fs.remove_password("one"), Err(FsError::WrongPassword)));

        let volume = fs.volume().clone();
        fs.unmount();
        assert!(matches!(
            MountedFs::mount(volume.clone(), Some("one")),
            Err(FsError::WrongPassword)
        ));
        let mut fs = MountedFs::mount(volume.clone(), Some("two"))?;
        fs.remove_password("two")?;
        assert!(!fs.is_volume_protected());
        fs.unmount();

        assert!(!MountedFs::is_protected(&volume)?);
        let fs = MountedFs::mount(volume, None)?;
        assert!(fs.sb.password.is_empty());
        Ok(())
    }

    #[test]
    fn file_gate() -> FsResult<()> {
        let mut fs = mkfs_in_memory(50)?;
        fs.touch("plain")?;
        let ino = fs.touch("locked")?;
        fs.write_data(ino, 0, b"top secret")?;
        fs.mkdir("d")?;

        assert!(matches!(fs.set_file_password("d", "pw"), Err(FsError::IsADirectory)));
        assert!(matches!(fs.set_file_password("none", "pw"), Err(FsError::NotFound)));
        fs.set_file_password("locked", "pw")?;
        assert!(matches!(fs.set_file_password("locked", "pw"), Err(FsError::PasswordAlreadySet)));

        // only the named entry is affected
        assert!(!fs.lookup("plain").ok_or(FsError::NotFound)?.protected);
        assert!(fs.lookup("locked").ok_or(FsError::NotFound)?.protected);
        fs.check_file_access("plain", None)?;

        assert!(matches!(fs.check_file_access("locked", None), Err(FsError::PermissionDenied)));
        assert!(matches!(fs.check_file_access("locked", Some("nope")), Err(FsError::WrongPassword)));
        fs.check_file_access("locked", Some("pw"))?;

        let out = std::env::temp_dir().join(format!("tinyfs-locked-{}", std::process::id()));
        assert!(matches!(fs.outport("locked", &out, None), Err(FsError::PermissionDenied)));
        assert_eq!(fs.outport("locked", &out, Some("pw"))?, 10);
        io_try!(std::fs::remove_file(&out));

        assert!(matches!(fs.rm("locked"), Err(FsError::PermissionDenied)));

        fs.change_file_password("locked", "pw", "pw2")?;
        assert!(matches!(fs.remove_file_password("locked", "pw"), Err(FsError::WrongPassword)));
        fs.remove_file_password("locked", "pw2")?;
        assert!(matches!(fs.remove_file_password("locked", "pw2"), Err(FsError::NoPassword)));
        fs.rm("locked")?;
        Ok(())
    }

    #[test]
    fn protected_file_blocks_rmdir() -> FsResult<()> {
        let mut fs = mkfs_in_memory(50)?;
        fs.mkdir("d")?;
        fs.cd("d")?;
        fs.touch("f")?;
        fs.set_file_password("f", "pw")?;
        fs.cd("..")?;

        let before = fs.finfo();
        assert!(matches!(fs.rmdir("d"), Err(FsError::PermissionDenied)));
        assert_eq!(fs.finfo(), before);

        fs.cd("d")?;
        fs.remove_file_password("f", "pw")?;
        fs.cd("..")?;
        fs.rmdir("d")?;
        assert!(fs.lookup("d").is_none());
        Ok(())
    }
}
