use thiserror::Error;
use std::io::ErrorKind;
use libc::c_int;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("std::io error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("block {0} is out of volume range")]
    BlockOutOfRange(u64),

    #[error("volume is already mounted")]
    AlreadyMounted,

    #[error("volume is not mounted")]
    NotMounted,

    #[error("failed to check metadata in superblock")]
    SuperBlockCheckFailed,

    #[error("block pointer {0} exceeds volume size")]
    CorruptPointer(u64),

    #[error("data encoding is invalid")]
    InvalidData,

    #[error("parameter is invalid")]
    InvalidParameter,

    #[error("filename is invalid")]
    InvalidFilename,

    #[error("cannot find requested resource")]
    NotFound,

    #[error("requested resource is not a directory")]
    NotADirectory,

    #[error("requested resource is a directory")]
    IsADirectory,

    #[error("requested resource already exists")]
    AlreadyExists,

    #[error("directory entry table is full")]
    DirectoryFull,

    #[error("no free directory record left")]
    DirectoryLimit,

    #[error("no free inode left")]
    NoFreeInode,

    #[error("no free block left on volume")]
    StorageFull,

    #[error("file would exceed maximum size")]
    FileTooLarge,

    #[error("current directory cannot be removed")]
    ResourceBusy,

    #[error("operation is not granted for current config")]
    PermissionDenied,

    #[error("password is incorrect")]
    WrongPassword,

    #[error("password is already set")]
    PasswordAlreadySet,

    #[error("no password is set")]
    NoPassword,

    #[error("failed to lock or unlock mutex")]
    MutexError,
}

pub type FsResult<T> = Result<T, FsError>;

impl From<FsError> for c_int {
    fn from(e: FsError) -> c_int {
        match e {
            FsError::IOError(io_err) => {
                match io_err.kind() {
                    ErrorKind::NotFound => libc::ENOENT,
                    ErrorKind::PermissionDenied => libc::EACCES,
                    ErrorKind::AlreadyExists => libc::EEXIST,
                    ErrorKind::InvalidInput => libc::EINVAL,
                    ErrorKind::InvalidData => libc::EINVAL,
                    ErrorKind::Unsupported => libc::ENOSYS,
                    _ => libc::EIO,
                }
            },
            FsError::BlockOutOfRange(_) => libc::EIO,
            FsError::AlreadyMounted => libc::EBUSY,
            FsError::NotMounted => libc::ENODEV,
            FsError::SuperBlockCheckFailed => libc::EIO,
            FsError::CorruptPointer(_) => libc::EIO,
            FsError::InvalidData => libc::EINVAL,
            FsError::InvalidParameter => libc::EINVAL,
            FsError::InvalidFilename => libc::EINVAL,
            FsError::NotFound => libc::ENOENT,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::DirectoryFull => libc::EMLINK,
            FsError::DirectoryLimit => libc::ENOSPC,
            FsError::NoFreeInode => libc::ENOSPC,
            FsError::StorageFull => libc::ENOSPC,
            FsError::FileTooLarge => libc::EFBIG,
            FsError::ResourceBusy => libc::EBUSY,
            FsError::PermissionDenied => libc::EACCES,
            FsError::WrongPassword => libc::EACCES,
            FsError::PasswordAlreadySet => libc::EEXIST,
            FsError::NoPassword => libc::ENOENT,
            FsError::MutexError => 266 as c_int,
        }
    }
}

#[macro_export]
macro_rules! new_error {
    ($e: expr) => {
        {
            let e = $e;
            $crate::debug!("error: {}", e);
            e
        }
    };
}

#[macro_export]
macro_rules! io_try {
    ($e: expr) => {
        $e.map_err(|e| $crate::new_error!($crate::FsError::IOError(e)))?
    };
}

#[macro_export]
macro_rules! mutex_lock {
    ($mu: expr) => {
        $mu.lock().map_err(|_| $crate::new_error!($crate::FsError::MutexError))?
    };
}
