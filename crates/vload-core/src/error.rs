use thiserror::Error;

/// Errors surfaced by the blocking file API.
///
/// Transport and store failures never appear here: the orchestrator absorbs
/// them and the application only observes a missing file.
#[derive(Error, Debug)]
pub enum VfsError {
    #[error("No such virtual file: {path}")]
    NotFound { path: String },

    #[error("Descriptor {fd} is not open")]
    BadDescriptor { fd: i32 },

    #[error("Invalid position {position} on descriptor {fd}")]
    InvalidPosition { fd: i32, position: i64 },

    #[error("Write on descriptor {fd} would grow the file to {size} bytes, limit is {limit}")]
    FileTooLarge { fd: i32, size: u64, limit: u64 },

    #[error("Cannot grow the file on descriptor {fd} to {size} bytes")]
    OutOfMemory { fd: i32, size: u64 },

    #[error("Control thread is not running")]
    ControlThreadGone,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VfsError {
    /// POSIX error number reported by the syscall surface.
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::NotFound { .. } | VfsError::BadDescriptor { .. } => libc::ENOENT,
            VfsError::InvalidPosition { .. } => libc::EINVAL,
            VfsError::FileTooLarge { .. } => libc::EFBIG,
            VfsError::OutOfMemory { .. } => libc::ENOMEM,
            VfsError::ControlThreadGone => libc::EIO,
            VfsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

pub type Result<T> = std::result::Result<T, VfsError>;
