use libc::c_int;
use std::os::unix::io::RawFd;

/// Errors detected by the indirection core.
///
/// Every variant maps onto a POSIX errno so C-level entry points can surface
/// conditions without a translation table. Errors reported by a real kernel
/// primitive are carried verbatim in [`VfsError::Sys`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VfsError {
    /// Virtual descriptor has no live table entry.
    #[error("virtual descriptor {0} is not mapped")]
    NotFound(RawFd),

    /// Entry exists but is not backed by a usable external descriptor.
    #[error("virtual descriptor {0} has no external backing")]
    BadDescriptor(RawFd),

    /// Caller-supplied buffer cannot hold the path plus its terminator.
    /// The buffer is left untouched when this is returned.
    #[error("buffer of {capacity} bytes cannot hold {required} required bytes")]
    Range { capacity: usize, required: usize },

    /// The virtual handle space has been used up; no further descriptors
    /// can be opened in this process.
    #[error("virtual descriptor space exhausted")]
    Exhausted,

    /// Failure reported by a real kernel primitive, passed through unchanged.
    #[error("system primitive failed: errno {0}")]
    Sys(c_int),
}

impl VfsError {
    /// The errno value an intercepted entry point reports for this error.
    pub fn errno(&self) -> c_int {
        match self {
            VfsError::NotFound(_) | VfsError::BadDescriptor(_) => libc::EBADF,
            VfsError::Range { .. } => libc::ERANGE,
            VfsError::Exhausted => libc::EMFILE,
            VfsError::Sys(e) => *e,
        }
    }
}

pub type Result<T> = std::result::Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(VfsError::NotFound(7).errno(), libc::EBADF);
        assert_eq!(VfsError::BadDescriptor(7).errno(), libc::EBADF);
        assert_eq!(
            VfsError::Range {
                capacity: 9,
                required: 10
            }
            .errno(),
            libc::ERANGE
        );
        assert_eq!(VfsError::Exhausted.errno(), libc::EMFILE);
        assert_eq!(VfsError::Sys(libc::ENOMEM).errno(), libc::ENOMEM);
    }
}
