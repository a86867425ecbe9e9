//! Real kernel primitives behind a trait seam.
//!
//! The core never calls the kernel directly; everything goes through
//! [`System`] so a host can substitute its own delegation path (a preload
//! shim must use `dlsym(RTLD_NEXT)` pointers, tests use a recording mock).

use libc::{c_char, c_int, c_void, off_t};
use std::os::unix::io::RawFd;

use crate::error::{Result, VfsError};

/// The kernel-level primitives the indirection layer delegates to.
pub trait System: Send + Sync {
    /// Fill `buf` with the kernel's current working directory, including the
    /// NUL terminator. Returns the path length excluding the terminator.
    fn getcwd(&self, buf: &mut [u8]) -> Result<usize>;

    /// Map memory backed by `fd`, or anonymously when `fd` is negative.
    ///
    /// All parameters are forwarded to the kernel untouched; the caller owns
    /// the validity of `addr` and `offset`. The mapped address comes back
    /// verbatim.
    fn mmap(
        &self,
        addr: *mut c_void,
        len: usize,
        prot: c_int,
        flags: c_int,
        fd: RawFd,
        offset: off_t,
    ) -> Result<*mut c_void>;
}

/// [`System`] implementation over plain libc calls.
///
/// Suitable when the layer is embedded as a normal library. A symbol-level
/// interposer must not use this (libc::getcwd would resolve back into the
/// interposed symbol) and provides its own `System` over the real pointers.
#[derive(Debug, Default)]
pub struct RealSystem;

impl System for RealSystem {
    fn getcwd(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(VfsError::Sys(libc::EINVAL));
        }
        let ret = unsafe { libc::getcwd(buf.as_mut_ptr() as *mut c_char, buf.len()) };
        if ret.is_null() {
            return Err(VfsError::Sys(last_errno()));
        }
        Ok(cstr_len(buf))
    }

    fn mmap(
        &self,
        addr: *mut c_void,
        len: usize,
        prot: c_int,
        flags: c_int,
        fd: RawFd,
        offset: off_t,
    ) -> Result<*mut c_void> {
        let ret = unsafe { libc::mmap(addr, len, prot, flags, fd, offset) };
        if ret == libc::MAP_FAILED {
            return Err(VfsError::Sys(last_errno()));
        }
        Ok(ret)
    }
}

/// Length of the NUL-terminated string a kernel primitive wrote into `buf`.
pub(crate) fn cstr_len(buf: &[u8]) -> usize {
    buf.iter().position(|&b| b == 0).unwrap_or(buf.len())
}

#[cfg(target_os = "macos")]
pub(crate) fn last_errno() -> c_int {
    unsafe { *libc::__error() }
}

#[cfg(target_os = "linux")]
pub(crate) fn last_errno() -> c_int {
    unsafe { *libc::__errno_location() }
}
