//! [`System`] implementation over the real libc symbols.
//!
//! `shadowfd_core::RealSystem` calls `libc::getcwd`/`libc::mmap` directly,
//! which inside a preload shim would resolve right back into our own
//! interposed exports. This impl delegates through the `RTLD_NEXT` pointers
//! instead.

use libc::{c_char, c_int, c_void, off_t};
use std::os::unix::io::RawFd;

use shadowfd_core::{Result, System, VfsError};

use crate::reals::{GetcwdFn, MmapFn, REAL_GETCWD, REAL_MMAP};

pub struct RealKernel;

impl System for RealKernel {
    fn getcwd(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(VfsError::Sys(libc::EINVAL));
        }
        let Some(p) = REAL_GETCWD.get() else {
            return Err(VfsError::Sys(libc::ENOSYS));
        };
        let real = unsafe { std::mem::transmute::<*mut c_void, GetcwdFn>(p) };
        let ret = unsafe { real(buf.as_mut_ptr() as *mut c_char, buf.len()) };
        if ret.is_null() {
            return Err(VfsError::Sys(errno()));
        }
        Ok(buf.iter().position(|&b| b == 0).unwrap_or(buf.len()))
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
        let Some(p) = REAL_MMAP.get() else {
            return Err(VfsError::Sys(libc::ENOSYS));
        };
        let real = unsafe { std::mem::transmute::<*mut c_void, MmapFn>(p) };
        let ret = unsafe { real(addr, len, prot, flags, fd, offset) };
        if ret == libc::MAP_FAILED {
            return Err(VfsError::Sys(errno()));
        }
        Ok(ret)
    }
}

#[cfg(target_os = "macos")]
pub(crate) fn errno() -> c_int {
    unsafe { *libc::__error() }
}

#[cfg(target_os = "linux")]
pub(crate) fn errno() -> c_int {
    unsafe { *libc::__errno_location() }
}
