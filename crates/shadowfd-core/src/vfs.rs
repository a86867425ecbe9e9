//! Entry-point facade over the resolver, the cwd cache and the real
//! primitives.
//!
//! One `Vfs` exists per process. The host that owns it (a preload shim, a
//! test harness) hands a reference to every intercepted entry point; nothing
//! in this crate reaches for ambient state.

use libc::{c_int, c_void, off_t};
use std::os::unix::io::RawFd;

use tracing::{debug, warn};

use crate::cwd::CwdCache;
use crate::error::{Result, VfsError};
use crate::sys::System;
use crate::table::{DescriptorTable, INVALID_FD};

pub struct Vfs<S: System> {
    pub table: DescriptorTable,
    pub cwd: CwdCache,
    sys: S,
}

impl<S: System> Vfs<S> {
    pub fn new(sys: S) -> Self {
        Self {
            table: DescriptorTable::new(),
            cwd: CwdCache::new(),
            sys,
        }
    }

    pub fn system(&self) -> &S {
        &self.sys
    }

    /// `getcwd` entry point: the cached logical path when one is set, the
    /// kernel's answer otherwise. See [`CwdCache::read_into`] for the buffer
    /// contract.
    pub fn getcwd(&self, buf: &mut [u8]) -> Result<usize> {
        self.cwd.read_into(&self.sys, buf)
    }

    /// `mmap` entry point.
    ///
    /// A negative descriptor means an anonymous mapping: it is forwarded
    /// unchanged and the resolver is never consulted. A non-negative
    /// descriptor is translated to its external descriptor first; an entry
    /// with no kernel backing fails with `EBADF` before the kernel is ever
    /// involved. The mapped address and any delegated error come back
    /// verbatim — descriptors are virtualized, addresses are not.
    pub fn mmap(
        &self,
        addr: *mut c_void,
        len: usize,
        prot: c_int,
        flags: c_int,
        virtual_fd: RawFd,
        offset: off_t,
    ) -> Result<*mut c_void> {
        if virtual_fd < 0 {
            return self.sys.mmap(addr, len, prot, flags, virtual_fd, offset);
        }

        let entry = self.table.resolve(virtual_fd)?;
        if entry.external_fd == INVALID_FD {
            warn!(virtual_fd, "mmap on descriptor with no external backing");
            return Err(VfsError::BadDescriptor(virtual_fd));
        }

        debug!(virtual_fd, external_fd = entry.external_fd, "mmap resolved");
        self.sys
            .mmap(addr, len, prot, flags, entry.external_fd, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::mock::MockSystem;
    use crate::table::FdEntry;
    use std::ptr;
    use std::sync::atomic::Ordering;

    const MAPPED: usize = 0x7000_0000;

    #[test]
    fn negative_fd_skips_the_resolver_entirely() {
        let vfs = Vfs::new(MockSystem::new("/", MAPPED));

        let addr = vfs
            .mmap(
                ptr::null_mut(),
                4096,
                libc::PROT_READ,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
            .unwrap();
        assert_eq!(addr as usize, MAPPED);

        // The primitive saw the same negative value.
        assert_eq!(*vfs.system().mmap_fds.lock().unwrap(), vec![-1]);
    }

    #[test]
    fn unmapped_descriptor_propagates_not_found() {
        let vfs = Vfs::new(MockSystem::new("/", MAPPED));

        let err = vfs
            .mmap(ptr::null_mut(), 4096, libc::PROT_READ, libc::MAP_PRIVATE, 7, 0)
            .unwrap_err();
        assert_eq!(err, VfsError::NotFound(7));
        assert_eq!(err.errno(), libc::EBADF);
        assert!(vfs.system().mmap_fds.lock().unwrap().is_empty());
    }

    #[test]
    fn unbacked_descriptor_fails_before_reaching_the_kernel() {
        let vfs = Vfs::new(MockSystem::new("/", MAPPED));
        vfs.table.insert(7, FdEntry::unbacked().with_vpath("/mem/blob"));

        let err = vfs
            .mmap(ptr::null_mut(), 4096, libc::PROT_READ, libc::MAP_PRIVATE, 7, 0)
            .unwrap_err();
        assert_eq!(err, VfsError::BadDescriptor(7));
        assert_eq!(err.errno(), libc::EBADF);
        assert!(vfs.system().mmap_fds.lock().unwrap().is_empty());
    }

    #[test]
    fn resolved_descriptor_is_translated_and_result_passed_through() {
        let vfs = Vfs::new(MockSystem::new("/", MAPPED));
        vfs.table.insert(7, FdEntry::backed(42));

        let addr = vfs
            .mmap(ptr::null_mut(), 4096, libc::PROT_READ, libc::MAP_PRIVATE, 7, 0)
            .unwrap();
        assert_eq!(addr as usize, MAPPED);
        assert_eq!(*vfs.system().mmap_fds.lock().unwrap(), vec![42]);
    }

    #[test]
    fn getcwd_goes_through_the_cache() {
        let vfs = Vfs::new(MockSystem::new("/kernel/cwd", MAPPED));

        let mut buf = [0u8; 64];
        let len = vfs.getcwd(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"/kernel/cwd");
        assert_eq!(vfs.system().getcwd_calls.load(Ordering::SeqCst), 1);

        vfs.cwd.set("/data/app");
        let len = vfs.getcwd(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"/data/app");
        assert_eq!(vfs.system().getcwd_calls.load(Ordering::SeqCst), 1);
    }
}
