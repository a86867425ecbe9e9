//! Exported C entry points.
//!
//! Every shim follows the same shape: resolve the real function first,
//! passthrough during early boot or on recursion, otherwise run the core
//! logic and translate `VfsError` into errno.

use libc::{c_char, c_int, c_void, off_t, size_t};
use std::ffi::CStr;
use std::ptr;
use std::sync::atomic::Ordering;

use shadowfd_core::{FdEntry, System, INVALID_FD, VIRTUAL_FD_BASE};

use crate::reals::{ChdirFn, CloseFn, FchdirFn, GetcwdFn, MmapFn};
use crate::state::{ShimGuard, ShimState, INITIALIZING};

#[cfg(target_os = "macos")]
pub fn set_errno(e: c_int) {
    unsafe {
        *libc::__error() = e;
    }
}

#[cfg(target_os = "linux")]
pub fn set_errno(e: c_int) {
    unsafe {
        *libc::__errno_location() = e;
    }
}

// ============================================================================
// getcwd / chdir / fchdir
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn getcwd(buf: *mut c_char, size: size_t) -> *mut c_char {
    let real = real_or!(crate::reals::REAL_GETCWD, GetcwdFn, ptr::null_mut());
    if INITIALIZING.load(Ordering::Relaxed) {
        return real(buf, size);
    }
    let _guard = match ShimGuard::enter() {
        Some(g) => g,
        None => return real(buf, size),
    };
    let Some(state) = ShimState::get() else {
        return real(buf, size);
    };

    // glibc's allocating extension: a null buf asks us to malloc the
    // result. Serve the logical path so shadowing stays complete; defer to
    // the kernel only when nothing is cached.
    if buf.is_null() {
        return match state.vfs.cwd.read_alloc(size) {
            Ok(Some(path)) => alloc_cwd(&path, size),
            Ok(None) => real(buf, size),
            Err(e) => {
                set_errno(e.errno());
                ptr::null_mut()
            }
        };
    }
    if size == 0 {
        return real(buf, size);
    }

    let dest = std::slice::from_raw_parts_mut(buf as *mut u8, size);
    match state.vfs.getcwd(dest) {
        Ok(_) => buf,
        Err(e) => {
            shim_log!("[shadowfd] getcwd failed\n");
            set_errno(e.errno());
            ptr::null_mut()
        }
    }
}

/// Heap copy of `path` for the allocating `getcwd` extension; the caller
/// frees it with `free()`, so it must come from `malloc`. A nonzero request
/// allocates exactly that many bytes, matching glibc.
unsafe fn alloc_cwd(path: &str, requested: size_t) -> *mut c_char {
    let len = path.len();
    let size = if requested == 0 { len + 1 } else { requested };
    let mem = libc::malloc(size) as *mut c_char;
    if mem.is_null() {
        set_errno(libc::ENOMEM);
        return ptr::null_mut();
    }
    ptr::copy_nonoverlapping(path.as_ptr() as *const c_char, mem, len);
    *mem.add(len) = 0;
    mem
}

/// Re-read the kernel's cwd into the cache after a successful directory
/// change. On any failure the cache is cleared instead: an unset cache
/// defers to the kernel, which is always correct.
unsafe fn refresh_cwd(state: &ShimState) {
    let mut buf = [0u8; libc::PATH_MAX as usize];
    match state.vfs.system().getcwd(&mut buf) {
        Ok(len) => match std::str::from_utf8(&buf[..len]) {
            Ok(path) => state.vfs.cwd.set(path),
            Err(_) => state.vfs.cwd.clear(),
        },
        Err(_) => state.vfs.cwd.clear(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn chdir(path: *const c_char) -> c_int {
    let real = real_or!(crate::reals::REAL_CHDIR, ChdirFn, -1);
    if INITIALIZING.load(Ordering::Relaxed) {
        return real(path);
    }
    let _guard = match ShimGuard::enter() {
        Some(g) => g,
        None => return real(path),
    };

    let ret = real(path);
    if ret == 0 {
        if let Some(state) = ShimState::get() {
            refresh_cwd(state);
        }
    }
    ret
}

#[no_mangle]
pub unsafe extern "C" fn fchdir(fd: c_int) -> c_int {
    let real = real_or!(crate::reals::REAL_FCHDIR, FchdirFn, -1);
    if INITIALIZING.load(Ordering::Relaxed) {
        return real(fd);
    }
    let _guard = match ShimGuard::enter() {
        Some(g) => g,
        None => return real(fd),
    };

    // A virtual directory handle cannot be fchdir'd into by the kernel.
    if fd >= VIRTUAL_FD_BASE {
        let Some(state) = ShimState::get() else {
            return real(fd);
        };
        match state.vfs.table.resolve(fd) {
            Ok(entry) if entry.external_fd != INVALID_FD => {
                let ret = real(entry.external_fd);
                if ret == 0 {
                    refresh_cwd(state);
                }
                return ret;
            }
            _ => {
                set_errno(libc::EBADF);
                return -1;
            }
        }
    }

    let ret = real(fd);
    if ret == 0 {
        if let Some(state) = ShimState::get() {
            refresh_cwd(state);
        }
    }
    ret
}

// ============================================================================
// mmap / close
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn mmap(
    addr: *mut c_void,
    length: size_t,
    prot: c_int,
    flags: c_int,
    fd: c_int,
    offset: off_t,
) -> *mut c_void {
    let real = real_or!(crate::reals::REAL_MMAP, MmapFn, libc::MAP_FAILED);
    // Anonymous mappings (negative fd) and plain kernel descriptors go
    // straight through; only handles in the virtual range are ours.
    if INITIALIZING.load(Ordering::Relaxed) || fd < VIRTUAL_FD_BASE {
        return real(addr, length, prot, flags, fd, offset);
    }
    let _guard = match ShimGuard::enter() {
        Some(g) => g,
        None => return real(addr, length, prot, flags, fd, offset),
    };
    let Some(state) = ShimState::get() else {
        return real(addr, length, prot, flags, fd, offset);
    };

    match state.vfs.mmap(addr, length, prot, flags, fd, offset) {
        Ok(mapped) => mapped,
        Err(e) => {
            shim_log!("[shadowfd] mmap on virtual descriptor failed\n");
            set_errno(e.errno());
            libc::MAP_FAILED
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn close(fd: c_int) -> c_int {
    let real = real_or!(crate::reals::REAL_CLOSE, CloseFn, -1);
    if INITIALIZING.load(Ordering::Relaxed) || fd < VIRTUAL_FD_BASE {
        return real(fd);
    }
    let _guard = match ShimGuard::enter() {
        Some(g) => g,
        None => return real(fd),
    };
    let Some(state) = ShimState::get() else {
        return real(fd);
    };

    match state.vfs.table.remove(fd) {
        Some(entry) if entry.external_fd != INVALID_FD => real(entry.external_fd),
        Some(_) => 0, // in-memory object, no kernel descriptor to release
        None => {
            set_errno(libc::EBADF);
            -1
        }
    }
}

// ============================================================================
// Collaborator surface
// ============================================================================

/// Register an externally opened kernel descriptor (or, with a negative
/// `external_fd`, an in-memory object) under a fresh virtual handle. This is
/// the grow path open-style collaborators use to populate the table.
/// `vpath` is optional backend metadata and may be null.
#[no_mangle]
pub unsafe extern "C" fn shadowfd_register(external_fd: c_int, vpath: *const c_char) -> c_int {
    let Some(state) = ShimState::get() else {
        set_errno(libc::EAGAIN);
        return -1;
    };

    let mut entry = if external_fd < 0 {
        FdEntry::unbacked()
    } else {
        FdEntry::backed(external_fd)
    };
    if !vpath.is_null() {
        if let Ok(s) = CStr::from_ptr(vpath).to_str() {
            entry = entry.with_vpath(s);
        }
    }
    match state.vfs.table.open_entry(entry) {
        Ok(virtual_fd) => virtual_fd,
        Err(e) => {
            set_errno(e.errno());
            -1
        }
    }
}

/// Resolve a virtual handle to its external descriptor without closing it.
/// Returns -1 with `EBADF` when the handle is unmapped or unbacked.
#[no_mangle]
pub unsafe extern "C" fn shadowfd_resolve(virtual_fd: c_int) -> c_int {
    let Some(state) = ShimState::get() else {
        set_errno(libc::EAGAIN);
        return -1;
    };

    match state.vfs.table.resolve(virtual_fd) {
        Ok(entry) if entry.external_fd != INVALID_FD => entry.external_fd,
        Ok(_) | Err(_) => {
            set_errno(libc::EBADF);
            -1
        }
    }
}
