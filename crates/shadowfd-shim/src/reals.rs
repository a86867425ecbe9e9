//! Cached `dlsym(RTLD_NEXT)` pointers to the real libc functions.
//!
//! The shims delegate through these instead of calling `libc::*` directly;
//! a direct call would resolve back into our own interposed symbol.

use libc::{c_char, c_int, c_void, off_t, size_t};
use std::ffi::CStr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// One lazily resolved libc symbol. The first successful lookup is cached;
/// a failed lookup is retried on the next call rather than pinned, since
/// dlsym can transiently fail during loader bootstrap.
pub struct RealSymbol {
    cached: AtomicPtr<c_void>,
    name: &'static CStr,
}

impl RealSymbol {
    pub const fn new(name: &'static CStr) -> Self {
        Self {
            cached: AtomicPtr::new(std::ptr::null_mut()),
            name,
        }
    }

    /// The next occurrence of this symbol after our library in the lookup
    /// chain, or `None` when the loader has nothing to chain to.
    pub fn get(&self) -> Option<*mut c_void> {
        let p = self.cached.load(Ordering::Acquire);
        if !p.is_null() {
            return Some(p);
        }
        let p = unsafe { libc::dlsym(libc::RTLD_NEXT, self.name.as_ptr()) };
        if p.is_null() {
            return None;
        }
        self.cached.store(p, Ordering::Release);
        Some(p)
    }
}

pub static REAL_GETCWD: RealSymbol = RealSymbol::new(c"getcwd");
pub static REAL_CHDIR: RealSymbol = RealSymbol::new(c"chdir");
pub static REAL_FCHDIR: RealSymbol = RealSymbol::new(c"fchdir");
pub static REAL_MMAP: RealSymbol = RealSymbol::new(c"mmap");
pub static REAL_CLOSE: RealSymbol = RealSymbol::new(c"close");

pub type GetcwdFn = unsafe extern "C" fn(*mut c_char, size_t) -> *mut c_char;
pub type ChdirFn = unsafe extern "C" fn(*const c_char) -> c_int;
pub type FchdirFn = unsafe extern "C" fn(c_int) -> c_int;
pub type MmapFn =
    unsafe extern "C" fn(*mut c_void, size_t, c_int, c_int, c_int, off_t) -> *mut c_void;
pub type CloseFn = unsafe extern "C" fn(c_int) -> c_int;
