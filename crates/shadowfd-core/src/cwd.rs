//! Cached process working directory.
//!
//! The process-wide logical cwd, shadowing the kernel's own. `None` means no
//! logical directory has ever been established and reads defer entirely to
//! the kernel primitive; the cache never fabricates a value it has no
//! authority over.
//!
//! The mutex is non-reentrant by design. Only the methods on this type take
//! it, and none of them call back into one another while holding it. In
//! particular, path absolutization must not be reachable from the read path:
//! absolutization calls [`CwdCache::snapshot`] exactly once, caches the
//! result locally, and works on the copy.

use std::sync::Mutex;

use tracing::debug;

use crate::error::{Result, VfsError};
use crate::sys::System;

pub struct CwdCache {
    path: Mutex<Option<String>>,
}

impl Default for CwdCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CwdCache {
    pub const fn new() -> Self {
        Self {
            path: Mutex::new(None),
        }
    }

    /// Copy the working directory into `buf`, NUL-terminated, returning the
    /// path length excluding the terminator.
    ///
    /// With no cached path this defers verbatim to `sys`. With a cached path
    /// of length `n`, `buf` must hold at least `n + 1` bytes; a shorter
    /// buffer fails with a range error and `buf` is left untouched — a
    /// truncated path is never written.
    pub fn read_into<S: System + ?Sized>(&self, sys: &S, buf: &mut [u8]) -> Result<usize> {
        // Held across the whole copy so a concurrent directory change cannot
        // interleave with the read.
        let guard = self.path.lock().unwrap();

        let Some(path) = guard.as_deref() else {
            debug!("cwd never cached, deferring to kernel");
            // Release before the kernel call; the lock only covers memory.
            drop(guard);
            return sys.getcwd(buf);
        };

        let len = path.len();
        if buf.len() < len + 1 {
            return Err(VfsError::Range {
                capacity: buf.len(),
                required: len + 1,
            });
        }

        buf[..len].copy_from_slice(path.as_bytes());
        buf[len] = 0;
        Ok(len)
    }

    /// Serve an allocating read (the glibc `getcwd(NULL, size)` extension,
    /// where the host allocates the result itself).
    ///
    /// Returns `Ok(None)` when nothing is cached — the host defers to the
    /// kernel. With a cached path, `capacity == 0` means "as large as
    /// needed"; a nonzero `capacity` smaller than `length + 1` fails with
    /// the same range error a caller-supplied buffer would see.
    pub fn read_alloc(&self, capacity: usize) -> Result<Option<String>> {
        let guard = self.path.lock().unwrap();
        let Some(path) = guard.as_deref() else {
            return Ok(None);
        };
        if capacity != 0 && capacity < path.len() + 1 {
            return Err(VfsError::Range {
                capacity,
                required: path.len() + 1,
            });
        }
        Ok(Some(path.to_string()))
    }

    /// Establish the logical working directory. Called by the
    /// directory-change collaborator after the kernel accepted the change.
    pub fn set(&self, path: impl Into<String>) {
        let path = path.into();
        debug!(cwd = %path, "cwd cache updated");
        *self.path.lock().unwrap() = Some(path);
    }

    /// Forget the cached path; subsequent reads defer to the kernel again.
    pub fn clear(&self) {
        *self.path.lock().unwrap() = None;
    }

    /// Single-acquisition copy of the cached path, for absolutization.
    ///
    /// Higher-level path resolution takes this once at the top of its call
    /// chain instead of re-entering the locked read path.
    pub fn snapshot(&self) -> Option<String> {
        self.path.lock().unwrap().clone()
    }

    pub fn is_set(&self) -> bool {
        self.path.lock().unwrap().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::mock::MockSystem;
    use std::sync::atomic::Ordering;

    #[test]
    fn unset_cache_is_fully_transparent() {
        let cache = CwdCache::new();
        let sys = MockSystem::new("/kernel/cwd", 0);

        let mut buf = [0u8; 64];
        let len = cache.read_into(&sys, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"/kernel/cwd");
        assert_eq!(buf[len], 0);
        assert_eq!(sys.getcwd_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cached_path_shadows_the_kernel() {
        let cache = CwdCache::new();
        let sys = MockSystem::new("/kernel/cwd", 0);
        cache.set("/data/app");

        let mut buf = [0u8; 64];
        let len = cache.read_into(&sys, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"/data/app");
        assert_eq!(sys.getcwd_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn capacity_equal_to_length_fails_and_leaves_buffer_untouched() {
        let cache = CwdCache::new();
        let sys = MockSystem::new("/kernel/cwd", 0);
        cache.set("/data/app"); // length 9

        let mut buf = [0xAAu8; 9];
        let err = cache.read_into(&sys, &mut buf).unwrap_err();
        assert_eq!(
            err,
            VfsError::Range {
                capacity: 9,
                required: 10
            }
        );
        assert_eq!(err.errno(), libc::ERANGE);
        assert_eq!(buf, [0xAAu8; 9]);
    }

    #[test]
    fn capacity_length_plus_one_is_an_exact_fit() {
        let cache = CwdCache::new();
        let sys = MockSystem::new("/kernel/cwd", 0);
        cache.set("/data/app");

        let mut buf = [0xAAu8; 10];
        let len = cache.read_into(&sys, &mut buf).unwrap();
        assert_eq!(len, 9);
        assert_eq!(&buf[..9], b"/data/app");
        assert_eq!(buf[9], 0);
    }

    #[test]
    fn clear_restores_kernel_delegation() {
        let cache = CwdCache::new();
        let sys = MockSystem::new("/kernel/cwd", 0);
        cache.set("/data/app");
        assert!(cache.is_set());

        cache.clear();
        assert!(!cache.is_set());

        let mut buf = [0u8; 64];
        let len = cache.read_into(&sys, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"/kernel/cwd");
    }

    #[test]
    fn allocating_read_defers_when_nothing_is_cached() {
        let cache = CwdCache::new();
        assert_eq!(cache.read_alloc(0), Ok(None));
        assert_eq!(cache.read_alloc(4096), Ok(None));
    }

    #[test]
    fn allocating_read_honors_the_capacity_contract() {
        let cache = CwdCache::new();
        cache.set("/data/app"); // length 9

        // 0 = "as large as needed".
        assert_eq!(cache.read_alloc(0), Ok(Some("/data/app".to_string())));
        assert_eq!(cache.read_alloc(10), Ok(Some("/data/app".to_string())));

        let err = cache.read_alloc(9).unwrap_err();
        assert_eq!(
            err,
            VfsError::Range {
                capacity: 9,
                required: 10
            }
        );
        assert_eq!(err.errno(), libc::ERANGE);
    }

    #[test]
    fn snapshot_copies_without_holding_the_lock() {
        let cache = CwdCache::new();
        assert_eq!(cache.snapshot(), None);

        cache.set("/data/app");
        let snap = cache.snapshot().unwrap();
        assert_eq!(snap, "/data/app");

        // The copy stays valid across a concurrent change.
        cache.set("/data/other");
        assert_eq!(snap, "/data/app");
        assert_eq!(cache.snapshot().as_deref(), Some("/data/other"));
    }
}
