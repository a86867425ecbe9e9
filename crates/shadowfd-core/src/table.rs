//! Process-wide virtual descriptor table.
//!
//! Maps the integer handles this layer gives out to the external (kernel)
//! descriptors the real syscalls accept. Resolution is a pure lookup; the
//! table only changes through the open/close operations, so a descriptor
//! closed by another thread yields a clean `NotFound` rather than a torn
//! entry.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::RwLock;

use tracing::debug;

use crate::error::{Result, VfsError};

/// External-descriptor sentinel for entries with no kernel backing
/// (in-memory-only objects). Resolving one of these is a bad-descriptor
/// condition, distinct from the handle not existing at all.
pub const INVALID_FD: RawFd = -1;

/// First virtual handle value. High enough that virtual handles stay
/// disjoint from any kernel descriptor the process is realistically handed,
/// so a consumer can tell at a glance which side a value belongs to.
pub const VIRTUAL_FD_BASE: RawFd = 0x7F00_0000;

/// One live virtual descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdEntry {
    /// Kernel descriptor this handle resolves to, or [`INVALID_FD`].
    pub external_fd: RawFd,
    /// Logical path the descriptor was opened from, when the backend tracks
    /// one. Opaque to the resolver itself.
    pub vpath: Option<String>,
}

impl FdEntry {
    /// Entry backed by a real kernel descriptor.
    pub fn backed(external_fd: RawFd) -> Self {
        Self {
            external_fd,
            vpath: None,
        }
    }

    /// Entry with no kernel backing (in-memory object).
    pub fn unbacked() -> Self {
        Self {
            external_fd: INVALID_FD,
            vpath: None,
        }
    }

    pub fn with_vpath(mut self, vpath: impl Into<String>) -> Self {
        self.vpath = Some(vpath.into());
        self
    }
}

/// Concurrent virtual-to-external descriptor map.
///
/// Reads vastly outnumber structural changes, so lookups go through the read
/// side of an rwlock while open/close take the write side. Virtual handles
/// are allocated from a monotonic counter and never reused within a process
/// lifetime.
pub struct DescriptorTable {
    entries: RwLock<HashMap<RawFd, FdEntry>>,
    next_virtual: AtomicI32,
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_virtual: AtomicI32::new(VIRTUAL_FD_BASE),
        }
    }

    /// Translate a virtual descriptor into its live entry.
    ///
    /// Pure lookup with no side effects. `NotFound` means the handle was
    /// never opened or has since been closed; an entry carrying
    /// [`INVALID_FD`] is returned as-is and it is the caller's job to treat
    /// it as a bad descriptor.
    pub fn resolve(&self, virtual_fd: RawFd) -> Result<FdEntry> {
        let entries = self.entries.read().unwrap();
        entries
            .get(&virtual_fd)
            .cloned()
            .ok_or(VfsError::NotFound(virtual_fd))
    }

    /// Register `entry` under a freshly allocated virtual descriptor.
    ///
    /// Handles are monotonic and never reused; once the counter reaches
    /// `i32::MAX` the open fails with `Exhausted` rather than wrapping into
    /// (or below) the kernel descriptor range.
    pub fn open_entry(&self, entry: FdEntry) -> Result<RawFd> {
        let virtual_fd = self
            .next_virtual
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_add(1))
            .map_err(|_| VfsError::Exhausted)?;
        debug!(virtual_fd, external_fd = entry.external_fd, "virtual open");
        self.entries.write().unwrap().insert(virtual_fd, entry);
        Ok(virtual_fd)
    }

    #[cfg(test)]
    fn set_next_virtual(&self, next: RawFd) {
        self.next_virtual.store(next, Ordering::Relaxed);
    }

    /// Bind `entry` to a specific virtual descriptor (dup-style collaborators).
    /// Returns the entry previously under that handle, if any.
    pub fn insert(&self, virtual_fd: RawFd, entry: FdEntry) -> Option<FdEntry> {
        self.entries.write().unwrap().insert(virtual_fd, entry)
    }

    /// Drop a virtual descriptor, returning its entry so the caller can
    /// release the external descriptor it held.
    pub fn remove(&self, virtual_fd: RawFd) -> Option<FdEntry> {
        let removed = self.entries.write().unwrap().remove(&virtual_fd);
        if removed.is_some() {
            debug!(virtual_fd, "virtual close");
        }
        removed
    }

    pub fn contains(&self, virtual_fd: RawFd) -> bool {
        self.entries.read().unwrap().contains_key(&virtual_fd)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn resolve_is_stable_until_close() {
        let table = DescriptorTable::new();
        let vfd = table
            .open_entry(FdEntry::backed(42).with_vpath("/pkg/lib.so"))
            .unwrap();
        assert!(vfd >= VIRTUAL_FD_BASE);

        for _ in 0..3 {
            let entry = table.resolve(vfd).unwrap();
            assert_eq!(entry.external_fd, 42);
            assert_eq!(entry.vpath.as_deref(), Some("/pkg/lib.so"));
        }

        let removed = table.remove(vfd).unwrap();
        assert_eq!(removed.external_fd, 42);
        assert_eq!(table.resolve(vfd), Err(VfsError::NotFound(vfd)));
    }

    #[test]
    fn never_opened_is_not_found() {
        let table = DescriptorTable::new();
        assert_eq!(table.resolve(7), Err(VfsError::NotFound(7)));
        assert!(!table.contains(7));
        assert!(table.is_empty());
    }

    #[test]
    fn insert_replaces_and_returns_old_entry() {
        let table = DescriptorTable::new();
        assert_eq!(table.insert(7, FdEntry::backed(42)), None);
        let old = table.insert(7, FdEntry::backed(43)).unwrap();
        assert_eq!(old.external_fd, 42);
        assert_eq!(table.resolve(7).unwrap().external_fd, 43);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn handles_are_never_reused() {
        let table = DescriptorTable::new();
        let a = table.open_entry(FdEntry::unbacked()).unwrap();
        table.remove(a);
        let b = table.open_entry(FdEntry::unbacked()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn exhausted_handle_space_fails_instead_of_wrapping() {
        let table = DescriptorTable::new();
        table.set_next_virtual(i32::MAX - 1);

        let vfd = table.open_entry(FdEntry::unbacked()).unwrap();
        assert_eq!(vfd, i32::MAX - 1);

        let err = table.open_entry(FdEntry::unbacked()).unwrap_err();
        assert_eq!(err, VfsError::Exhausted);
        assert_eq!(err.errno(), libc::EMFILE);

        // The counter stays pinned: no wrap into the kernel descriptor range.
        assert_eq!(table.open_entry(FdEntry::unbacked()), Err(VfsError::Exhausted));
        assert_eq!(table.len(), 1);
    }

    /// N threads churn open/close on their own descriptors while M threads
    /// resolve a disjoint set of stable descriptors. Resolution must never
    /// tear and must never leak another handle's external descriptor.
    #[test]
    fn concurrent_churn_does_not_tear_stable_entries() {
        const CHURN_THREADS: usize = 4;
        const RESOLVE_THREADS: usize = 4;
        const STABLE_FDS: i32 = 16;
        const ITERS: usize = 500;

        let _ = tracing_subscriber::fmt::try_init();
        let table = Arc::new(DescriptorTable::new());

        // Stable mapping: virtual v -> external v * 1000 + 7.
        let stable: Vec<RawFd> = (0..STABLE_FDS)
            .map(|i| {
                table
                    .open_entry(FdEntry::backed(i * 1000 + 7).with_vpath(format!("/s/{i}")))
                    .unwrap()
            })
            .collect();
        let expected: Vec<RawFd> = (0..STABLE_FDS).map(|i| i * 1000 + 7).collect();

        let mut handles = Vec::new();
        for _ in 0..CHURN_THREADS {
            let table = Arc::clone(&table);
            handles.push(std::thread::spawn(move || {
                for n in 0..ITERS {
                    let vfd = table.open_entry(FdEntry::backed(n as RawFd)).unwrap();
                    assert_eq!(table.resolve(vfd).unwrap().external_fd, n as RawFd);
                    table.remove(vfd);
                }
            }));
        }
        for _ in 0..RESOLVE_THREADS {
            let table = Arc::clone(&table);
            let stable = stable.clone();
            let expected = expected.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..ITERS {
                    for (vfd, want) in stable.iter().zip(&expected) {
                        let entry = table.resolve(*vfd).unwrap();
                        assert_eq!(entry.external_fd, *want);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Churn descriptors were all closed again.
        assert_eq!(table.len(), STABLE_FDS as usize);
    }
}
