//! # shadowfd-core
//!
//! Library-level file descriptor virtualization and working-directory
//! shadowing.
//!
//! Intercepted POSIX entry points (`getcwd`, `mmap`, ...) need two pieces of
//! process-wide state: a table translating *virtual* descriptors into the
//! *external* (kernel) descriptors the real syscalls accept, and a cached
//! notion of the current working directory that can shadow, or defer to, the
//! kernel's own. This crate holds both, plus the dispatch logic that sits
//! between an intercepted call and the real primitive.
//!
//! Nothing here is an ambient global: state lives in [`DescriptorTable`],
//! [`CwdCache`] and the [`Vfs`] facade, and the real kernel primitives sit
//! behind the [`System`] trait so the whole layer is testable with an
//! injected mock. A preload shim (or any other host) owns the single
//! process-wide instance and hands it to the entry points it exports.

pub mod cwd;
pub mod error;
pub mod ring;
pub mod sys;
pub mod table;
pub mod vfs;

pub use cwd::CwdCache;
pub use error::{Result, VfsError};
pub use ring::RingLog;
pub use sys::{RealSystem, System};
pub use table::{DescriptorTable, FdEntry, INVALID_FD, VIRTUAL_FD_BASE};
pub use vfs::Vfs;
