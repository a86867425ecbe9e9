//! # shadowfd-shim
//!
//! LD_PRELOAD shim around [`shadowfd-core`](shadowfd_core). Exports the
//! intercepted C entry points (`getcwd`, `chdir`, `fchdir`, `mmap`, `close`),
//! owns the single process-wide [`Vfs`](shadowfd_core::Vfs) instance, and
//! resolves the real libc symbols via `dlsym(RTLD_NEXT)` so delegation never
//! loops back into the interposed symbols.
//!
//! Everything here has to be safe to run from arbitrary threads, from inside
//! other intercepted calls, and during early process bootstrap before malloc
//! is usable; hence the passthrough flag, the recursion guard and the
//! allocation-free logger in [`state`].

// Unsafe FFI functions without safety docs - these are inherently unsafe C ABI
#![allow(clippy::missing_safety_doc)]

// Macros must be defined before modules that use them
#[macro_use]
pub mod macros;

pub mod entry;
pub mod kernel;
pub mod reals;
pub mod state;

pub use state::LOGGER;

/// Static constructor: runs once the dynamic loader has finished resolving
/// this library, which is the earliest point the shims may run Rust logic.
#[cfg(target_os = "linux")]
#[link_section = ".init_array"]
#[used]
pub static SET_READY: unsafe extern "C" fn() = {
    unsafe extern "C" fn ready() {
        crate::state::INITIALIZING.store(false, std::sync::atomic::Ordering::SeqCst);
    }
    ready
};
