use libc::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use shadowfd_core::{RingLog, Vfs};

use crate::kernel::RealKernel;

// ============================================================================
// Global State & Recursion Guards
// ============================================================================

pub(crate) static SHIM_STATE: AtomicPtr<ShimState> = AtomicPtr::new(ptr::null_mut());

/// True until the dynamic loader has finished loading this library. All
/// shims passthrough while set; cleared by the `.init_array` constructor.
pub static INITIALIZING: AtomicBool = AtomicBool::new(true);

/// Set once another thread has claimed state construction, so late arrivals
/// passthrough instead of racing the init.
static INIT_BUSY: AtomicBool = AtomicBool::new(false);

pub(crate) static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

// Lock-free TLS key bootstrap: atomics instead of OnceLock so key creation
// cannot deadlock if it is itself intercepted.
static RECURSION_KEY_VALUE: AtomicUsize = AtomicUsize::new(0);
static RECURSION_KEY_READY: AtomicBool = AtomicBool::new(false);
static RECURSION_KEY_CLAIM: AtomicBool = AtomicBool::new(false);

fn recursion_key() -> Option<libc::pthread_key_t> {
    if RECURSION_KEY_READY.load(Ordering::Acquire) {
        return Some(RECURSION_KEY_VALUE.load(Ordering::Relaxed) as libc::pthread_key_t);
    }
    // One thread creates the key; everyone else passes through until it is
    // published.
    if RECURSION_KEY_CLAIM.swap(true, Ordering::SeqCst) {
        return None;
    }
    let mut key: libc::pthread_key_t = 0;
    if unsafe { libc::pthread_key_create(&mut key, None) } != 0 {
        RECURSION_KEY_CLAIM.store(false, Ordering::SeqCst);
        return None;
    }
    RECURSION_KEY_VALUE.store(key as usize, Ordering::Relaxed);
    RECURSION_KEY_READY.store(true, Ordering::Release);
    Some(key)
}

/// Per-thread re-entrancy guard. An intercepted call that recursively hits
/// another shim (dlsym and malloc both do filesystem work on some libcs)
/// gets `None` on the inner entry and passes straight through to the real
/// function.
pub(crate) struct ShimGuard {
    key: libc::pthread_key_t,
}

impl ShimGuard {
    pub(crate) fn enter() -> Option<Self> {
        if INITIALIZING.load(Ordering::Relaxed) {
            return None;
        }
        let key = recursion_key()?;
        unsafe {
            if !libc::pthread_getspecific(key).is_null() {
                return None; // already inside the shim on this thread
            }
            libc::pthread_setspecific(key, ptr::dangling::<c_void>());
        }
        Some(ShimGuard { key })
    }
}

impl Drop for ShimGuard {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_setspecific(self.key, ptr::null());
        }
    }
}

// ============================================================================
// Diagnostics sink
// ============================================================================

/// Ring of recent shim messages (see [`RingLog`]); appendable from any
/// interception context without locks or allocation.
pub static LOGGER: RingLog = RingLog::new();

pub fn log(msg: &str) {
    LOGGER.log(msg);
    if DEBUG_ENABLED.load(Ordering::Relaxed) {
        unsafe {
            libc::write(2, msg.as_ptr() as *const c_void, msg.len());
        }
    }
}

// ============================================================================
// Process-wide shim state
// ============================================================================

/// The single process-wide service instance handed to every entry point.
pub struct ShimState {
    pub vfs: Vfs<RealKernel>,
}

impl ShimState {
    fn init() -> *mut Self {
        // No heap use beyond the one Box: this can run from the first
        // intercepted call after load, when malloc is only just ready.
        if !unsafe { libc::getenv(c"SHADOWFD_DEBUG".as_ptr()) }.is_null() {
            DEBUG_ENABLED.store(true, Ordering::Relaxed);
        }
        Box::into_raw(Box::new(ShimState {
            vfs: Vfs::new(RealKernel),
        }))
    }

    /// Lazily constructed singleton. Returns `None` while another thread is
    /// mid-construction; callers passthrough in that window.
    pub(crate) fn get() -> Option<&'static Self> {
        let p = SHIM_STATE.load(Ordering::Acquire);
        if !p.is_null() {
            return unsafe { Some(&*p) };
        }

        if INIT_BUSY.swap(true, Ordering::SeqCst) {
            return None;
        }

        // Re-check: another thread may have published between load and claim.
        let p = SHIM_STATE.load(Ordering::Acquire);
        if !p.is_null() {
            INIT_BUSY.store(false, Ordering::SeqCst);
            return unsafe { Some(&*p) };
        }

        let p = Self::init();
        SHIM_STATE.store(p, Ordering::Release);
        INIT_BUSY.store(false, Ordering::SeqCst);
        shim_log!("[shadowfd] state initialized\n");
        unsafe { Some(&*p) }
    }
}
