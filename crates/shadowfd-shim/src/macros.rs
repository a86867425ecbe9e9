/// Append a message to the in-process ring logger, mirroring to stderr when
/// `SHADOWFD_DEBUG` is set. Purely observational: never alters control flow
/// and never allocates.
#[macro_export]
macro_rules! shim_log {
    ($msg:expr) => {
        $crate::state::log($msg)
    };
}

/// Resolve a real libc function through its `RealSymbol` cache, or bail
/// out of the calling shim with an error value when the symbol cannot be
/// found (dlsym failure leaves us with nothing to delegate to).
///
/// ```ignore
/// let real = real_or!(REAL_GETCWD, GetcwdFn, ptr::null_mut());
/// ```
#[macro_export]
macro_rules! real_or {
    ($symbol:expr, $t:ty, $fail:expr) => {{
        match $symbol.get() {
            Some(p) => std::mem::transmute::<*mut libc::c_void, $t>(p),
            None => {
                $crate::entry::set_errno(libc::ENOSYS);
                return $fail;
            }
        }
    }};
}
