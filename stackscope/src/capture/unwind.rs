//! Raw stack walking.
//!
//! The walk writes into a caller-provided buffer and allocates nothing, so
//! it is usable from signal-handler context. All symbol resolution happens
//! later, at a point where taking locks and allocating is safe again.

#![allow(unsafe_code)] // backtrace(3) requires unsafe

/// Default bound on frames walked per thread.
pub const DEFAULT_MAX_FRAMES: usize = 100;

/// Hard bound for the static buffers used by cross-thread capture.
pub const MAX_RAW_FRAMES: usize = 128;

/// Walk the current thread's stack into `frames`, returning the number of
/// return addresses written, innermost first. The buffer length is the
/// depth bound, which guarantees termination on corrupted or cyclic
/// stacks. Returns 0 where the platform has no unwinder.
#[cfg(any(target_os = "macos", all(target_os = "linux", target_env = "gnu")))]
pub fn capture_raw(frames: &mut [usize]) -> usize {
    if frames.is_empty() {
        return 0;
    }
    let depth = i32::try_from(frames.len()).unwrap_or(i32::MAX);
    let written =
        unsafe { libc::backtrace(frames.as_mut_ptr().cast::<*mut libc::c_void>(), depth) };
    usize::try_from(written).unwrap_or(0)
}

#[cfg(not(any(target_os = "macos", all(target_os = "linux", target_env = "gnu"))))]
pub fn capture_raw(_frames: &mut [usize]) -> usize {
    0
}

/// Run one throwaway walk so the unwinder's lazy initialization (which may
/// allocate) happens now rather than inside a signal handler.
pub fn preload() {
    let mut scratch = [0usize; 4];
    let _ = capture_raw(&mut scratch);
}
