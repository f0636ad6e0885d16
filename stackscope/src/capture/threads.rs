//! Thread enumeration and cross-thread stack capture.
//!
//! Capturing another thread's stack works by sending it a directed signal;
//! the target's handler walks its own stack into a static buffer while the
//! requester waits with a bounded timeout. One handshake runs at a time,
//! serialized by a lock. The handler touches only atomics and the raw
//! unwinder (preloaded at install time), keeping it signal-safe.

#![allow(unsafe_code)] // tgkill/sigaction require unsafe

use crate::capture::unwind::{self, MAX_RAW_FRAMES};
use crate::domain::{ThreadCaptureError, Tid};
#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(target_os = "linux")]
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;
#[cfg(target_os = "linux")]
use std::time::Instant;

/// How long the requester waits for the target thread's handler to run.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Kernel thread id of the calling thread.
#[must_use]
pub fn this_thread() -> Tid {
    #[cfg(target_os = "linux")]
    {
        let tid = unsafe { libc::syscall(libc::SYS_gettid) };
        Tid(i32::try_from(tid).unwrap_or(0))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Tid(i32::try_from(std::process::id()).unwrap_or(0))
    }
}

/// Best-effort snapshot of the live threads of this process, sorted.
/// Threads created or destroyed while enumerating may be missed.
#[must_use]
pub fn active_threads() -> Vec<Tid> {
    #[cfg(target_os = "linux")]
    {
        let Ok(entries) = std::fs::read_dir("/proc/self/task") else {
            return vec![this_thread()];
        };
        let mut tids: Vec<Tid> = entries
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().to_string_lossy().parse::<i32>().ok())
            .map(Tid)
            .collect();
        tids.sort_unstable();
        tids
    }
    #[cfg(not(target_os = "linux"))]
    {
        vec![this_thread()]
    }
}

/// Capture the raw stack of another thread of this process.
///
/// # Errors
/// `Unsupported` off Linux, `SignalFailed` when the thread cannot be
/// signalled (usually already exited), `Timeout` when its handler never
/// ran. Callers are expected to absorb these into an empty stack.
pub fn backtrace_thread(tid: Tid, max_frames: usize) -> Result<Vec<u64>, ThreadCaptureError> {
    if tid == this_thread() {
        let mut frames = [0usize; MAX_RAW_FRAMES];
        let written = unwind::capture_raw(&mut frames).min(max_frames);
        return Ok(frames[..written].iter().map(|&f| f as u64).collect());
    }
    backtrace_remote(tid, max_frames)
}

#[cfg(target_os = "linux")]
mod handshake {
    use super::{AtomicUsize, Ordering};
    use crate::capture::unwind::{self, MAX_RAW_FRAMES};

    pub const IDLE: usize = 0;
    pub const REQUESTED: usize = 1;
    pub const DONE: usize = 2;

    pub static STATE: AtomicUsize = AtomicUsize::new(IDLE);
    pub static COUNT: AtomicUsize = AtomicUsize::new(0);
    pub static FRAMES: [AtomicUsize; MAX_RAW_FRAMES] =
        [const { AtomicUsize::new(0) }; MAX_RAW_FRAMES];

    pub extern "C" fn on_capture_signal(_signal: libc::c_int) {
        if STATE.load(Ordering::Acquire) != REQUESTED {
            return; // stray delivery, nobody is waiting
        }
        let mut local = [0usize; MAX_RAW_FRAMES];
        let written = unwind::capture_raw(&mut local);
        for (slot, &frame) in FRAMES.iter().zip(local[..written].iter()) {
            slot.store(frame, Ordering::Relaxed);
        }
        COUNT.store(written, Ordering::Release);
        STATE.store(DONE, Ordering::Release);
    }
}

#[cfg(target_os = "linux")]
fn backtrace_remote(tid: Tid, max_frames: usize) -> Result<Vec<u64>, ThreadCaptureError> {
    use self::handshake::{DONE, IDLE, REQUESTED};

    static CAPTURE_LOCK: Mutex<()> = Mutex::new(());
    let _guard = CAPTURE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    if !install_capture_handler() {
        return Err(ThreadCaptureError::Unsupported);
    }

    handshake::STATE.store(REQUESTED, Ordering::Release);
    let rc = unsafe {
        libc::syscall(
            libc::SYS_tgkill,
            libc::c_long::from(libc::getpid()),
            libc::c_long::from(tid.0),
            libc::c_long::from(CAPTURE_SIGNAL),
        )
    };
    if rc != 0 {
        handshake::STATE.store(IDLE, Ordering::Release);
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        return Err(ThreadCaptureError::SignalFailed { tid, errno });
    }

    let started = Instant::now();
    while handshake::STATE.load(Ordering::Acquire) != DONE {
        if started.elapsed() > HANDSHAKE_TIMEOUT {
            handshake::STATE.store(IDLE, Ordering::Release);
            return Err(ThreadCaptureError::Timeout(tid, HANDSHAKE_TIMEOUT));
        }
        std::thread::sleep(Duration::from_micros(50));
    }

    let written = handshake::COUNT.load(Ordering::Acquire).min(max_frames).min(MAX_RAW_FRAMES);
    let frames =
        (0..written).map(|i| handshake::FRAMES[i].load(Ordering::Relaxed) as u64).collect();
    handshake::STATE.store(IDLE, Ordering::Release);
    Ok(frames)
}

#[cfg(not(target_os = "linux"))]
fn backtrace_remote(_tid: Tid, _max_frames: usize) -> Result<Vec<u64>, ThreadCaptureError> {
    Err(ThreadCaptureError::Unsupported)
}

/// SIGURG: ignored by default and essentially unused elsewhere, so hijacking
/// it for capture does not disturb the host application.
#[cfg(target_os = "linux")]
const CAPTURE_SIGNAL: libc::c_int = libc::SIGURG;

#[cfg(target_os = "linux")]
fn install_capture_handler() -> bool {
    static INSTALLED: OnceLock<bool> = OnceLock::new();
    *INSTALLED.get_or_init(|| {
        unwind::preload();
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = handshake::on_capture_signal as usize;
        action.sa_flags = libc::SA_RESTART;
        unsafe {
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(CAPTURE_SIGNAL, &action, std::ptr::null_mut()) == 0
        }
    })
}
