//! # Stack Capture
//!
//! Walks call stacks and resolves them into [`StackSequence`]s:
//!
//! - [`capture_current_thread`]: always available; the raw walk is
//!   signal-safe and resolution happens afterwards
//! - [`capture_thread`]: other threads of this process (Linux), via a
//!   directed-signal handshake
//! - [`capture_all_threads`]: snapshot every live thread and merge the
//!   results into one aggregated [`StackTree`]
//!
//! Capture never fails: unsupported platforms and unresponsive threads
//! yield empty sequences, logged but not propagated.

pub mod threads;
pub mod unwind;

use crate::domain::Tid;
use crate::symbolization::resolver;
use log::warn;
use stackscope_common::{StackSequence, StackTree};
use std::sync::{Mutex, PoisonError};

pub use threads::{active_threads, this_thread};
pub use unwind::{DEFAULT_MAX_FRAMES, MAX_RAW_FRAMES};

/// Knobs for one capture call.
#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    /// Maximum frames walked per thread.
    pub max_frames: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self { max_frames: DEFAULT_MAX_FRAMES }
    }
}

/// Raw return addresses of the calling thread, innermost first.
#[must_use]
pub fn backtrace_current(options: &CaptureOptions) -> Vec<u64> {
    let mut buffer = [0usize; MAX_RAW_FRAMES];
    let bound = options.max_frames.min(MAX_RAW_FRAMES);
    let written = unwind::capture_raw(&mut buffer[..bound]);
    buffer[..written].iter().map(|&f| f as u64).collect()
}

/// Capture and resolve the calling thread's stack.
#[must_use]
pub fn capture_current_thread(options: &CaptureOptions) -> StackSequence {
    let raw = backtrace_current(options);
    let mut stack = resolver::global().resolve_all(&raw);
    trim_capture_frames(&mut stack);
    stack
}

/// Capture and resolve another thread's stack. Returns an empty sequence
/// when the platform cannot unwind the thread or it never responds.
#[must_use]
pub fn capture_thread(tid: Tid, options: &CaptureOptions) -> StackSequence {
    match threads::backtrace_thread(tid, options.max_frames) {
        Ok(raw) => {
            let mut stack = resolver::global().resolve_all(&raw);
            trim_capture_frames(&mut stack);
            stack
        }
        Err(err) => {
            warn!("stack capture for thread {tid} failed: {err}");
            StackSequence::new()
        }
    }
}

/// Capture every live thread and merge the stacks into one tree.
///
/// The thread list is a best-effort snapshot taken under a lock; threads
/// starting or exiting concurrently may be missed. The root contributor
/// count equals the number of threads captured, including those that
/// produced no frames.
#[must_use]
pub fn capture_all_threads(options: &CaptureOptions) -> StackTree {
    static SNAPSHOT_LOCK: Mutex<()> = Mutex::new(());
    let _guard = SNAPSHOT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    let me = this_thread();
    let stacks: Vec<StackSequence> = active_threads()
        .into_iter()
        .map(|tid| {
            if tid == me {
                capture_current_thread(options)
            } else {
                capture_thread(tid, options)
            }
        })
        .collect();
    StackTree::merge(stacks)
}

/// Drop the leading frames that belong to the capture machinery itself, so
/// reports start at the caller's code.
pub fn trim_capture_frames(stack: &mut StackSequence) {
    const INTERNAL_MARKERS: &[&str] = &[
        "stackscope::capture::unwind",
        "stackscope::capture::threads",
        "stackscope::capture::backtrace_current",
        "stackscope::capture::capture_current_thread",
        "stackscope::capture::capture_thread",
        "stackscope::capture::capture_all_threads",
        "stackscope::termination::AbortError",
        "stackscope::termination::abort",
        "stackscope::termination::terminate",
        "stackscope::termination::on_fatal_signal",
        "stackscope::termination::set_error_handlers",
        "__restore_rt",
        "backtrace",
    ];

    let keep_from = stack
        .iter()
        .position(|frame| {
            frame.function.is_empty()
                || !INTERNAL_MARKERS.iter().any(|m| frame.function.contains(m))
        })
        .unwrap_or(0);
    if keep_from > 0 {
        stack.drain(..keep_from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackscope_common::StackFrame;

    #[inline(never)]
    fn level_three(options: &CaptureOptions) -> StackSequence {
        capture_current_thread(options)
    }

    #[inline(never)]
    fn level_two(options: &CaptureOptions) -> StackSequence {
        level_three(options)
    }

    #[inline(never)]
    fn level_one(options: &CaptureOptions) -> StackSequence {
        level_two(options)
    }

    #[test]
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn test_capture_three_helpers_deep() {
        let stack = level_one(&CaptureOptions::default());
        assert!(stack.len() >= 3, "stack too shallow: {} frames", stack.len());

        // The innermost frames must name the helper chain.
        let head: Vec<&str> =
            stack.iter().take(6).map(|f| f.function.as_str()).collect();
        assert!(
            head.iter().any(|f| f.contains("level_three")),
            "helper not named in innermost frames: {head:?}"
        );
    }

    #[test]
    fn test_max_frames_is_respected() {
        let options = CaptureOptions { max_frames: 4 };
        let stack = backtrace_current(&options);
        assert!(stack.len() <= 4);
    }

    #[test]
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn test_all_threads_counts_every_contributor() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let done = Arc::new(AtomicBool::new(false));
        let workers: Vec<_> = (0..2)
            .map(|_| {
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        std::thread::sleep(std::time::Duration::from_millis(1));
                    }
                })
            })
            .collect();

        let tree = capture_all_threads(&CaptureOptions::default());
        done.store(true, Ordering::Release);
        for worker in workers {
            worker.join().expect("join worker");
        }

        // At least this thread and the two workers contributed.
        assert!(tree.contributors >= 3, "only {} contributors", tree.contributors);
    }

    #[test]
    fn test_trim_drops_leading_machinery_frames() {
        let frame = |function: &str| StackFrame {
            return_address: 1,
            module_relative: 1,
            module: "/bin/app".to_string(),
            function: function.to_string(),
            file: String::new(),
            line: 0,
        };
        let mut stack = vec![
            frame("stackscope::capture::capture_current_thread"),
            frame("app::busy_work"),
            frame("stackscope::capture::unwind"), // not leading, must survive
            frame("app::main"),
        ];
        trim_capture_frames(&mut stack);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack[0].function, "app::busy_work");
    }
}
