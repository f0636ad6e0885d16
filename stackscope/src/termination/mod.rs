//! # Fail-Safe Termination
//!
//! When the hosting program must die, this pipeline captures the stack(s),
//! attaches memory context, writes one report to stderr and then performs
//! exactly one of: raise the failure as a catchable [`AbortError`], abort
//! the process, or abort the whole coordinating group. The pipeline itself
//! must never crash or deadlock, even when entered from a signal handler or
//! from two failing threads at once.
//!
//! Concurrency contract: the first thread to reach [`terminate`] owns the
//! whole abort sequence behind a one-shot guard (a lock acquired and never
//! released). Any second entrant is routed straight to `libc::abort()`
//! without re-entering capture, which prevents recursive-fault livelock.

#![allow(unsafe_code)] // sigaction/abort require unsafe

use crate::capture::{self, CaptureOptions, DEFAULT_MAX_FRAMES};
use crate::domain::CaptureScope;
use crate::system;
use log::warn;
use stackscope_common::StackTree;
use std::fmt;
use std::io::Write;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

/// What drove the termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortKind {
    /// An explicit abort request.
    Abort,
    /// An unhandled panic surfaced through the panic hook.
    Exception,
    /// A fatal signal (SIGSEGV and friends).
    Signal,
    /// A cooperating process asked the whole group to die.
    GroupAbort,
    /// Anything else.
    Unknown,
}

/// Process-wide abort behavior, fixed once at startup.
#[derive(Debug, Clone, Copy)]
pub struct AbortBehavior {
    /// Raise a catchable [`AbortError`] instead of killing the process.
    pub throw_on_abort: bool,
    /// Which stacks a fatal report captures.
    pub scope: CaptureScope,
    /// Depth bound per captured thread.
    pub max_frames: usize,
}

impl Default for AbortBehavior {
    fn default() -> Self {
        Self { throw_on_abort: false, scope: CaptureScope::default(), max_frames: DEFAULT_MAX_FRAMES }
    }
}

static BEHAVIOR: OnceLock<AbortBehavior> = OnceLock::new();

/// Set the process-wide abort behavior. Only the first call takes effect;
/// later calls are ignored with a warning so a mid-flight abort can never
/// observe the configuration changing under it.
pub fn set_abort_behavior(behavior: AbortBehavior) {
    if BEHAVIOR.set(behavior).is_err() {
        warn!("abort behavior already fixed for this process, ignoring update");
    }
}

fn abort_behavior() -> AbortBehavior {
    BEHAVIOR.get().copied().unwrap_or_default()
}

/// Hook invoked on the unconditional-abort path when distributed
/// coordination is active; the embedding runtime supplies the transport
/// that tells the rest of the group to die.
pub type GroupAbortHook = fn();

static GROUP_ABORT: OnceLock<GroupAbortHook> = OnceLock::new();

/// Register the group-abort hook. First registration wins.
pub fn set_group_abort(hook: GroupAbortHook) {
    if GROUP_ABORT.set(hook).is_err() {
        warn!("group abort hook already registered, ignoring update");
    }
}

/// The one structured failure of the subsystem: everything a post-mortem
/// needs, captured at the moment the fatal condition was recognized.
#[derive(Debug, Clone)]
pub struct AbortError {
    /// Human-readable cause.
    pub message: String,
    /// Source file of the call site that raised the failure.
    pub file: String,
    /// Source line of that call site.
    pub line: u32,
    /// What drove the termination.
    pub kind: AbortKind,
    /// Signal number when `kind` is [`AbortKind::Signal`], otherwise 0.
    pub signal: i32,
    /// Resident memory at capture time, in bytes.
    pub bytes: u64,
    /// The captured stack(s), merged.
    pub stack: StackTree,
}

impl AbortError {
    /// Build an error for an explicit abort at the given call site,
    /// capturing memory usage and stacks per the configured scope.
    #[must_use]
    pub fn new(message: String, file: &str, line: u32) -> Self {
        Self::build(message, file, line, AbortKind::Abort, 0, abort_behavior().scope)
    }

    /// Build an error for a caught fatal signal. Only the interrupted
    /// thread is captured: the handler cannot safely handshake with others.
    #[must_use]
    pub fn from_signal(signal: i32) -> Self {
        Self::build(
            format!("caught signal {} ({})", signal, signal_name(signal)),
            "",
            0,
            AbortKind::Signal,
            signal,
            CaptureScope::ThreadLocal,
        )
    }

    fn build(
        message: String,
        file: &str,
        line: u32,
        kind: AbortKind,
        signal: i32,
        scope: CaptureScope,
    ) -> Self {
        let options = CaptureOptions { max_frames: abort_behavior().max_frames };
        let stack = match scope {
            CaptureScope::ThreadLocal => {
                StackTree::merge([capture::capture_current_thread(&options)])
            }
            CaptureScope::AllThreads | CaptureScope::Distributed => {
                capture::capture_all_threads(&options)
            }
        };
        Self {
            message,
            file: file.to_string(),
            line,
            kind,
            signal,
            bytes: system::memory_usage(),
            stack,
        }
    }
}

impl fmt::Display for AbortError {
    /// The full report. Identical for the thrown and the process-killing
    /// paths, so a caller that catches and logs the error observes the same
    /// content the unconditional abort would have printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AbortKind::Abort => {
                writeln!(f, "Program abort called in file `{}` at line {}", self.file, self.line)?;
            }
            AbortKind::Exception => writeln!(f, "Unhandled exception caught")?,
            AbortKind::Signal => {
                writeln!(f, "Unhandled signal {} ({}) caught", self.signal, signal_name(self.signal))?;
            }
            AbortKind::GroupAbort => writeln!(f, "Abort requested by the process group")?,
            AbortKind::Unknown => writeln!(f, "Unknown fatal error")?,
        }
        if !self.message.is_empty() {
            writeln!(f, "Message: {}", self.message)?;
        }
        writeln!(f, "Memory in use: {} bytes", self.bytes)?;
        writeln!(f, "Call stack:")?;
        for line in self.stack.render() {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AbortError {}

/// Raise a fatal condition at the caller's location.
///
/// With `throw_on_abort` set, the report is written to stderr and the
/// [`AbortError`] is raised as a catchable panic payload. Otherwise the
/// process terminates through [`terminate`] and this never returns control
/// anywhere.
#[track_caller]
pub fn abort(message: impl Into<String>) -> ! {
    let location = Location::caller();
    let err = AbortError::new(message.into(), location.file(), location.line());
    if abort_behavior().throw_on_abort {
        emit_report(&err);
        std::panic::panic_any(err);
    }
    terminate(err)
}

/// The unconditional end of the pipeline. Writes the report, notifies the
/// group when distributed coordination is active, and kills the process via
/// the platform's abnormal-termination mechanism.
pub fn terminate(err: AbortError) -> ! {
    static ENTERED: AtomicBool = AtomicBool::new(false);
    static ONE_SHOT: Mutex<()> = Mutex::new(());

    // A second fatal condition while the first is being reported gets no
    // capture and no report of its own. It waits a bounded grace period so
    // the first entrant's report reaches the stream, then dies regardless -
    // never indefinitely, even if the first entrant is stuck.
    if ENTERED.swap(true, Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_secs(3));
        unsafe { libc::abort() }
    }

    // One-shot guard: acquired here, deliberately never released.
    let guard = ONE_SHOT.lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::forget(guard);

    // A failure while terminating must not recurse into user hooks.
    clear_error_handlers();

    emit_report(&err);

    if abort_behavior().scope == CaptureScope::Distributed {
        if let Some(hook) = GROUP_ABORT.get() {
            hook();
        }
    }

    unsafe { libc::abort() }
}

fn emit_report(err: &AbortError) {
    let mut stderr = std::io::stderr().lock();
    let _ = write!(stderr, "{err}");
    let _ = stderr.flush();
}

/// Signals that indicate the process state is beyond repair.
const FATAL_SIGNALS: &[libc::c_int] =
    &[libc::SIGSEGV, libc::SIGBUS, libc::SIGILL, libc::SIGFPE, libc::SIGABRT];

extern "C" fn on_fatal_signal(signal: libc::c_int) {
    terminate(AbortError::from_signal(signal))
}

/// Install the fatal-signal handlers and the panic hook.
///
/// The panic hook prints the report for panics that did not originate in
/// [`abort`] (those already printed their own) and then lets the normal
/// unwind machinery proceed, so `catch_unwind` users keep working.
pub fn set_error_handlers() {
    capture::unwind::preload();

    for &signal in FATAL_SIGNALS {
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = on_fatal_signal as usize;
        action.sa_flags = libc::SA_RESTART;
        unsafe {
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                warn!("failed to install handler for {}", signal_name(signal));
            }
        }
    }

    std::panic::set_hook(Box::new(|info| {
        if info.payload().downcast_ref::<AbortError>().is_some() {
            return;
        }
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(std::string::ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        let (file, line) =
            info.location().map_or((String::new(), 0), |l| (l.file().to_string(), l.line()));
        let err = AbortError::build(
            message,
            &file,
            line,
            AbortKind::Exception,
            0,
            CaptureScope::ThreadLocal,
        );
        emit_report(&err);
    }));
}

/// Restore default signal dispositions and drop the panic hook. Called on
/// pipeline entry so nothing re-enters user hooks mid-termination.
pub fn clear_error_handlers() {
    for &signal in FATAL_SIGNALS {
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = libc::SIG_DFL;
        unsafe {
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(signal, &action, std::ptr::null_mut());
        }
    }
    let _ = std::panic::take_hook();
}

/// Name of a signal, for reports.
#[must_use]
pub fn signal_name(signal: i32) -> &'static str {
    match signal {
        libc::SIGABRT => "SIGABRT",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGHUP => "SIGHUP",
        libc::SIGILL => "SIGILL",
        libc::SIGINT => "SIGINT",
        libc::SIGKILL => "SIGKILL",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGTERM => "SIGTERM",
        libc::SIGURG => "SIGURG",
        _ => "unknown signal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throwing_behavior() {
        // Tests in this binary must never reach the process-killing path,
        // so the one allowed configuration call selects throwing.
        set_abort_behavior(AbortBehavior {
            throw_on_abort: true,
            scope: CaptureScope::ThreadLocal,
            max_frames: 64,
        });
    }

    #[test]
    fn test_abort_raises_catchable_error() {
        throwing_behavior();
        let result = std::panic::catch_unwind(|| abort("something went wrong"));
        let payload = result.expect_err("abort must not return");
        let err = payload.downcast_ref::<AbortError>().expect("typed payload");

        assert_eq!(err.kind, AbortKind::Abort);
        assert_eq!(err.message, "something went wrong");
        assert!(err.file.ends_with("mod.rs"));
        assert!(err.line > 0);
        assert!(!err.stack.is_empty());
    }

    #[test]
    fn test_report_contains_message_memory_and_stack() {
        throwing_behavior();
        let result = std::panic::catch_unwind(|| abort("report content check"));
        let payload = result.expect_err("abort must not return");
        let err = payload.downcast_ref::<AbortError>().expect("typed payload");

        let report = err.to_string();
        assert!(report.contains("Program abort called"));
        assert!(report.contains("report content check"));
        assert!(report.contains("Memory in use:"));
        assert!(report.contains("Call stack:"));
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(libc::SIGSEGV), "SIGSEGV");
        assert_eq!(signal_name(libc::SIGABRT), "SIGABRT");
        assert_eq!(signal_name(-1), "unknown signal");
    }

    #[test]
    fn test_from_signal_populates_kind_and_number() {
        throwing_behavior();
        let err = AbortError::from_signal(libc::SIGSEGV);
        assert_eq!(err.kind, AbortKind::Signal);
        assert_eq!(err.signal, libc::SIGSEGV);
        assert!(err.to_string().contains("SIGSEGV"));
    }
}
