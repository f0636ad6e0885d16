//! # stackscope - In-Process Stack Capture and Fail-Safe Termination
//!
//! stackscope collects call stacks for the current thread (and, on Linux,
//! for every live thread of the process), resolves raw return addresses to
//! symbols, merges many per-thread stacks into one deduplicated tree, and
//! drives a termination pipeline that must never itself crash or deadlock -
//! even when entered from a signal handler or from a second failing thread.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                 Fatal condition (abort / signal)           │
//! └────────────────────────────┬───────────────────────────────┘
//!                              ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │ termination: one-shot guard, report, dispatch              │
//! │   (throw | process abort | group abort)                    │
//! └────────────────────────────┬───────────────────────────────┘
//!                              ▼
//! ┌──────────────┐   ┌──────────────────┐   ┌─────────────────┐
//! │   capture    │──▶│  symbolization   │──▶│ stackscope-     │
//! │ (raw unwind) │   │ (dladdr, nm,     │   │ common          │
//! │              │   │  DWARF)          │   │ (tree + wire)   │
//! └──────────────┘   └──────────────────┘   └─────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`capture`]: raw stack walks for the current thread, directed-signal
//!   capture of other threads, whole-process aggregation
//! - [`symbolization`]: address → `{module, function, file, line}` with a
//!   lazily built nm symbol table and an in-process DWARF reader
//! - [`termination`]: abort pipeline, fatal-signal handlers, panic hook
//! - [`export`]: JSON export of aggregated stacks for offline tooling
//! - [`system`]: memory usage, wall-clock time, subprocess execution
//! - [`cli`]: argument parsing for the `stackscope` binary
//!
//! Resolution and capture failures never propagate as errors: frames
//! degrade to raw addresses and unsupported captures yield empty stacks, so
//! diagnostics code cannot become a new source of failure.

pub mod capture;
pub mod cli;
pub mod domain;
pub mod export;
pub mod symbolization;
pub mod system;
pub mod termination;

pub use capture::{capture_all_threads, capture_current_thread, capture_thread, CaptureOptions};
pub use termination::{abort, set_abort_behavior, set_error_handlers, AbortBehavior, AbortError};
