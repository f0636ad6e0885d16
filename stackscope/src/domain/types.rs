//! Core identifier types.

use std::fmt;

/// Operating-system process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub i32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kernel thread identifier (distinct from `pthread_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(pub i32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which stacks a fatal report captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureScope {
    /// Only the thread that hit the fatal condition.
    #[default]
    ThreadLocal,
    /// Every live thread of the process, merged into one tree.
    AllThreads,
    /// All threads, plus notify the coordinating process group on abort.
    Distributed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_display() {
        assert_eq!(Pid(1234).to_string(), "1234");
        assert_eq!(Tid(42).to_string(), "42");
    }

    #[test]
    fn test_default_scope_is_thread_local() {
        assert_eq!(CaptureScope::default(), CaptureScope::ThreadLocal);
    }
}
