//! Thin wrappers over the OS services the subsystem needs: subprocess
//! execution with captured output, memory accounting, wall-clock time and
//! the path of the running executable.

#![allow(unsafe_code)] // sysconf() requires unsafe

use crate::domain::Pid;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Run a shell command, wait for it, and return its stdout and exit code.
///
/// # Errors
/// Returns an error only when the shell itself could not be spawned; a
/// failing command is reported through the exit code.
pub fn exec(cmd: &str) -> io::Result<(String, i32)> {
    let output = Command::new("sh").arg("-c").arg(cmd).output()?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let code = output.status.code().unwrap_or(-1);
    Ok((stdout, code))
}

/// Resident memory used by this process, in bytes. 0 when unavailable.
#[must_use]
pub fn memory_usage() -> u64 {
    #[cfg(target_os = "linux")]
    {
        // /proc/self/statm: size resident shared text lib data dt (pages)
        let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
            return 0;
        };
        let resident_pages: u64 = statm
            .split_whitespace()
            .nth(1)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        resident_pages * page_size()
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

/// Total physical memory of the machine, in bytes. 0 when unavailable.
#[must_use]
pub fn total_memory() -> u64 {
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    if pages <= 0 {
        return 0;
    }
    pages as u64 * page_size()
}

fn page_size() -> u64 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as u64
    }
}

/// This process's identifier.
#[must_use]
pub fn process_id() -> Pid {
    Pid(i32::try_from(std::process::id()).unwrap_or(0))
}

/// Wall-clock time in seconds since the Unix epoch.
#[must_use]
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Path of the running executable, resolved once per process.
#[must_use]
pub fn executable_path() -> &'static Path {
    static EXECUTABLE: OnceLock<PathBuf> = OnceLock::new();
    EXECUTABLE.get_or_init(|| {
        std::env::current_exe()
            .or_else(|_| std::fs::read_link("/proc/self/exe"))
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_captures_output_and_exit_code() {
        let (out, code) = exec("echo hello").expect("spawn sh");
        assert_eq!(out.trim(), "hello");
        assert_eq!(code, 0);

        let (_, code) = exec("exit 3").expect("spawn sh");
        assert_eq!(code, 3);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_memory_usage_is_nonzero() {
        assert!(memory_usage() > 0);
        assert!(total_memory() >= memory_usage());
    }

    #[test]
    fn test_executable_path_points_at_a_file() {
        assert!(executable_path().is_file());
    }

    #[test]
    fn test_now_is_recent() {
        // Sometime after 2020 and strictly increasing in coarse terms.
        assert!(now() > 1_577_836_800.0);
    }
}
