//! Memory map introspection for the running process.
//!
//! Parses /proc/self/maps to determine the address range at which a binary
//! is loaded, which is what makes module-relative addresses computable for
//! position-independent executables (PIE).

use anyhow::{Context, Result};
use log::debug;

/// Memory range of a loaded binary in this process's address space.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range.
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// Find the full mapped range of `binary_path` in this process.
///
/// All mappings of the binary are folded into one range from the minimum
/// start to the maximum end.
///
/// # Errors
/// Returns an error if the maps file cannot be read or the binary has no
/// mapping.
pub fn executable_range(binary_path: &str) -> Result<MemoryRange> {
    let maps = read_maps()?;

    let mut start_addr: Option<u64> = None;
    let mut end_addr: Option<u64> = None;

    for line in maps.lines() {
        if !line.contains(binary_path) {
            continue;
        }
        // "start-end perms offset dev inode pathname"
        let Some(range) = line.split_whitespace().next() else {
            continue;
        };
        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let start = u64::from_str_radix(start, 16).context("failed to parse range start")?;
        let end = u64::from_str_radix(end, 16).context("failed to parse range end")?;
        start_addr = Some(start_addr.map_or(start, |s| s.min(start)));
        end_addr = Some(end_addr.map_or(end, |e| e.max(end)));
    }

    match (start_addr, end_addr) {
        (Some(start), Some(end)) => {
            debug!("executable range for {binary_path}: 0x{start:x} - 0x{end:x}");
            Ok(MemoryRange { start, end })
        }
        _ => Err(anyhow::anyhow!("no mapping found for {binary_path}")),
    }
}

#[cfg(target_os = "linux")]
fn read_maps() -> Result<String> {
    std::fs::read_to_string("/proc/self/maps").context("failed to read /proc/self/maps")
}

#[cfg(not(target_os = "linux"))]
fn read_maps() -> Result<String> {
    Err(anyhow::anyhow!("memory map introspection is only implemented on Linux"))
}
