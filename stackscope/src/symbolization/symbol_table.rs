//! Cached symbol table of the running executable.
//!
//! Built at most once per process by dumping the executable's link-time
//! symbols with `nm`, then kept sorted for binary search. Concurrent first
//! callers block until the single build finishes. If the tool is missing or
//! fails, the table stays permanently degraded; resolution falls back to
//! raw addresses without ever retrying the external call.

use crate::domain::SymbolError;
use crate::system;
use log::warn;
use std::sync::OnceLock;

/// One symbol from the executable's symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    /// Link-time address of the symbol.
    pub address: u64,
    /// nm type character (`T`, `t`, `W`, ...).
    pub kind: char,
    /// Demangled symbol name.
    pub name: String,
}

/// The process-wide symbol table: sorted entries or a permanent error.
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
    error: Option<SymbolError>,
}

static TABLE: OnceLock<SymbolTable> = OnceLock::new();

/// Get the process-wide table, building it on first call.
pub fn ensure_loaded() -> &'static SymbolTable {
    TABLE.get_or_init(SymbolTable::load)
}

impl SymbolTable {
    fn load() -> Self {
        match Self::dump_executable() {
            Ok(entries) => Self { entries, error: None },
            Err(err) => {
                warn!("symbol table unavailable, frames degrade to raw addresses: {err}");
                Self { entries: Vec::new(), error: Some(err) }
            }
        }
    }

    fn dump_executable() -> Result<Vec<SymbolEntry>, SymbolError> {
        let exe = system::executable_path();
        let command = format!("nm -n --demangle '{}' 2>/dev/null", exe.display());
        let (output, code) = system::exec(&command)?;
        if code == 127 {
            return Err(SymbolError::ToolMissing("nm".to_string()));
        }
        if code != 0 {
            return Err(SymbolError::ToolFailed { code });
        }
        let entries = Self::parse_dump(&output);
        if entries.is_empty() {
            return Err(SymbolError::EmptyDump);
        }
        Ok(entries)
    }

    /// Parse `nm` output lines of the form `<hex address> <type> <name>`.
    /// Undefined symbols (no address column) are skipped. Demangled names
    /// may contain spaces, so only the first two columns are split off.
    fn parse_dump(output: &str) -> Vec<SymbolEntry> {
        let mut entries: Vec<SymbolEntry> = output
            .lines()
            .filter(|line| !line.starts_with(' '))
            .filter_map(|line| {
                let (addr, rest) = line.split_once(' ')?;
                let (kind, name) = rest.split_once(' ')?;
                let address = u64::from_str_radix(addr, 16).ok()?;
                let mut kind_chars = kind.chars();
                let kind = kind_chars.next()?;
                if kind_chars.next().is_some() || name.is_empty() {
                    return None;
                }
                Some(SymbolEntry { address, kind, name: name.trim().to_string() })
            })
            .collect();
        entries.sort_by_key(|e| e.address);
        entries
    }

    /// The build error, if the table is degraded.
    #[must_use]
    pub fn error(&self) -> Option<&SymbolError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last symbol at or below `address`, if any.
    #[must_use]
    pub fn nearest(&self, address: u64) -> Option<&SymbolEntry> {
        let index = self.entries.partition_point(|e| e.address <= address);
        if index == 0 {
            None
        } else {
            self.entries.get(index - 1)
        }
    }

    /// Like [`nearest`](Self::nearest) but restricted to text symbols, so
    /// low-valued data/TLS entries cannot swallow unmapped addresses.
    #[must_use]
    pub fn nearest_code(&self, address: u64) -> Option<&SymbolEntry> {
        let index = self.entries.partition_point(|e| e.address <= address);
        self.entries[..index]
            .iter()
            .rev()
            .find(|e| matches!(e.kind, 'T' | 't' | 'W' | 'w'))
    }
}
