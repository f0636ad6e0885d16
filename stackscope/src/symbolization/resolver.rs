//! The address resolver: raw return address in, best-effort frame out.

#![allow(unsafe_code)] // dladdr() requires unsafe

use crate::symbolization::{memory_maps, symbol_table, MemoryRange, Symbolizer};
use crate::system;
use log::warn;
use rustc_demangle::demangle;
use stackscope_common::{strip_path, StackFrame, StackSequence};
use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::{Mutex, OnceLock};

/// Resolves addresses for the running process. Infallible by contract:
/// whatever lookups fail, the returned frame still carries the raw address.
pub struct AddressResolver {
    executable: String,
    executable_range: Option<MemoryRange>,
    symbolizer: Option<Symbolizer>,
    cache: Mutex<HashMap<u64, StackFrame>>,
}

static RESOLVER: OnceLock<AddressResolver> = OnceLock::new();

/// The process-wide resolver, built on first use.
pub fn global() -> &'static AddressResolver {
    RESOLVER.get_or_init(AddressResolver::new)
}

impl AddressResolver {
    #[must_use]
    pub fn new() -> Self {
        let executable = system::executable_path().to_string_lossy().into_owned();
        let executable_range = memory_maps::executable_range(&executable).ok();
        let symbolizer = match Symbolizer::new(&executable) {
            Ok(symbolizer) => Some(symbolizer),
            Err(err) => {
                warn!("source-level lookup unavailable: {err:#}");
                None
            }
        };
        Self { executable, executable_range, symbolizer, cache: Mutex::new(HashMap::new()) }
    }

    /// Resolve one return address into a frame.
    ///
    /// Idempotent: with the symbol table already built, resolving the same
    /// address twice yields identical content (the second hit is cached).
    pub fn resolve(&self, address: u64) -> StackFrame {
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&address) {
                return hit.clone();
            }
        }

        let frame = self.resolve_uncached(address);

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(address, frame.clone());
        }
        frame
    }

    /// Resolve a whole raw stack, innermost first.
    #[must_use]
    pub fn resolve_all(&self, addresses: &[u64]) -> StackSequence {
        addresses.iter().map(|&a| self.resolve(a)).collect()
    }

    fn resolve_uncached(&self, address: u64) -> StackFrame {
        let mut frame = StackFrame::from_address(address);
        // Probe one byte back so a return address attributes to the call
        // site, not the instruction after it.
        let probe = address.saturating_sub(1);

        if let Some(lookup) = module_lookup(probe) {
            frame.module = lookup.module;
            frame.module_relative = address.saturating_sub(lookup.base);
            if let Some(symbol) = lookup.symbol {
                frame.function = format!("{:#}", demangle(&symbol));
            }
        }

        if !frame.is_resolved() {
            // Nothing owned the address dynamically; fall back to the
            // executable's link-time symbols (names come pre-demangled).
            // For a PIE executable the link-time addresses are module
            // relative, so translate through the mapped range first.
            let table_probe = match self.executable_range {
                Some(range) if range.contains(probe) => probe - range.start,
                _ => probe,
            };
            let table = symbol_table::ensure_loaded();
            if let Some(entry) = table.nearest_code(table_probe) {
                frame.module = self.executable.clone();
                frame.module_relative = table_probe.saturating_add(1);
                if frame.function.is_empty() {
                    frame.function = entry.name.clone();
                }
            }
        }

        if frame.is_resolved() && self.is_main_executable(&frame.module) {
            if let Some(symbolizer) = &self.symbolizer {
                let file_probe = if symbolizer.is_relocatable() {
                    frame.module_relative.saturating_sub(1)
                } else {
                    probe
                };
                let info = symbolizer.locate(file_probe);
                if frame.function.is_empty() {
                    if let Some(function) = info.function {
                        frame.function = function;
                    }
                }
                if let Some(file) = info.file {
                    frame.file = file;
                    frame.line = info.line.unwrap_or(0);
                }
            }
        }

        frame
    }

    /// Whether a module path names the running executable. `dladdr` may
    /// report the invocation path rather than the canonical one, so the
    /// final path component is compared when the full strings differ.
    fn is_main_executable(&self, module: &str) -> bool {
        module == self.executable
            || (!module.is_empty() && strip_path(module) == strip_path(&self.executable))
    }
}

impl Default for AddressResolver {
    fn default() -> Self {
        Self::new()
    }
}

struct ModuleLookup {
    module: String,
    base: u64,
    symbol: Option<String>,
}

#[cfg(unix)]
fn module_lookup(address: u64) -> Option<ModuleLookup> {
    let mut info = std::mem::MaybeUninit::<libc::Dl_info>::zeroed();
    let found = unsafe { libc::dladdr(address as usize as *const libc::c_void, info.as_mut_ptr()) };
    if found == 0 {
        return None;
    }
    let info = unsafe { info.assume_init() };
    if info.dli_fname.is_null() || info.dli_fbase.is_null() {
        return None;
    }
    let module = unsafe { CStr::from_ptr(info.dli_fname) }.to_string_lossy().into_owned();
    if module.is_empty() {
        return None;
    }
    let symbol = if info.dli_sname.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(info.dli_sname) }.to_string_lossy().into_owned())
    };
    Some(ModuleLookup { module, base: info.dli_fbase as usize as u64, symbol })
}

#[cfg(not(unix))]
fn module_lookup(_address: u64) -> Option<ModuleLookup> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_is_idempotent() {
        let resolver = global();
        let address = test_resolution_is_idempotent as usize as u64;
        let first = resolver.resolve(address);
        let second = resolver.resolve(address);
        assert_eq!(first, second);
        assert_eq!(first.return_address, address);
    }

    #[test]
    fn test_unmapped_address_degrades_to_raw() {
        // An address below every mapping and every link-time symbol: the
        // frame keeps its raw address and nothing else.
        let frame = global().resolve(1);
        assert_eq!(frame.return_address, 1);
        assert!(frame.module.is_empty(), "unexpected module: {}", frame.module);
        assert!(frame.function.is_empty(), "unexpected function: {}", frame.function);
        assert!(frame.file.is_empty());
        assert_eq!(frame.line, 0);
    }

    #[test]
    fn test_known_function_gets_module_attribution() {
        let resolver = global();
        let address = AddressResolver::new as usize as u64;
        let frame = resolver.resolve(address + 1);
        // dladdr must at minimum attribute the address to this executable.
        assert!(frame.is_resolved(), "no module for an address inside our own code");
        assert!(frame.module_relative > 0);
    }
}
