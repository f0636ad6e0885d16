//! In-process DWARF lookup for file/line (and function) information.

use anyhow::{Context as _, Result};
use gimli::{EndianArcSlice, RunTimeEndian};
use object::{Object, ObjectKind, ObjectSection};
use rustc_demangle::demangle;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// DWARF-backed source lookup for one binary.
///
/// Resolved addresses are cached; stacks routinely repeat the same frames
/// (event loops, lock acquisition, allocator entry points), so the cache
/// pays for itself on the second frame.
pub struct Symbolizer {
    ctx: Mutex<addr2line::Context<EndianArcSlice<RunTimeEndian>>>,
    relocatable: bool,
    cache: Mutex<HashMap<u64, SourceInfo>>,
}

/// Best-effort source information for one address.
#[derive(Debug, Clone, Default)]
pub struct SourceInfo {
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl Symbolizer {
    /// Load the DWARF debug info of the given binary.
    ///
    /// # Errors
    /// Returns an error if the binary cannot be read or parsed, or carries
    /// no loadable DWARF sections.
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Result<Self> {
        let binary_data = fs::read(binary_path.as_ref()).context("failed to read binary file")?;

        let obj_file = object::File::parse(&*binary_data).context("failed to parse object file")?;
        let relocatable = obj_file.kind() == ObjectKind::Dynamic;

        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianArcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianArcSlice::new(Arc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        let ctx = addr2line::Context::from_dwarf(dwarf)
            .context("failed to load DWARF debug information")?;

        Ok(Self { ctx: Mutex::new(ctx), relocatable, cache: Mutex::new(HashMap::new()) })
    }

    /// Whether the binary is position independent, i.e. DWARF addresses are
    /// module-relative rather than absolute.
    #[must_use]
    pub fn is_relocatable(&self) -> bool {
        self.relocatable
    }

    /// Look up the innermost function and source location for an address
    /// already translated into this binary's address space.
    pub fn locate(&self, file_address: u64) -> SourceInfo {
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&file_address) {
                return hit.clone();
            }
        }

        let mut info = SourceInfo::default();
        if let Ok(ctx) = self.ctx.lock() {
            if let Ok(mut frame_iter) = ctx.find_frames(file_address).skip_all_loads() {
                while let Ok(Some(frame)) = frame_iter.next() {
                    if info.function.is_none() {
                        info.function =
                            frame.function.and_then(|f| f.demangle().ok().map(|s| s.to_string()));
                    }
                    if info.file.is_none() {
                        if let Some(loc) = frame.location {
                            info.file = loc.file.map(std::string::ToString::to_string);
                            info.line = loc.line;
                        }
                    }
                    if info.function.is_some() && info.file.is_some() {
                        break;
                    }
                }
            }
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(file_address, info.clone());
        }
        info
    }

    /// Demangle a Rust symbol name.
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }
}
