//! JSON export of an aggregated stack tree.

use crate::domain::ExportError;
use crate::system;
use serde::Serialize;
use stackscope_common::StackTree;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Document wrapper so consumers can sanity-check provenance before
/// walking the tree.
#[derive(Serialize)]
struct StackDocument<'a> {
    version: u32,
    captured_at: f64,
    process: String,
    pid: i32,
    stack: &'a StackTree,
}

/// Writes an aggregated stack tree as pretty-printed JSON.
pub struct StackJsonExporter;

impl StackJsonExporter {
    /// # Errors
    /// Returns an error when the file cannot be created or written.
    pub fn export(tree: &StackTree, path: &Path) -> Result<(), ExportError> {
        let document = StackDocument {
            version: 1,
            captured_at: system::now(),
            process: system::executable_path().to_string_lossy().into_owned(),
            pid: system::process_id().0,
            stack: tree,
        };
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writer.flush()?;
        Ok(())
    }
}
