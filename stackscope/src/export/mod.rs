//! Stack export functionality
//!
//! Writes aggregated stack trees in formats consumed outside the process.
//! Currently JSON for offline tooling; the compact binary form lives in
//! `stackscope_common::wire`.

pub mod stack_json;

pub use stack_json::StackJsonExporter;
