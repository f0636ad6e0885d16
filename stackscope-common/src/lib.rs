//! # Shared Stack Data (capturing process ↔ collector)
//!
//! Defines the data structures and the wire encoding shared between the
//! process that captures call stacks and any process that consumes them.
//! Nothing in this crate depends on the capturing process being alive:
//! no pointer is ever interpreted on the receiving side, only the
//! module-relative address and the already-resolved text fields.
//!
//! ## Key Types
//!
//! - [`StackFrame`] - One resolved call site
//! - [`StackTree`] - Prefix-tree merge of many per-thread/per-process stacks
//! - [`wire`] - Version-tagged binary encoding for cross-process transport

pub mod frame;
pub mod tree;
pub mod wire;

pub use frame::{strip_path, StackFrame, StackSequence, MIN_MODULE_WIDTH};
pub use tree::StackTree;
pub use wire::{
    pack_frame, pack_sequence, pack_tree, unpack_frame, unpack_sequence, unpack_tree, WireError,
    WIRE_VERSION,
};
