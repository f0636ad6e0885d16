//! Binary wire encoding for stacks crossing a process boundary.
//!
//! The stream is flat and self-describing: a leading version byte, fixed
//! width little-endian integers, `u16`-length-prefixed UTF-8 strings and
//! recursively encoded children with an explicit child count. A receiver
//! needs no shared address space or symbol cache to decode; only the
//! module-relative address and the resolved text survive transport.

use crate::frame::StackFrame;
use crate::tree::StackTree;
use thiserror::Error;

/// Current encoding version; decoding any other value is an error.
pub const WIRE_VERSION: u8 = 1;

/// Nesting bound while decoding a tree, far above any real stack depth.
const MAX_DECODE_DEPTH: usize = 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("unsupported wire version {found} (expected {expected})")]
    Version { found: u8, expected: u8 },

    #[error("truncated input: {needed} more bytes required")]
    Truncated { needed: usize },

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("tree nesting exceeds the decode limit of {MAX_DECODE_DEPTH}")]
    TooDeep,
}

/// Encode a single frame.
#[must_use]
pub fn pack_frame(frame: &StackFrame) -> Vec<u8> {
    let mut buf = vec![WIRE_VERSION];
    put_frame(&mut buf, frame);
    buf
}

/// Decode a single frame. Inverse of [`pack_frame`].
pub fn unpack_frame(bytes: &[u8]) -> Result<StackFrame, WireError> {
    let mut reader = Reader::new(bytes)?;
    reader.frame()
}

/// Encode a flat stack, innermost frame first.
#[must_use]
pub fn pack_sequence(frames: &[StackFrame]) -> Vec<u8> {
    let mut buf = vec![WIRE_VERSION];
    buf.extend_from_slice(&(frames.len() as u32).to_le_bytes());
    for frame in frames {
        put_frame(&mut buf, frame);
    }
    buf
}

/// Decode a flat stack. Inverse of [`pack_sequence`].
pub fn unpack_sequence(bytes: &[u8]) -> Result<Vec<StackFrame>, WireError> {
    let mut reader = Reader::new(bytes)?;
    let count = reader.u32()? as usize;
    let mut frames = Vec::new();
    for _ in 0..count {
        frames.push(reader.frame()?);
    }
    Ok(frames)
}

/// Encode an aggregated tree, root included.
#[must_use]
pub fn pack_tree(tree: &StackTree) -> Vec<u8> {
    let mut buf = vec![WIRE_VERSION];
    put_tree(&mut buf, tree);
    buf
}

/// Decode an aggregated tree. Inverse of [`pack_tree`].
pub fn unpack_tree(bytes: &[u8]) -> Result<StackTree, WireError> {
    let mut reader = Reader::new(bytes)?;
    reader.tree(0)
}

fn put_frame(buf: &mut Vec<u8>, frame: &StackFrame) {
    buf.extend_from_slice(&frame.return_address.to_le_bytes());
    buf.extend_from_slice(&frame.module_relative.to_le_bytes());
    buf.extend_from_slice(&frame.line.to_le_bytes());
    put_str(buf, &frame.module);
    put_str(buf, &frame.function);
    put_str(buf, &frame.file);
}

fn put_tree(buf: &mut Vec<u8>, node: &StackTree) {
    put_frame(buf, &node.frame);
    buf.extend_from_slice(&node.contributors.to_le_bytes());
    buf.extend_from_slice(&(node.children.len() as u32).to_le_bytes());
    for child in &node.children {
        put_tree(buf, child);
    }
}

fn put_str(buf: &mut Vec<u8>, value: &str) {
    // Symbol and path strings fit comfortably in u16; anything longer is
    // clamped at a char boundary rather than failing the whole capture.
    let mut bytes = value.as_bytes();
    if bytes.len() > usize::from(u16::MAX) {
        let mut end = usize::from(u16::MAX);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        bytes = &bytes[..end];
    }
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Result<Self, WireError> {
        let mut reader = Self { buf, pos: 0 };
        let version = reader.u8()?;
        if version != WIRE_VERSION {
            return Err(WireError::Version { found: version, expected: WIRE_VERSION });
        }
        Ok(reader)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(WireError::Truncated { needed: n - remaining });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    fn string(&mut self) -> Result<String, WireError> {
        let len = usize::from(self.u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    fn frame(&mut self) -> Result<StackFrame, WireError> {
        Ok(StackFrame {
            return_address: self.u64()?,
            module_relative: self.u64()?,
            line: self.u32()?,
            module: self.string()?,
            function: self.string()?,
            file: self.string()?,
        })
    }

    fn tree(&mut self, depth: usize) -> Result<StackTree, WireError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(WireError::TooDeep);
        }
        let frame = self.frame()?;
        let contributors = self.u32()?;
        let child_count = self.u32()? as usize;
        let mut children = Vec::new();
        for _ in 0..child_count {
            children.push(self.tree(depth + 1)?);
        }
        Ok(StackTree { contributors, frame, children })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::StackSequence;

    // Deterministic pseudo-random generator so the round-trip corpus does
    // not need an external crate.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            self.0
        }
    }

    fn synthetic_frame(rng: &mut Lcg) -> StackFrame {
        let rel = rng.next() % 0x10_0000;
        let resolved = rng.next() % 4 != 0;
        StackFrame {
            return_address: 0x5500_0000_0000 + rel,
            module_relative: if resolved { rel } else { 0 },
            module: if resolved { "/opt/app/server".to_string() } else { String::new() },
            function: if rng.next() % 3 == 0 { String::new() } else { format!("worker::step_{rel:x}") },
            file: if resolved { "src/worker.rs".to_string() } else { String::new() },
            line: (rng.next() % 2000) as u32,
        }
    }

    fn synthetic_sequence(rng: &mut Lcg, max_len: usize) -> StackSequence {
        let len = 1 + (rng.next() as usize) % max_len;
        (0..len).map(|_| synthetic_frame(rng)).collect()
    }

    #[test]
    fn test_frame_round_trip() {
        let mut rng = Lcg(7);
        for _ in 0..200 {
            let frame = synthetic_frame(&mut rng);
            let decoded = unpack_frame(&pack_frame(&frame)).expect("decode");
            assert_eq!(frame, decoded);
        }
    }

    #[test]
    fn test_frame_round_trip_empty_fields() {
        let frame = StackFrame::from_address(0);
        assert_eq!(frame, unpack_frame(&pack_frame(&frame)).expect("decode"));
    }

    #[test]
    fn test_sequence_round_trip() {
        let mut rng = Lcg(11);
        for _ in 0..50 {
            let sequence = synthetic_sequence(&mut rng, 100);
            let decoded = unpack_sequence(&pack_sequence(&sequence)).expect("decode");
            assert_eq!(sequence, decoded);
        }
    }

    #[test]
    fn test_tree_round_trip_over_merged_corpora() {
        let mut rng = Lcg(13);
        for &count in &[1usize, 2, 10, 1000] {
            // Shared prefix plus a random tail forces both chain reuse and
            // sibling splits in the merged tree.
            let prefix = synthetic_sequence(&mut rng, 10);
            let stacks: Vec<StackSequence> = (0..count)
                .map(|_| {
                    let mut stack = prefix.clone();
                    stack.extend(synthetic_sequence(&mut rng, 20));
                    stack
                })
                .collect();
            let tree = StackTree::merge(stacks);
            let decoded = unpack_tree(&pack_tree(&tree)).expect("decode");
            assert_eq!(tree, decoded);
        }
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let mut bytes = pack_frame(&StackFrame::from_address(1));
        bytes[0] = WIRE_VERSION + 1;
        assert_eq!(
            unpack_frame(&bytes),
            Err(WireError::Version { found: WIRE_VERSION + 1, expected: WIRE_VERSION })
        );
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let bytes = pack_tree(&StackTree::merge(vec![vec![StackFrame::from_address(1)]]));
        for len in 0..bytes.len() {
            let result = unpack_tree(&bytes[..len]);
            assert!(result.is_err(), "decode of {len}-byte prefix unexpectedly succeeded");
        }
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut frame = StackFrame::from_address(1);
        frame.function = "f".to_string();
        let mut bytes = pack_frame(&frame);
        // The function payload byte sits just before the empty file field
        // (two trailing length bytes).
        let index = bytes.len() - 3;
        bytes[index] = 0xff;
        assert_eq!(unpack_frame(&bytes), Err(WireError::InvalidUtf8));
    }

    #[test]
    fn test_overlong_string_is_clamped_not_lost() {
        let mut frame = StackFrame::from_address(1);
        frame.function = "f".repeat(usize::from(u16::MAX) + 100);
        let decoded = unpack_frame(&pack_frame(&frame)).expect("decode");
        assert_eq!(decoded.function.len(), usize::from(u16::MAX));
    }
}
