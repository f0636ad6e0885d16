//! Prefix-tree aggregation of many call stacks.
//!
//! Merging N stacks that share a common prefix stores each shared frame once
//! with a contributor count instead of N times. A thousand threads parked in
//! the same epoll loop collapse into a single chain annotated `(x1000)`,
//! which is the common case for a hang or crash in shared infrastructure
//! code.

use crate::frame::{strip_path, StackFrame, StackSequence, MIN_MODULE_WIDTH};

/// One node of the aggregated stack tree.
///
/// The root is synthetic: its frame is empty and its `contributors` equals
/// the number of merged input stacks. Children diverge where the input
/// stacks diverge; sibling order is insertion order and carries no meaning
/// beyond stable display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StackTree {
    /// Number of input stacks whose path passes through this node.
    pub contributors: u32,

    /// The call site shared by all contributors at this depth.
    pub frame: StackFrame,

    /// Next-frame branches, keyed by [`StackFrame::merge_key`].
    pub children: Vec<StackTree>,
}

impl StackTree {
    /// Empty tree with no contributors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contributors == 0
    }

    /// Merge a batch of per-thread stacks into one tree.
    #[must_use]
    pub fn merge<I>(sequences: I) -> Self
    where
        I: IntoIterator<Item = StackSequence>,
    {
        let mut root = Self::new();
        for sequence in sequences {
            root.add(&sequence);
        }
        root
    }

    /// Insert one stack as a path from the root, splitting into a new
    /// sibling at the first frame that diverges from existing paths.
    pub fn add(&mut self, stack: &[StackFrame]) {
        self.contributors += 1;
        let mut node = self;
        for frame in stack {
            let key = frame.merge_key();
            let index = match node.children.iter().position(|c| c.frame.merge_key() == key) {
                Some(i) => {
                    node.children[i].contributors += 1;
                    i
                }
                None => {
                    node.children.push(StackTree {
                        contributors: 1,
                        frame: frame.clone(),
                        children: Vec::new(),
                    });
                    node.children.len() - 1
                }
            };
            node = &mut node.children[index];
        }
    }

    /// Total node count excluding the synthetic root.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.children.iter().map(|c| 1 + c.node_count()).sum()
    }

    /// Render the tree depth-first, one line per node, indented by depth
    /// and annotated with `(xN)` where more than one contributor passes
    /// through.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let width = self.module_width().max(MIN_MODULE_WIDTH);
        let mut lines = Vec::new();
        for child in &self.children {
            child.render_into(0, width, &mut lines);
        }
        lines
    }

    fn render_into(&self, depth: usize, width: usize, lines: &mut Vec<String>) {
        let mut line = format!("{}{}", "  ".repeat(depth), self.frame.render(width));
        if self.contributors > 1 {
            line.push_str(&format!(" (x{})", self.contributors));
        }
        lines.push(line);
        for child in &self.children {
            child.render_into(depth + 1, width, lines);
        }
    }

    fn module_width(&self) -> usize {
        let own = strip_path(&self.frame.module).len();
        self.children.iter().map(Self::module_width).max().unwrap_or(0).max(own)
    }
}
