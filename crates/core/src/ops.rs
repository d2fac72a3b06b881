use std::ops::Range;

use crate::core::{AttrPatch, Marks, Node, Selection};

pub type Path = Vec<usize>;

/// Primitive mutations of the document tree. Applying an op yields its
/// inverse, which is what the undo stack stores.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    InsertText {
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        path: Path,
        node: Node,
    },
    RemoveNode {
        path: Path,
    },
    SetNodeAttrs {
        path: Path,
        patch: AttrPatch,
    },
    SetTextMarks {
        path: Path,
        marks: Marks,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionMeta {
    pub source: Option<String>,
}

/// A batch of ops applied atomically, recorded as a single undo step.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub ops: Vec<Op>,
    pub selection_after: Option<Selection>,
    pub meta: TransactionMeta,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
            meta: TransactionMeta::default(),
        }
    }

    pub fn selection_after(mut self, selection: Selection) -> Self {
        self.selection_after = Some(selection);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }
}
