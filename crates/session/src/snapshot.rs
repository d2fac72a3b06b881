use penmark_core::{Document, NodeId, Point, Selection};

/// A selection frozen by node identity instead of live paths. Resolving it
/// against a later tree answers the staleness question: if any referenced
/// node is gone, the snapshot no longer applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionSnapshot {
    pub anchor: (NodeId, usize),
    pub focus: (NodeId, usize),
}

impl SelectionSnapshot {
    pub fn capture(doc: &Document, selection: &Selection) -> Option<Self> {
        let anchor = doc.id_at(&selection.anchor.path)?;
        let focus = doc.id_at(&selection.focus.path)?;
        Some(Self {
            anchor: (anchor, selection.anchor.offset),
            focus: (focus, selection.focus.offset),
        })
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn resolve(&self, doc: &Document) -> Option<Selection> {
        let anchor = resolve_point(doc, self.anchor)?;
        let focus = resolve_point(doc, self.focus)?;
        Some(Selection { anchor, focus })
    }
}

fn resolve_point(doc: &Document, (id, offset): (NodeId, usize)) -> Option<Point> {
    let path = doc.path_of(id)?;
    Some(Point::new(path, offset))
}

/// Remembers the most recent in-editor selection so formatting still has a
/// target after focus moved to a dialog or toolbar button.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    latest: Option<SelectionSnapshot>,
}

impl SelectionTracker {
    pub fn capture(
        &mut self,
        doc: &Document,
        selection: &Selection,
    ) -> Option<SelectionSnapshot> {
        self.latest = SelectionSnapshot::capture(doc, selection);
        self.latest
    }

    pub fn latest(&self) -> Option<SelectionSnapshot> {
        self.latest
    }

    pub fn clear(&mut self) {
        self.latest = None;
    }
}
