use penmark_core::{Editor, Marks};
use serde::Serialize;

use crate::command::{Alignment, ListKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatId {
    Bold,
    Italic,
    Underline,
    Heading1,
    Heading2,
    Heading3,
    Quote,
    OrderedList,
    UnorderedList,
    AlignLeft,
    AlignCenter,
    AlignRight,
}

/// The toolbar's view of the current selection. A boolean mark reads as
/// active only when it covers the entire selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ActiveFormats {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub heading: Option<u64>,
    pub quote: bool,
    pub list: Option<ListKind>,
    pub align: Alignment,
}

impl ActiveFormats {
    pub fn recompute(editor: &Editor) -> Self {
        let marks: Marks = editor
            .run_query("marks.get_active", None)
            .unwrap_or_default();
        let heading: Option<u64> = editor
            .run_query("block.heading_level", None)
            .unwrap_or_default();
        let quote: bool = editor
            .run_query("block.is_quote_active", None)
            .unwrap_or_default();
        let list: Option<String> = editor
            .run_query("list.active_type", None)
            .unwrap_or_default();
        let align: Option<String> = editor.run_query("block.align", None).unwrap_or_default();

        Self {
            bold: marks.bold,
            italic: marks.italic,
            underline: marks.underline,
            heading,
            quote,
            list: match list.as_deref() {
                Some("ordered") => Some(ListKind::Ordered),
                Some("unordered") => Some(ListKind::Unordered),
                _ => None,
            },
            align: match align.as_deref() {
                Some("center") => Alignment::Center,
                Some("right") => Alignment::Right,
                _ => Alignment::Left,
            },
        }
    }

    pub fn is_active(&self, id: FormatId) -> bool {
        match id {
            FormatId::Bold => self.bold,
            FormatId::Italic => self.italic,
            FormatId::Underline => self.underline,
            FormatId::Heading1 => self.heading == Some(1),
            FormatId::Heading2 => self.heading == Some(2),
            FormatId::Heading3 => self.heading == Some(3),
            FormatId::Quote => self.quote,
            FormatId::OrderedList => self.list == Some(ListKind::Ordered),
            FormatId::UnorderedList => self.list == Some(ListKind::Unordered),
            FormatId::AlignLeft => self.align == Alignment::Left,
            FormatId::AlignCenter => self.align == Alignment::Center,
            FormatId::AlignRight => self.align == Alignment::Right,
        }
    }
}
