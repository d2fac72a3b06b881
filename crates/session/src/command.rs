use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToggleMark {
    Bold,
    Italic,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Heading1,
    Heading2,
    Heading3,
    Quote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListKind {
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryAction {
    Undo,
    Redo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Insertion {
    Link { href: String, text: String },
    Image { src: String, alt: String },
}

/// Everything the host surface can ask the editor to do, as data. The
/// session translates each variant into an engine command id plus arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatCommand {
    Toggle(ToggleMark),
    Block(BlockKind),
    Align(Alignment),
    List(ListKind),
    History(HistoryAction),
    Insert(Insertion),
}

impl FormatCommand {
    /// History actions run against the undo stacks directly and have no
    /// engine command.
    pub(crate) fn engine_command(&self) -> Option<(&'static str, Option<Value>)> {
        match self {
            FormatCommand::Toggle(ToggleMark::Bold) => Some(("marks.toggle_bold", None)),
            FormatCommand::Toggle(ToggleMark::Italic) => Some(("marks.toggle_italic", None)),
            FormatCommand::Toggle(ToggleMark::Underline) => Some(("marks.toggle_underline", None)),
            FormatCommand::Block(BlockKind::Heading1) => {
                Some(("block.set_heading", Some(json!({ "level": 1 }))))
            }
            FormatCommand::Block(BlockKind::Heading2) => {
                Some(("block.set_heading", Some(json!({ "level": 2 }))))
            }
            FormatCommand::Block(BlockKind::Heading3) => {
                Some(("block.set_heading", Some(json!({ "level": 3 }))))
            }
            FormatCommand::Block(BlockKind::Quote) => Some(("block.set_quote", None)),
            FormatCommand::Align(align) => {
                Some(("block.set_align", Some(json!({ "align": align.as_str() }))))
            }
            FormatCommand::List(ListKind::Ordered) => Some(("list.toggle_ordered", None)),
            FormatCommand::List(ListKind::Unordered) => Some(("list.toggle_unordered", None)),
            FormatCommand::History(_) => None,
            FormatCommand::Insert(Insertion::Link { href, text }) => Some((
                "insert.link",
                Some(json!({ "href": href, "text": text })),
            )),
            FormatCommand::Insert(Insertion::Image { src, alt }) => {
                Some(("image.insert", Some(json!({ "src": src, "alt": alt }))))
            }
        }
    }
}
