use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{
    AttrPatch, Attrs, Document, Editor, ElementNode, Marks, Node, Point, Selection, TextNode,
    clamp_to_char_boundary,
};
use crate::ops::{Op, Path, Transaction};

#[derive(Debug, Clone)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone)]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub handler:
        std::sync::Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            handler: std::sync::Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: std::sync::Arc<dyn Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: String,
    pub role: NodeRole,
    pub is_void: bool,
    pub children: ChildConstraint,
}

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op>;
}

pub trait EditorPlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    node_specs: HashMap<String, NodeSpec>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn EditorPlugin>>) -> Result<Self, String> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    /// The full formatting surface: paragraph, marks, headings, quotes,
    /// lists, alignment, images and links.
    pub fn standard() -> Self {
        let plugins: Vec<Box<dyn EditorPlugin>> = vec![
            Box::new(CoreParagraphPlugin),
            Box::new(MarksPlugin),
            Box::new(HeadingPlugin),
            Box::new(QuotePlugin),
            Box::new(ListPlugin),
            Box::new(AlignPlugin),
            Box::new(ImagePlugin),
            Box::new(LinkPlugin),
        ];
        Self::new(plugins).expect("standard registry must be valid")
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn EditorPlugin>) -> Result<(), String> {
        for spec in plugin.node_specs() {
            if self.node_specs.contains_key(&spec.kind) {
                return Err(format!("Duplicate node spec kind: {}", spec.kind));
            }
            self.node_specs.insert(spec.kind.clone(), spec);
        }

        self.normalize_passes.extend(plugin.normalize_passes());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(format!("Duplicate command id: {}", cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(format!("Duplicate query id: {}", query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        Ok(())
    }

    pub fn node_specs(&self) -> &HashMap<String, NodeSpec> {
        &self.node_specs
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn normalize(&self, doc: &Document) -> Vec<Op> {
        let mut ops: Vec<Op> = Vec::new();
        for pass in &self.normalize_passes {
            ops.extend(pass.run(doc, self));
        }
        ops
    }

    pub fn normalize_selection(&self, doc: &Document, selection: &Selection) -> Selection {
        let fallback = first_text_point(doc).unwrap_or(Point {
            path: vec![0],
            offset: 0,
        });

        let anchor =
            normalize_point_to_existing_text(doc, &selection.anchor).unwrap_or_else(|| {
                normalize_point_to_existing_text(doc, &selection.focus)
                    .unwrap_or_else(|| fallback.clone())
            });
        let focus = normalize_point_to_existing_text(doc, &selection.focus)
            .unwrap_or_else(|| anchor.clone());

        Selection { anchor, focus }
    }

    pub fn is_known_kind(&self, kind: &str) -> bool {
        self.node_specs.contains_key(kind)
    }
}

fn first_text_point(doc: &Document) -> Option<Point> {
    fn walk(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => {
                    let point = Point {
                        path: path.clone(),
                        offset: 0,
                    };
                    path.pop();
                    return Some(point);
                }
                Node::Element(el) => {
                    if let Some(point) = walk(&el.children, path) {
                        path.pop();
                        return Some(point);
                    }
                }
                Node::Void(_) => {}
            }
            path.pop();
        }
        None
    }

    walk(&doc.children, &mut Vec::new())
}

fn normalize_point_to_existing_text(doc: &Document, point: &Point) -> Option<Point> {
    if point.path.is_empty() || doc.children.is_empty() {
        return None;
    }

    fn first_text_descendant(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => {
                    let point = Point {
                        path: path.clone(),
                        offset: 0,
                    };
                    path.pop();
                    return Some(point);
                }
                Node::Element(el) => {
                    if let Some(point) = first_text_descendant(&el.children, path) {
                        path.pop();
                        return Some(point);
                    }
                }
                Node::Void(_) => {}
            }
            path.pop();
        }
        None
    }

    let mut resolved_path: Vec<usize> = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved_path.push(ix);
        let node = &children[ix];
        match node {
            Node::Text(t) => {
                return Some(Point {
                    path: resolved_path,
                    offset: point.offset.min(t.text.len()),
                });
            }
            Node::Element(el) => {
                children = &el.children;
            }
            Node::Void(_) => {
                break;
            }
        }
    }

    let node = doc.node_at(&resolved_path)?;
    match node {
        Node::Text(t) => Some(Point {
            path: resolved_path,
            offset: point.offset.min(t.text.len()),
        }),
        Node::Element(el) => first_text_descendant(&el.children, &mut resolved_path),
        Node::Void(_) => None,
    }
}

struct CoreParagraphPlugin;

impl EditorPlugin for CoreParagraphPlugin {
    fn id(&self) -> &'static str {
        "core.paragraph"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: "paragraph".to_string(),
            role: NodeRole::Block,
            is_void: false,
            children: ChildConstraint::InlineOnly,
        }]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(EnsureTextBlockHasLeaf),
            Box::new(MergeAdjacentTextRuns),
            Box::new(EnsureTrailingTextBlock),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.set_paragraph", "Set paragraph", |editor, _args| {
                retarget_selected_blocks(editor, BlockTarget::Paragraph, "command:block.set_paragraph")
                    .map_err(CommandError::new)
                    .and_then(|tx| {
                        if tx.ops.is_empty() {
                            return Ok(());
                        }
                        editor.apply(tx).map_err(|e| {
                            CommandError::new(format!("Failed to set paragraph: {e:?}"))
                        })
                    })
            })
            .description("Convert the selected block(s) back to plain paragraphs."),
            CommandSpec::new("text.insert", "Insert text", |editor, args| {
                let text = args
                    .as_ref()
                    .and_then(|v| v.get("text"))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| CommandError::new("Missing args.text"))?
                    .to_string();
                insert_text_at_selection(editor, text)
                    .map_err(CommandError::new)
                    .and_then(|tx| {
                        editor
                            .apply(tx)
                            .map_err(|e| CommandError::new(format!("Failed to insert text: {e:?}")))
                    })
            })
            .description("Insert typed text at the caret, replacing the selected range."),
        ]
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

struct EnsureTextBlockHasLeaf;

impl NormalizePass for EnsureTextBlockHasLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_inline_only_blocks_have_text_leaf"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(
            children: &[Node],
            path: &mut Vec<usize>,
            registry: &PluginRegistry,
            ops: &mut Vec<Op>,
        ) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                let spec_children = registry
                    .node_specs
                    .get(&el.kind)
                    .map(|s| s.children.clone())
                    .unwrap_or(ChildConstraint::Any);

                if spec_children == ChildConstraint::InlineOnly {
                    let has_text = el.children.iter().any(|n| matches!(n, Node::Text(_)));
                    if !has_text {
                        let mut insert_path = path.clone();
                        insert_path.push(0);
                        ops.push(Op::InsertNode {
                            path: insert_path,
                            node: Node::Text(TextNode::empty()),
                        });
                    }
                } else {
                    walk(&el.children, path, registry, ops);
                }

                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), registry, &mut ops);
        ops
    }
}

struct MergeAdjacentTextRuns;

impl NormalizePass for MergeAdjacentTextRuns {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_runs"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(
            children: &[Node],
            path: &mut Vec<usize>,
            registry: &PluginRegistry,
            ops: &mut Vec<Op>,
        ) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                let spec_children = registry
                    .node_specs
                    .get(&el.kind)
                    .map(|s| s.children.clone())
                    .unwrap_or_else(|| {
                        if el.children.iter().any(|n| matches!(n, Node::Text(_))) {
                            ChildConstraint::InlineOnly
                        } else {
                            ChildConstraint::Any
                        }
                    });

                if spec_children == ChildConstraint::InlineOnly {
                    if el.children.len() >= 2 {
                        let mut ix = el.children.len();
                        while ix > 0 {
                            ix -= 1;
                            let Node::Text(right) = &el.children[ix] else {
                                continue;
                            };

                            let mut start = ix;
                            while start > 0 {
                                let Some(Node::Text(left)) = el.children.get(start - 1) else {
                                    break;
                                };
                                if left.marks != right.marks {
                                    break;
                                }
                                start -= 1;
                            }

                            if start == ix {
                                continue;
                            }

                            let Some(Node::Text(first)) = el.children.get(start) else {
                                continue;
                            };
                            let mut appended = String::new();
                            for node in el.children.iter().take(ix + 1).skip(start + 1) {
                                if let Node::Text(t) = node {
                                    appended.push_str(&t.text);
                                }
                            }

                            if !appended.is_empty() {
                                let mut insert_text_path = path.clone();
                                insert_text_path.push(start);
                                ops.push(Op::InsertText {
                                    path: insert_text_path,
                                    offset: first.text.len(),
                                    text: appended,
                                });
                            }

                            for remove_ix in (start + 1..=ix).rev() {
                                let mut remove_path = path.clone();
                                remove_path.push(remove_ix);
                                ops.push(Op::RemoveNode { path: remove_path });
                            }

                            ix = start;
                        }
                    }
                } else {
                    walk(&el.children, path, registry, ops);
                }

                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), registry, &mut ops);

        ops
    }
}

struct EnsureTrailingTextBlock;

impl NormalizePass for EnsureTrailingTextBlock {
    fn id(&self) -> &'static str {
        "core.ensure_trailing_text_block"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        // A void block at the end leaves the caret nowhere to land.
        if matches!(doc.children.last(), Some(Node::Void(_))) {
            return vec![Op::InsertNode {
                path: vec![doc.children.len()],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

struct MarksPlugin;

impl EditorPlugin for MarksPlugin {
    fn id(&self) -> &'static str {
        "marks"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("marks.toggle_bold", "Toggle bold", |editor, _args| {
                toggle_bold(editor)
                    .map_err(CommandError::new)
                    .and_then(|tx| {
                        editor
                            .apply(tx)
                            .map_err(|e| CommandError::new(format!("Failed to toggle bold: {e:?}")))
                    })
            })
            .description("Toggle bold on the current selection or caret."),
            CommandSpec::new("marks.toggle_italic", "Toggle italic", |editor, _args| {
                toggle_italic(editor)
                    .map_err(CommandError::new)
                    .and_then(|tx| {
                        editor.apply(tx).map_err(|e| {
                            CommandError::new(format!("Failed to toggle italic: {e:?}"))
                        })
                    })
            })
            .description("Toggle italic on the current selection or caret."),
            CommandSpec::new(
                "marks.toggle_underline",
                "Toggle underline",
                |editor, _args| {
                    toggle_underline(editor)
                        .map_err(CommandError::new)
                        .and_then(|tx| {
                            editor.apply(tx).map_err(|e| {
                                CommandError::new(format!("Failed to toggle underline: {e:?}"))
                            })
                        })
                },
            )
            .description("Toggle underline on the current selection or caret."),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec {
                id: "marks.get_active".to_string(),
                handler: std::sync::Arc::new(|editor, _args| {
                    serde_json::to_value(active_marks(editor))
                        .map_err(|err| QueryError::new(format!("Failed to encode marks: {err}")))
                }),
            },
            QuerySpec {
                id: "marks.is_bold_active".to_string(),
                handler: std::sync::Arc::new(|editor, _args| {
                    Ok(Value::Bool(active_marks(editor).bold))
                }),
            },
            QuerySpec {
                id: "marks.is_italic_active".to_string(),
                handler: std::sync::Arc::new(|editor, _args| {
                    Ok(Value::Bool(active_marks(editor).italic))
                }),
            },
            QuerySpec {
                id: "marks.is_underline_active".to_string(),
                handler: std::sync::Arc::new(|editor, _args| {
                    Ok(Value::Bool(active_marks(editor).underline))
                }),
            },
            QuerySpec {
                id: "marks.has_link_active".to_string(),
                handler: std::sync::Arc::new(|editor, _args| {
                    Ok(Value::Bool(active_marks(editor).link.is_some()))
                }),
            },
        ]
    }
}

struct HeadingPlugin;

impl EditorPlugin for HeadingPlugin {
    fn id(&self) -> &'static str {
        "heading"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: "heading".to_string(),
            role: NodeRole::Block,
            is_void: false,
            children: ChildConstraint::InlineOnly,
        }]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeHeadingLevels)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.set_heading", "Set heading", |editor, args| {
                let level = args
                    .as_ref()
                    .and_then(|v| v.get("level"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(1)
                    .clamp(1, 3);
                retarget_selected_blocks(
                    editor,
                    BlockTarget::Heading(level),
                    "command:block.set_heading",
                )
                .map_err(CommandError::new)
                .and_then(|tx| {
                    if tx.ops.is_empty() {
                        return Ok(());
                    }
                    editor
                        .apply(tx)
                        .map_err(|e| CommandError::new(format!("Failed to set heading: {e:?}")))
                })
            })
            .description("Convert the selected block(s) into a heading."),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec {
            id: "block.heading_level".to_string(),
            handler: std::sync::Arc::new(|editor, _args| Ok(active_heading_level(editor))),
        }]
    }
}

struct NormalizeHeadingLevels;

impl NormalizePass for NormalizeHeadingLevels {
    fn id(&self) -> &'static str {
        "heading.normalize_levels"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();
        for block in text_blocks_in_order(doc, registry) {
            if block.el.kind != "heading" {
                continue;
            }
            let level = block
                .el
                .attrs
                .get("level")
                .and_then(|v| v.as_u64())
                .unwrap_or(1)
                .clamp(1, 3);
            let current = block.el.attrs.get("level").and_then(|v| v.as_u64());
            if current != Some(level) {
                let mut set = Attrs::default();
                set.insert(
                    "level".to_string(),
                    Value::Number(serde_json::Number::from(level)),
                );
                ops.push(Op::SetNodeAttrs {
                    path: block.path.clone(),
                    patch: AttrPatch {
                        set,
                        remove: Vec::new(),
                    },
                });
            }
        }
        ops
    }
}

struct QuotePlugin;

impl EditorPlugin for QuotePlugin {
    fn id(&self) -> &'static str {
        "quote"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: "quote".to_string(),
            role: NodeRole::Block,
            is_void: false,
            children: ChildConstraint::InlineOnly,
        }]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.set_quote", "Set quote", |editor, _args| {
                retarget_selected_blocks(editor, BlockTarget::Quote, "command:block.set_quote")
                    .map_err(CommandError::new)
                    .and_then(|tx| {
                        if tx.ops.is_empty() {
                            return Ok(());
                        }
                        editor
                            .apply(tx)
                            .map_err(|e| CommandError::new(format!("Failed to set quote: {e:?}")))
                    })
            })
            .description("Convert the selected block(s) into quote blocks."),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec {
            id: "block.is_quote_active".to_string(),
            handler: std::sync::Arc::new(|editor, _args| {
                Ok(Value::Bool(active_block_kind(editor) == Some("quote")))
            }),
        }]
    }
}

struct ListPlugin;

impl EditorPlugin for ListPlugin {
    fn id(&self) -> &'static str {
        "list"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: "list_item".to_string(),
            role: NodeRole::Block,
            is_void: false,
            children: ChildConstraint::InlineOnly,
        }]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeListTypes)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("list.toggle_ordered", "Toggle ordered list", |editor, _args| {
                toggle_list(editor, "ordered", "command:list.toggle_ordered")
                    .map_err(CommandError::new)
                    .and_then(|tx| {
                        if tx.ops.is_empty() {
                            return Ok(());
                        }
                        editor.apply(tx).map_err(|e| {
                            CommandError::new(format!("Failed to toggle ordered list: {e:?}"))
                        })
                    })
            })
            .description("Toggle the selected block(s) between ordered list items and paragraphs."),
            CommandSpec::new(
                "list.toggle_unordered",
                "Toggle unordered list",
                |editor, _args| {
                    toggle_list(editor, "unordered", "command:list.toggle_unordered")
                        .map_err(CommandError::new)
                        .and_then(|tx| {
                            if tx.ops.is_empty() {
                                return Ok(());
                            }
                            editor.apply(tx).map_err(|e| {
                                CommandError::new(format!("Failed to toggle unordered list: {e:?}"))
                            })
                        })
                },
            )
            .description("Toggle the selected block(s) between bullet list items and paragraphs."),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec {
            id: "list.active_type".to_string(),
            handler: std::sync::Arc::new(|editor, _args| Ok(active_list_type(editor))),
        }]
    }
}

struct NormalizeListTypes;

impl NormalizePass for NormalizeListTypes {
    fn id(&self) -> &'static str {
        "list.normalize_types"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();
        for block in text_blocks_in_order(doc, registry) {
            if block.el.kind != "list_item" {
                continue;
            }
            let current = block.el.attrs.get("list").and_then(|v| v.as_str());
            if matches!(current, Some("ordered") | Some("unordered")) {
                continue;
            }
            let mut set = Attrs::default();
            set.insert(
                "list".to_string(),
                Value::String("unordered".to_string()),
            );
            ops.push(Op::SetNodeAttrs {
                path: block.path.clone(),
                patch: AttrPatch {
                    set,
                    remove: Vec::new(),
                },
            });
        }
        ops
    }
}

struct AlignPlugin;

impl EditorPlugin for AlignPlugin {
    fn id(&self) -> &'static str {
        "align"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeAlignValues)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.set_align", "Set alignment", |editor, args| {
                let align = args
                    .as_ref()
                    .and_then(|v| v.get("align"))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| CommandError::new("Missing args.align"))?
                    .to_string();
                set_block_align(editor, align)
                    .map_err(CommandError::new)
                    .and_then(|tx| {
                        if tx.ops.is_empty() {
                            return Ok(());
                        }
                        editor
                            .apply(tx)
                            .map_err(|e| CommandError::new(format!("Failed to set align: {e:?}")))
                    })
            })
            .description("Align the selected block(s) left, center or right."),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec {
            id: "block.align".to_string(),
            handler: std::sync::Arc::new(|editor, _args| Ok(active_block_align(editor))),
        }]
    }
}

struct NormalizeAlignValues;

impl NormalizePass for NormalizeAlignValues {
    fn id(&self) -> &'static str {
        "align.normalize_values"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        // Left is the absence of the attribute; anything else is invalid.
        let mut ops = Vec::new();
        for block in text_blocks_in_order(doc, registry) {
            let Some(align) = block.el.attrs.get("align") else {
                continue;
            };
            if matches!(align.as_str(), Some("center") | Some("right")) {
                continue;
            }
            ops.push(Op::SetNodeAttrs {
                path: block.path.clone(),
                patch: AttrPatch {
                    set: Attrs::default(),
                    remove: vec!["align".to_string()],
                },
            });
        }
        ops
    }
}

struct ImagePlugin;

impl EditorPlugin for ImagePlugin {
    fn id(&self) -> &'static str {
        "image"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: "image".to_string(),
            role: NodeRole::Block,
            is_void: true,
            children: ChildConstraint::None,
        }]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("image.insert", "Insert image", |editor, args| {
                let src = args
                    .as_ref()
                    .and_then(|v| v.get("src"))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| CommandError::new("Missing args.src"))?
                    .to_string();
                let alt = args
                    .as_ref()
                    .and_then(|v| v.get("alt"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                insert_image(editor, src, alt)
                    .map_err(CommandError::new)
                    .and_then(|tx| {
                        editor
                            .apply(tx)
                            .map_err(|e| CommandError::new(format!("Failed to insert image: {e:?}")))
                    })
            })
            .description("Insert an image block after the current block."),
        ]
    }
}

struct LinkPlugin;

impl EditorPlugin for LinkPlugin {
    fn id(&self) -> &'static str {
        "link"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("insert.link", "Insert link", |editor, args| {
                let href = args
                    .as_ref()
                    .and_then(|v| v.get("href"))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| CommandError::new("Missing args.href"))?
                    .to_string();
                let text = args
                    .as_ref()
                    .and_then(|v| v.get("text"))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| CommandError::new("Missing args.text"))?
                    .to_string();
                insert_link(editor, href, text)
                    .map_err(CommandError::new)
                    .and_then(|tx| {
                        editor
                            .apply(tx)
                            .map_err(|e| CommandError::new(format!("Failed to insert link: {e:?}")))
                    })
            })
            .description("Insert linked text at the caret, replacing a same-run selection."),
        ]
    }
}

fn active_block_kind(editor: &Editor) -> Option<&'static str> {
    let focus = &editor.selection().focus;
    let block_path = focus.path.split_last().map(|(_, p)| p)?;
    let Some(Node::Element(el)) = editor.doc().node_at(block_path) else {
        return None;
    };
    match el.kind.as_str() {
        "paragraph" => Some("paragraph"),
        "heading" => Some("heading"),
        "quote" => Some("quote"),
        "list_item" => Some("list_item"),
        _ => None,
    }
}

fn active_heading_level(editor: &Editor) -> Value {
    let focus = &editor.selection().focus;
    let Some(block_path) = focus.path.split_last().map(|(_, p)| p) else {
        return Value::Null;
    };
    let Some(Node::Element(el)) = editor.doc().node_at(block_path) else {
        return Value::Null;
    };
    if el.kind != "heading" {
        return Value::Null;
    }
    let level = el
        .attrs
        .get("level")
        .and_then(|v| v.as_u64())
        .unwrap_or(1)
        .clamp(1, 3);
    Value::Number(serde_json::Number::from(level))
}

// Alignment and list state follow the same uniformity rule as boolean
// marks: a value is reported only when every selected block agrees.
fn active_block_align(editor: &Editor) -> Value {
    let Ok((blocks, a, b)) = selected_block_range(editor) else {
        return Value::Null;
    };

    let mut agreed: Option<&'static str> = None;
    for block in blocks.iter().take(b + 1).skip(a) {
        let align = match block.el.attrs.get("align").and_then(|v| v.as_str()) {
            Some("center") => "center",
            Some("right") => "right",
            _ => "left",
        };
        match agreed {
            None => agreed = Some(align),
            Some(prev) if prev == align => {}
            Some(_) => return Value::Null,
        }
    }

    match agreed {
        Some(align @ ("center" | "right")) => Value::String(align.to_string()),
        _ => Value::Null,
    }
}

fn active_list_type(editor: &Editor) -> Value {
    let Ok((blocks, a, b)) = selected_block_range(editor) else {
        return Value::Null;
    };

    let mut agreed: Option<&'static str> = None;
    for block in blocks.iter().take(b + 1).skip(a) {
        if block.el.kind != "list_item" {
            return Value::Null;
        }
        let list = match block.el.attrs.get("list").and_then(|v| v.as_str()) {
            Some("ordered") => "ordered",
            _ => "unordered",
        };
        match agreed {
            None => agreed = Some(list),
            Some(prev) if prev == list => {}
            Some(_) => return Value::Null,
        }
    }

    match agreed {
        Some(list) => Value::String(list.to_string()),
        None => Value::Null,
    }
}

/// The shape a block-level command converts text blocks into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockTarget {
    Paragraph,
    Heading(u64),
    Quote,
    ListItem(ListType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListType {
    Ordered,
    Unordered,
}

impl ListType {
    fn as_str(self) -> &'static str {
        match self {
            ListType::Ordered => "ordered",
            ListType::Unordered => "unordered",
        }
    }
}

fn block_matches_target(el: &ElementNode, target: BlockTarget) -> bool {
    match target {
        BlockTarget::Paragraph => el.kind == "paragraph",
        BlockTarget::Heading(level) => {
            el.kind == "heading"
                && el
                    .attrs
                    .get("level")
                    .and_then(|v| v.as_u64())
                    .map(|l| l.clamp(1, 3))
                    == Some(level)
        }
        BlockTarget::Quote => el.kind == "quote",
        BlockTarget::ListItem(list) => {
            el.kind == "list_item"
                && el.attrs.get("list").and_then(|v| v.as_str()) == Some(list.as_str())
        }
    }
}

fn retarget_node(el: &ElementNode, target: BlockTarget) -> Node {
    let mut attrs = el.attrs.clone();
    attrs.remove("level");
    attrs.remove("list");
    let kind = match target {
        BlockTarget::Paragraph => "paragraph",
        BlockTarget::Heading(level) => {
            attrs.insert(
                "level".to_string(),
                Value::Number(serde_json::Number::from(level)),
            );
            "heading"
        }
        BlockTarget::Quote => "quote",
        BlockTarget::ListItem(list) => {
            attrs.insert("list".to_string(), Value::String(list.as_str().to_string()));
            "list_item"
        }
    };
    // Children keep their identity across the swap so external references
    // to text runs survive a block retarget.
    Node::Element(ElementNode {
        kind: kind.to_string(),
        attrs,
        children: el.children.clone(),
        ..el.clone()
    })
}

fn selected_block_range(
    editor: &Editor,
) -> Result<(Vec<TextBlockPath>, usize, usize), String> {
    let sel = editor.selection().clone();
    let (start, end) = ordered_selection_points(&sel);
    let Some(start_block_path) = start.path.split_last().map(|(_, p)| p.to_vec()) else {
        return Err("Selection start is not in a text block".into());
    };
    let Some(end_block_path) = end.path.split_last().map(|(_, p)| p.to_vec()) else {
        return Err("Selection end is not in a text block".into());
    };

    let blocks: Vec<TextBlockPath> = text_blocks_in_order(editor.doc(), editor.registry())
        .into_iter()
        .map(|b| TextBlockPath {
            path: b.path,
            el: b.el.clone(),
        })
        .collect();
    let start_index = blocks
        .iter()
        .position(|b| b.path == start_block_path)
        .ok_or_else(|| "Selection start is not in a text block".to_string())?;
    let end_index = blocks
        .iter()
        .position(|b| b.path == end_block_path)
        .ok_or_else(|| "Selection end is not in a text block".to_string())?;

    let (a, b) = if start_index <= end_index {
        (start_index, end_index)
    } else {
        (end_index, start_index)
    };
    Ok((blocks, a, b))
}

struct TextBlockPath {
    path: Path,
    el: ElementNode,
}

fn retarget_selected_blocks(
    editor: &Editor,
    target: BlockTarget,
    source: &'static str,
) -> Result<Transaction, String> {
    let selection_after = editor.selection().clone();
    let (blocks, a, b) = selected_block_range(editor)?;

    let mut ops: Vec<Op> = Vec::new();
    for block in blocks.iter().take(b + 1).skip(a) {
        if block_matches_target(&block.el, target) {
            continue;
        }
        ops.push(Op::RemoveNode {
            path: block.path.clone(),
        });
        ops.push(Op::InsertNode {
            path: block.path.clone(),
            node: retarget_node(&block.el, target),
        });
    }

    Ok(Transaction::new(ops)
        .selection_after(selection_after)
        .source(source))
}

fn toggle_list(
    editor: &Editor,
    list: &str,
    source: &'static str,
) -> Result<Transaction, String> {
    let list = match list {
        "ordered" => ListType::Ordered,
        "unordered" => ListType::Unordered,
        _ => return Err("Invalid list type".into()),
    };

    let (blocks, a, b) = selected_block_range(editor)?;
    let all_in_list = blocks
        .iter()
        .take(b + 1)
        .skip(a)
        .all(|block| block_matches_target(&block.el, BlockTarget::ListItem(list)));

    let target = if all_in_list {
        BlockTarget::Paragraph
    } else {
        BlockTarget::ListItem(list)
    };
    retarget_selected_blocks(editor, target, source)
}

fn set_block_align(editor: &mut Editor, align: String) -> Result<Transaction, String> {
    let align = match align.as_str() {
        "left" | "center" | "right" => align,
        _ => return Err("Invalid align value".into()),
    };

    let selection_after = editor.selection().clone();
    let (blocks, a, b) = selected_block_range(editor)?;

    let mut ops: Vec<Op> = Vec::new();
    for block in blocks.iter().take(b + 1).skip(a) {
        let el = &block.el;

        if align == "left" {
            if el.attrs.get("align").is_some() {
                ops.push(Op::SetNodeAttrs {
                    path: block.path.clone(),
                    patch: AttrPatch {
                        set: Attrs::default(),
                        remove: vec!["align".to_string()],
                    },
                });
            }
            continue;
        }

        if el.attrs.get("align").and_then(|v| v.as_str()) == Some(align.as_str()) {
            continue;
        }

        let mut set = Attrs::default();
        set.insert("align".to_string(), Value::String(align.clone()));
        ops.push(Op::SetNodeAttrs {
            path: block.path.clone(),
            patch: AttrPatch {
                set,
                remove: Vec::new(),
            },
        });
    }

    Ok(Transaction::new(ops)
        .selection_after(selection_after)
        .source("command:block.set_align"))
}

fn insert_image(editor: &Editor, src: String, alt: String) -> Result<Transaction, String> {
    let focus = editor.selection().focus.clone();
    let block_path = focus.path.split_last().map(|(_, p)| p).unwrap_or(&[]);

    let (parent_path, insert_at) = if block_path.is_empty() {
        (Vec::new(), editor.doc().children.len())
    } else {
        let (block_ix, parent) = block_path
            .split_last()
            .ok_or_else(|| "No active block".to_string())?;
        (parent.to_vec(), block_ix + 1)
    };

    let image_path = {
        let mut path = parent_path.clone();
        path.push(insert_at);
        path
    };
    let paragraph_element_path = {
        let mut path = parent_path.clone();
        path.push(insert_at + 1);
        path
    };
    let paragraph_text_path = {
        let mut path = paragraph_element_path.clone();
        path.push(0);
        path
    };

    Ok(Transaction::new(vec![
        Op::InsertNode {
            path: image_path,
            node: Node::image(src, alt),
        },
        Op::InsertNode {
            path: paragraph_element_path.clone(),
            node: Node::paragraph(""),
        },
    ])
    .selection_after(Selection::collapsed(Point::new(paragraph_text_path, 0)))
    .source("command:image.insert"))
}

fn insert_link(editor: &Editor, href: String, text: String) -> Result<Transaction, String> {
    let sel = editor.selection().clone();
    let run = TextNode::new(
        text,
        Marks {
            link: Some(href),
            ..Marks::default()
        },
    );

    if !sel.is_collapsed() && sel.anchor.path == sel.focus.path {
        // A selection inside a single run is replaced by the link text.
        let (start, end) = ordered_selection_points(&sel);
        let (ops, selection_after) =
            splice_text_run(editor, &start, start.offset..end.offset, run)?;
        return Ok(Transaction::new(ops)
            .selection_after(selection_after)
            .source("command:insert.link"));
    }

    let caret = if sel.is_collapsed() {
        sel.focus
    } else {
        ordered_selection_points(&sel).0
    };
    let (ops, selection_after) = splice_text_run(editor, &caret, caret.offset..caret.offset, run)?;
    Ok(Transaction::new(ops)
        .selection_after(selection_after)
        .source("command:insert.link"))
}

/// Typed text. A collapsed caret inserts in place; a range selection is
/// spliced out first, with the new text taking the marks of the run left
/// of the cut.
fn insert_text_at_selection(editor: &Editor, text: String) -> Result<Transaction, String> {
    let sel = editor.selection().clone();

    if sel.is_collapsed() {
        let focus = sel.focus;
        let selection_after =
            Selection::collapsed(Point::new(focus.path.clone(), focus.offset + text.len()));
        return Ok(Transaction::new(vec![Op::InsertText {
            path: focus.path,
            offset: focus.offset,
            text,
        }])
        .selection_after(selection_after)
        .source("command:text.insert"));
    }

    let (start, end) = ordered_selection_points(&sel);
    let Some(start_block_path) = start.path.split_last().map(|(_, p)| p.to_vec()) else {
        return Err("Selection start is not in a text block".into());
    };
    let Some(end_block_path) = end.path.split_last().map(|(_, p)| p.to_vec()) else {
        return Err("Selection end is not in a text block".into());
    };

    let blocks = text_blocks_in_order(editor.doc(), editor.registry());
    let start_index = blocks
        .iter()
        .position(|b| b.path == start_block_path)
        .ok_or_else(|| "Selection start is not in a text block".to_string())?;
    let end_index = blocks
        .iter()
        .position(|b| b.path == end_block_path)
        .ok_or_else(|| "Selection end is not in a text block".to_string())?;

    let (start_index, end_index) = if start_index <= end_index {
        (start_index, end_index)
    } else {
        (end_index, start_index)
    };

    let start_inline_ix = start.path.last().copied().unwrap_or(0);
    let end_inline_ix = end.path.last().copied().unwrap_or(0);

    let mut ops: Vec<Op> = Vec::new();
    let mut selection_after = Selection::collapsed(start.clone());

    for (block_index, block) in blocks
        .iter()
        .enumerate()
        .take(end_index + 1)
        .skip(start_index)
    {
        let children = block.el.children.as_slice();
        let total_len = total_inline_text_len(children);

        let start_global = if block_index == start_index {
            point_global_offset(children, start_inline_ix, start.offset)
        } else {
            0
        };
        let end_global = if block_index == end_index {
            point_global_offset(children, end_inline_ix, end.offset)
        } else {
            total_len
        };

        // Blocks with nothing to cut are left alone; the start block is
        // always rebuilt because the insertion lands there.
        if block_index != start_index && start_global >= end_global {
            continue;
        }

        let mut new_children = remove_text_in_block(children, start_global, end_global);
        if block_index == start_index {
            let (child_ix, caret_offset) =
                insert_text_in_children(&mut new_children, start_global, &text);
            let mut caret_path = block.path.clone();
            caret_path.push(child_ix);
            selection_after = Selection::collapsed(Point::new(caret_path, caret_offset));
        }

        for child_ix in (0..children.len()).rev() {
            let mut remove_path = block.path.clone();
            remove_path.push(child_ix);
            ops.push(Op::RemoveNode { path: remove_path });
        }
        for (child_ix, node) in new_children.into_iter().enumerate() {
            let mut insert_path = block.path.clone();
            insert_path.push(child_ix);
            ops.push(Op::InsertNode {
                path: insert_path,
                node,
            });
        }
    }

    Ok(Transaction::new(ops)
        .selection_after(selection_after)
        .source("command:text.insert"))
}

/// Cuts `[start_global, end_global)` out of a block's inline text. Runs
/// the cut only grazes keep their identity; fully-removed runs are dropped.
fn remove_text_in_block(children: &[Node], start_global: usize, end_global: usize) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        let Node::Text(t) = node else {
            out.push(node.clone());
            continue;
        };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;

        if end_global <= node_start || start_global >= node_end {
            out.push(node.clone());
            continue;
        }

        let cut_start =
            clamp_to_char_boundary(&t.text, start_global.saturating_sub(node_start));
        let cut_end = clamp_to_char_boundary(
            &t.text,
            (end_global - node_start).min(t.text.len()),
        )
        .max(cut_start);

        let mut next = t.clone();
        next.text.replace_range(cut_start..cut_end, "");
        if !next.text.is_empty() {
            out.push(Node::Text(next));
        }
    }

    if !out.iter().any(|n| matches!(n, Node::Text(_))) {
        out.push(Node::Text(TextNode::empty()));
    }
    out
}

/// Inserts `text` at a global inline offset, attaching to the run on the
/// left of a boundary so the typed text picks up that run's marks.
fn insert_text_in_children(
    children: &mut Vec<Node>,
    global: usize,
    text: &str,
) -> (usize, usize) {
    let mut cursor = 0usize;
    for (ix, node) in children.iter_mut().enumerate() {
        let Node::Text(t) = node else {
            continue;
        };
        let len = t.text.len();
        if global <= cursor + len {
            let offset = clamp_to_char_boundary(&t.text, global - cursor);
            t.text.insert_str(offset, text);
            return (ix, offset + text.len());
        }
        cursor += len;
    }

    children.push(Node::Text(TextNode::new(text, Marks::default())));
    (children.len() - 1, text.len())
}

/// Replaces `remove` within the text run at `point` with `prefix | run |
/// suffix`, leaving the caret collapsed at the end of the inserted run.
fn splice_text_run(
    editor: &Editor,
    point: &Point,
    remove: std::ops::Range<usize>,
    run: TextNode,
) -> Result<(Vec<Op>, Selection), String> {
    if point.path.is_empty() {
        return Err("Selection is not in a text node".into());
    }
    let (child_ix, block_path) = point
        .path
        .split_last()
        .ok_or_else(|| "Selection is not in a text node".to_string())?;

    let Some(Node::Element(el)) = editor.doc().node_at(block_path) else {
        return Err("Selection is not in a text block".into());
    };
    let Some(Node::Text(text)) = el.children.get(*child_ix) else {
        return Err("Selection is not in a text node".into());
    };

    let start = clamp_to_char_boundary(&text.text, remove.start.min(text.text.len()));
    let end = clamp_to_char_boundary(&text.text, remove.end.min(text.text.len())).max(start);

    let left = text.text.get(..start).unwrap_or("").to_string();
    let right = text.text.get(end..).unwrap_or("").to_string();
    let marks = text.marks.clone();
    let run_len = run.text.len();

    let mut replacement: Vec<Node> = Vec::new();
    let base_child_ix = *child_ix;
    let mut run_ix = base_child_ix;

    if !left.is_empty() {
        replacement.push(Node::Text(TextNode::new(left, marks.clone())));
        run_ix += 1;
    }

    replacement.push(Node::Text(run));

    if !right.is_empty() {
        replacement.push(Node::Text(TextNode::new(right, marks)));
    }

    let mut ops: Vec<Op> = Vec::new();
    ops.push(Op::RemoveNode {
        path: point.path.clone(),
    });
    for (i, node) in replacement.into_iter().enumerate() {
        let mut path = block_path.to_vec();
        path.push(base_child_ix + i);
        ops.push(Op::InsertNode { path, node });
    }

    let mut caret_path = block_path.to_vec();
    caret_path.push(run_ix);
    let selection_after = Selection::collapsed(Point::new(caret_path, run_len));
    Ok((ops, selection_after))
}

pub(crate) fn point_global_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(t) => {
                if ix < child_ix {
                    global += t.text.len();
                    continue;
                }
                if ix == child_ix {
                    let o = clamp_to_char_boundary(&t.text, offset);
                    global += o;
                }
                break;
            }
            Node::Void(_) | Node::Element(_) => {}
        }
    }
    global
}

pub(crate) fn point_for_global_offset(
    block_path: &[usize],
    children: &[Node],
    global_offset: usize,
) -> Point {
    let mut remaining = global_offset;
    for (child_ix, node) in children.iter().enumerate() {
        let Node::Text(t) = node else {
            continue;
        };
        if remaining < t.text.len() {
            let mut path = block_path.to_vec();
            path.push(child_ix);
            return Point::new(path, clamp_to_char_boundary(&t.text, remaining));
        }
        if remaining == t.text.len() {
            if matches!(children.get(child_ix + 1), Some(Node::Text(_))) {
                let mut path = block_path.to_vec();
                path.push(child_ix + 1);
                return Point::new(path, 0);
            }
            let mut path = block_path.to_vec();
            path.push(child_ix);
            return Point::new(path, t.text.len());
        }
        remaining = remaining.saturating_sub(t.text.len());
    }

    // Fallback to end of last text node.
    for (child_ix, node) in children.iter().enumerate().rev() {
        if let Node::Text(t) = node {
            let mut path = block_path.to_vec();
            path.push(child_ix);
            return Point::new(path, t.text.len());
        }
    }

    let mut path = block_path.to_vec();
    path.push(0);
    Point::new(path, 0)
}

fn is_point_in_block(point: &Point, block_path: &[usize]) -> bool {
    point.path.len() == block_path.len() + 1 && point.path.starts_with(block_path)
}

struct TextBlock<'a> {
    path: Path,
    el: &'a ElementNode,
}

pub(crate) fn element_is_text_block(el: &ElementNode, registry: &PluginRegistry) -> bool {
    match registry
        .node_specs
        .get(&el.kind)
        .map(|s| s.children.clone())
    {
        Some(ChildConstraint::InlineOnly) => true,
        Some(_) => false,
        None => el.children.iter().any(|n| matches!(n, Node::Text(_))),
    }
}

fn text_blocks_in_order<'a>(doc: &'a Document, registry: &PluginRegistry) -> Vec<TextBlock<'a>> {
    fn walk<'a>(
        nodes: &'a [Node],
        path: &mut Vec<usize>,
        registry: &PluginRegistry,
        out: &mut Vec<TextBlock<'a>>,
    ) {
        for (ix, node) in nodes.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };

            path.push(ix);

            if element_is_text_block(el, registry) {
                out.push(TextBlock {
                    path: path.clone(),
                    el,
                });
            } else {
                walk(&el.children, path, registry, out);
            }

            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), registry, &mut out);
    out
}

fn total_inline_text_len(children: &[Node]) -> usize {
    children
        .iter()
        .map(|n| match n {
            Node::Text(t) => t.text.len(),
            Node::Void(_) | Node::Element(_) => 0,
        })
        .sum()
}

fn apply_marks_in_block(
    children: &[Node],
    start_global: usize,
    end_global: usize,
    apply: &dyn Fn(Marks) -> Marks,
) -> Vec<Node> {
    if start_global >= end_global {
        return children.to_vec();
    }

    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        let (node_start, node_end) = match node {
            Node::Text(t) => {
                let start = cursor;
                let end = cursor + t.text.len();
                cursor = end;
                (start, end)
            }
            Node::Void(_) | Node::Element(_) => {
                out.push(node.clone());
                continue;
            }
        };

        if end_global <= node_start || start_global >= node_end {
            out.push(node.clone());
            continue;
        }

        let Node::Text(t) = node else {
            out.push(node.clone());
            continue;
        };

        let sel_start = (start_global.saturating_sub(node_start)).min(t.text.len());
        let sel_end = (end_global.saturating_sub(node_start)).min(t.text.len());

        let sel_start = clamp_to_char_boundary(&t.text, sel_start);
        let sel_end = clamp_to_char_boundary(&t.text, sel_end);

        if sel_start == 0 && sel_end == t.text.len() {
            let mut next = t.clone();
            next.marks = apply(next.marks);
            out.push(Node::Text(next));
            continue;
        }

        let prefix = t.text.get(..sel_start).unwrap_or("").to_string();
        let middle = t.text.get(sel_start..sel_end).unwrap_or("").to_string();
        let suffix = t.text.get(sel_end..).unwrap_or("").to_string();

        if !prefix.is_empty() {
            out.push(Node::Text(TextNode::new(prefix, t.marks.clone())));
        }
        if !middle.is_empty() {
            out.push(Node::Text(TextNode::new(middle, apply(t.marks.clone()))));
        }
        if !suffix.is_empty() {
            out.push(Node::Text(TextNode::new(suffix, t.marks.clone())));
        }
    }

    if out.is_empty() {
        out.push(Node::Text(TextNode::empty()));
    }

    out
}

pub(crate) fn ordered_selection_points(sel: &Selection) -> (Point, Point) {
    let mut start = sel.anchor.clone();
    let mut end = sel.focus.clone();

    if start.path == end.path {
        if end.offset < start.offset {
            std::mem::swap(&mut start, &mut end);
        }
        return (start, end);
    }
    if end.path < start.path {
        std::mem::swap(&mut start, &mut end);
    }
    (start, end)
}

/// Marks as seen from the current selection. For a caret this is the focus
/// run's marks; for a range, a boolean mark is active only when every
/// selected run carries it.
fn active_marks(editor: &Editor) -> Marks {
    let sel = editor.selection().clone();
    let focus_marks = match editor.doc().node_at(&sel.focus.path) {
        Some(Node::Text(text)) => text.marks.clone(),
        _ => Marks::default(),
    };

    if sel.is_collapsed() {
        return focus_marks;
    }

    Marks {
        bold: all_selected_text_nodes_have_mark(editor, &sel, |m| m.bold).unwrap_or(false),
        italic: all_selected_text_nodes_have_mark(editor, &sel, |m| m.italic).unwrap_or(false),
        underline: all_selected_text_nodes_have_mark(editor, &sel, |m| m.underline)
            .unwrap_or(false),
        link: focus_marks.link,
    }
}

fn all_selected_text_nodes_have_mark(
    editor: &Editor,
    sel: &Selection,
    get: fn(&Marks) -> bool,
) -> Result<bool, String> {
    let (start, end) = ordered_selection_points(sel);
    let Some(start_block_path) = start.path.split_last().map(|(_, p)| p.to_vec()) else {
        return Err("Selection start is not in a text block".into());
    };
    let Some(end_block_path) = end.path.split_last().map(|(_, p)| p.to_vec()) else {
        return Err("Selection end is not in a text block".into());
    };

    let blocks = text_blocks_in_order(editor.doc(), editor.registry());
    let start_index = blocks
        .iter()
        .position(|b| b.path == start_block_path)
        .ok_or_else(|| "Selection start is not in a text block".to_string())?;
    let end_index = blocks
        .iter()
        .position(|b| b.path == end_block_path)
        .ok_or_else(|| "Selection end is not in a text block".to_string())?;

    let (start_index, end_index) = if start_index <= end_index {
        (start_index, end_index)
    } else {
        (end_index, start_index)
    };

    let start_inline_ix = start.path.last().copied().unwrap_or(0);
    let end_inline_ix = end.path.last().copied().unwrap_or(0);

    for (block_index, block) in blocks
        .iter()
        .enumerate()
        .take(end_index + 1)
        .skip(start_index)
    {
        let children = block.el.children.as_slice();
        let total_len = total_inline_text_len(children);
        if total_len == 0 {
            continue;
        }

        let start_global = if block_index == start_index {
            point_global_offset(children, start_inline_ix, start.offset)
        } else {
            0
        };
        let end_global = if block_index == end_index {
            point_global_offset(children, end_inline_ix, end.offset)
        } else {
            total_len
        };
        if start_global >= end_global {
            continue;
        }

        let mut cursor = 0usize;
        for node in children {
            let (node_start, node_end) = match node {
                Node::Text(t) => {
                    let start = cursor;
                    let end = cursor + t.text.len();
                    cursor = end;
                    (start, end)
                }
                Node::Void(_) | Node::Element(_) => {
                    continue;
                }
            };
            if end_global <= node_start || start_global >= node_end {
                continue;
            }
            if let Node::Text(t) = node {
                if !get(&t.marks) {
                    return Ok(false);
                }
            }
        }
    }

    Ok(true)
}

fn toggle_bool_mark(
    editor: &mut Editor,
    get: fn(&Marks) -> bool,
    set: fn(&mut Marks, bool),
    source: &'static str,
) -> Result<Transaction, String> {
    let sel = editor.selection().clone();
    if sel.is_collapsed() {
        return toggle_mark_at_caret(editor, |mut marks| {
            let target = !get(&marks);
            set(&mut marks, target);
            marks
        })
        .map(|(ops, selection_after)| {
            Transaction::new(ops)
                .selection_after(selection_after)
                .source(source)
        });
    }

    // If any run in the range lacks the mark, the toggle applies it to the
    // whole range; only when every run has it does the toggle remove it.
    let all_set = all_selected_text_nodes_have_mark(editor, &sel, get)?;
    let target = !all_set;
    apply_mark_range(editor, &sel, &|mut marks: Marks| {
        set(&mut marks, target);
        marks
    })
    .map(|(ops, selection_after)| {
        Transaction::new(ops)
            .selection_after(selection_after)
            .source(source)
    })
}

fn toggle_bold(editor: &mut Editor) -> Result<Transaction, String> {
    toggle_bool_mark(
        editor,
        |m| m.bold,
        |m, v| m.bold = v,
        "command:marks.toggle_bold",
    )
}

fn toggle_italic(editor: &mut Editor) -> Result<Transaction, String> {
    toggle_bool_mark(
        editor,
        |m| m.italic,
        |m, v| m.italic = v,
        "command:marks.toggle_italic",
    )
}

fn toggle_underline(editor: &mut Editor) -> Result<Transaction, String> {
    toggle_bool_mark(
        editor,
        |m| m.underline,
        |m, v| m.underline = v,
        "command:marks.toggle_underline",
    )
}

fn toggle_mark_at_caret(
    editor: &Editor,
    apply: impl Fn(Marks) -> Marks,
) -> Result<(Vec<Op>, Selection), String> {
    let focus = editor.selection().focus.clone();
    if focus.path.is_empty() {
        return Err("Selection is not in a text node".into());
    }
    let (child_ix, block_path) = focus
        .path
        .split_last()
        .ok_or_else(|| "Selection is not in a text node".to_string())?;

    let Some(Node::Element(el)) = editor.doc().node_at(block_path) else {
        return Err("Selection is not in a text block".into());
    };
    let Some(Node::Text(text)) = el.children.get(*child_ix) else {
        return Err("Selection is not in a text node".into());
    };

    let cursor = clamp_to_char_boundary(&text.text, focus.offset);
    let marks_before = text.marks.clone();
    let marks_after = apply(marks_before.clone());

    if text.text.is_empty() {
        let selection_after = Selection::collapsed(Point::new(focus.path.clone(), 0));
        return Ok((
            vec![Op::SetTextMarks {
                path: focus.path.clone(),
                marks: marks_after,
            }],
            selection_after,
        ));
    }

    let mut replacement: Vec<Node> = Vec::new();
    let base_child_ix = *child_ix;
    let mut caret_child_ix = base_child_ix;

    let left = text.text.get(..cursor).unwrap_or("").to_string();
    let right = text.text.get(cursor..).unwrap_or("").to_string();

    if !left.is_empty() {
        replacement.push(Node::Text(TextNode::new(left, marks_before.clone())));
        caret_child_ix += 1;
    }

    replacement.push(Node::Text(TextNode::new("", marks_after)));

    if !right.is_empty() {
        replacement.push(Node::Text(TextNode::new(right, marks_before)));
    }

    let mut ops: Vec<Op> = Vec::new();
    ops.push(Op::RemoveNode {
        path: focus.path.clone(),
    });
    for (i, node) in replacement.into_iter().enumerate() {
        let mut path = block_path.to_vec();
        path.push(base_child_ix + i);
        ops.push(Op::InsertNode { path, node });
    }

    let mut caret_path = block_path.to_vec();
    caret_path.push(caret_child_ix);
    let selection_after = Selection::collapsed(Point::new(caret_path, 0));
    Ok((ops, selection_after))
}

fn apply_mark_range(
    editor: &Editor,
    sel: &Selection,
    apply: &dyn Fn(Marks) -> Marks,
) -> Result<(Vec<Op>, Selection), String> {
    let (start, end) = ordered_selection_points(sel);

    let Some(start_block_path) = start.path.split_last().map(|(_, p)| p.to_vec()) else {
        return Err("Selection start is not in a text block".into());
    };
    let Some(end_block_path) = end.path.split_last().map(|(_, p)| p.to_vec()) else {
        return Err("Selection end is not in a text block".into());
    };

    let blocks = text_blocks_in_order(editor.doc(), editor.registry());
    let start_index = blocks
        .iter()
        .position(|b| b.path == start_block_path)
        .ok_or_else(|| "Selection start is not in a text block".to_string())?;
    let end_index = blocks
        .iter()
        .position(|b| b.path == end_block_path)
        .ok_or_else(|| "Selection end is not in a text block".to_string())?;

    let (start_index, end_index) = if start_index <= end_index {
        (start_index, end_index)
    } else {
        (end_index, start_index)
    };

    let start_inline_ix = start.path.last().copied().unwrap_or(0);
    let end_inline_ix = end.path.last().copied().unwrap_or(0);

    let mut ops: Vec<Op> = Vec::new();
    let mut new_anchor = sel.anchor.clone();
    let mut new_focus = sel.focus.clone();

    for (block_index, block) in blocks
        .iter()
        .enumerate()
        .take(end_index + 1)
        .skip(start_index)
    {
        let children = block.el.children.as_slice();
        let total_len = total_inline_text_len(children);
        if total_len == 0 {
            continue;
        }

        let start_global = if block_index == start_index {
            point_global_offset(children, start_inline_ix, start.offset)
        } else {
            0
        };
        let end_global = if block_index == end_index {
            point_global_offset(children, end_inline_ix, end.offset)
        } else {
            total_len
        };

        if start_global >= end_global {
            continue;
        }

        let new_children = apply_marks_in_block(children, start_global, end_global, apply);

        for child_ix in (0..children.len()).rev() {
            let mut remove_path = block.path.clone();
            remove_path.push(child_ix);
            ops.push(Op::RemoveNode { path: remove_path });
        }
        for (child_ix, node) in new_children.iter().cloned().enumerate() {
            let mut insert_path = block.path.clone();
            insert_path.push(child_ix);
            ops.push(Op::InsertNode {
                path: insert_path,
                node,
            });
        }

        if is_point_in_block(&new_anchor, &block.path) {
            let global = point_global_offset(
                children,
                new_anchor.path.last().copied().unwrap_or(0),
                new_anchor.offset,
            );
            new_anchor = point_for_global_offset(&block.path, &new_children, global);
        }
        if is_point_in_block(&new_focus, &block.path) {
            let global = point_global_offset(
                children,
                new_focus.path.last().copied().unwrap_or(0),
                new_focus.offset,
            );
            new_focus = point_for_global_offset(&block.path, &new_children, global);
        }
    }

    Ok((
        ops,
        Selection {
            anchor: new_anchor,
            focus: new_focus,
        },
    ))
}
