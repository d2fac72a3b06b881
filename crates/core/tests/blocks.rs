use penmark_core::{Document, Editor, Node, PluginRegistry, Point, Selection};
use serde_json::json;

fn editor_with(children: Vec<Node>, selection: Selection) -> Editor {
    Editor::new(Document { children }, selection, PluginRegistry::standard())
}

fn block_kind(editor: &Editor, ix: usize) -> String {
    let Node::Element(el) = &editor.doc().children[ix] else {
        panic!("expected element at index {ix}");
    };
    el.kind.clone()
}

#[test]
fn set_heading_converts_paragraph_and_keeps_text() {
    let mut editor = editor_with(
        vec![Node::paragraph("Title")],
        Selection::collapsed(Point::new(vec![0, 0], 2)),
    );

    editor
        .run_command("block.set_heading", Some(json!({ "level": 2 })))
        .unwrap();

    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected heading element");
    };
    assert_eq!(el.kind, "heading");
    assert_eq!(el.attrs.get("level").and_then(|v| v.as_u64()), Some(2));
    let Node::Text(t) = &el.children[0] else {
        panic!("expected text run");
    };
    assert_eq!(t.text, "Title");

    let level: Option<u64> = editor.run_query("block.heading_level", None).unwrap();
    assert_eq!(level, Some(2));
}

#[test]
fn set_heading_is_a_no_op_when_level_matches() {
    let mut editor = editor_with(
        vec![Node::heading(2, "Title")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );

    editor
        .run_command("block.set_heading", Some(json!({ "level": 2 })))
        .unwrap();

    assert!(!editor.can_undo());
    assert_eq!(block_kind(&editor, 0), "heading");
}

#[test]
fn heading_levels_are_clamped() {
    let mut editor = editor_with(
        vec![Node::paragraph("Deep")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );

    editor
        .run_command("block.set_heading", Some(json!({ "level": 9 })))
        .unwrap();

    let level: Option<u64> = editor.run_query("block.heading_level", None).unwrap();
    assert_eq!(level, Some(3));
}

#[test]
fn quote_then_list_last_command_wins() {
    let mut editor = editor_with(
        vec![Node::paragraph("text")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );

    editor.run_command("block.set_quote", None).unwrap();
    assert_eq!(block_kind(&editor, 0), "quote");
    let quoted: bool = editor.run_query("block.is_quote_active", None).unwrap();
    assert!(quoted);

    editor.run_command("list.toggle_unordered", None).unwrap();
    assert_eq!(block_kind(&editor, 0), "list_item");
    let quoted: bool = editor.run_query("block.is_quote_active", None).unwrap();
    assert!(!quoted);
    let list: Option<String> = editor.run_query("list.active_type", None).unwrap();
    assert_eq!(list.as_deref(), Some("unordered"));
}

#[test]
fn list_toggle_returns_to_paragraph() {
    let mut editor = editor_with(
        vec![Node::paragraph("item")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );

    editor.run_command("list.toggle_ordered", None).unwrap();
    assert_eq!(block_kind(&editor, 0), "list_item");
    let list: Option<String> = editor.run_query("list.active_type", None).unwrap();
    assert_eq!(list.as_deref(), Some("ordered"));

    editor.run_command("list.toggle_ordered", None).unwrap();
    assert_eq!(block_kind(&editor, 0), "paragraph");
    let list: Option<String> = editor.run_query("list.active_type", None).unwrap();
    assert_eq!(list, None);
}

#[test]
fn switching_list_type_retargets_instead_of_unwrapping() {
    let mut editor = editor_with(
        vec![Node::paragraph("item")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );

    editor.run_command("list.toggle_unordered", None).unwrap();
    editor.run_command("list.toggle_ordered", None).unwrap();

    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected list item");
    };
    assert_eq!(el.kind, "list_item");
    assert_eq!(el.attrs.get("list").and_then(|v| v.as_str()), Some("ordered"));
}

#[test]
fn block_commands_cover_every_selected_block() {
    let mut editor = editor_with(
        vec![
            Node::paragraph("one"),
            Node::paragraph("two"),
            Node::paragraph("three"),
        ],
        Selection {
            anchor: Point::new(vec![0, 0], 1),
            focus: Point::new(vec![1, 0], 2),
        },
    );

    editor.run_command("list.toggle_unordered", None).unwrap();
    assert_eq!(block_kind(&editor, 0), "list_item");
    assert_eq!(block_kind(&editor, 1), "list_item");
    assert_eq!(block_kind(&editor, 2), "paragraph");

    editor.run_command("list.toggle_unordered", None).unwrap();
    assert_eq!(block_kind(&editor, 0), "paragraph");
    assert_eq!(block_kind(&editor, 1), "paragraph");
}

#[test]
fn set_paragraph_resets_heading_attrs() {
    let mut editor = editor_with(
        vec![Node::heading(3, "Down")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );

    editor.run_command("block.set_paragraph", None).unwrap();

    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected paragraph element");
    };
    assert_eq!(el.kind, "paragraph");
    assert!(el.attrs.get("level").is_none());
}

#[test]
fn retarget_preserves_selection() {
    let mut editor = editor_with(
        vec![Node::paragraph("hello")],
        Selection {
            anchor: Point::new(vec![0, 0], 1),
            focus: Point::new(vec![0, 0], 4),
        },
    );

    editor
        .run_command("block.set_heading", Some(json!({ "level": 1 })))
        .unwrap();

    assert_eq!(editor.selection().anchor, Point::new(vec![0, 0], 1));
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 4));
}

#[test]
fn list_query_reports_nothing_for_a_mixed_range() {
    let mut editor = editor_with(
        vec![Node::paragraph("item"), Node::paragraph("plain")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );
    editor.run_command("list.toggle_ordered", None).unwrap();
    assert_eq!(block_kind(&editor, 0), "list_item");
    assert_eq!(block_kind(&editor, 1), "paragraph");

    let list: Option<String> = editor.run_query("list.active_type", None).unwrap();
    assert_eq!(list.as_deref(), Some("ordered"));

    // A selection spanning into the plain paragraph is no longer a list.
    editor.set_selection(Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![1, 0], 5),
    });
    let list: Option<String> = editor.run_query("list.active_type", None).unwrap();
    assert_eq!(list, None);
}

#[test]
fn list_query_requires_every_block_to_share_the_type() {
    let mut editor = editor_with(
        vec![Node::paragraph("a"), Node::paragraph("b")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );
    editor.run_command("list.toggle_ordered", None).unwrap();
    editor.set_selection(Selection::collapsed(Point::new(vec![1, 0], 0)));
    editor.run_command("list.toggle_unordered", None).unwrap();

    editor.set_selection(Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![1, 0], 1),
    });
    let list: Option<String> = editor.run_query("list.active_type", None).unwrap();
    assert_eq!(list, None);
}
