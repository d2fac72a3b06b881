use penmark_core::{Document, Editor, Node, PluginRegistry, Point, Selection};
use serde_json::json;

fn align_attr(editor: &Editor, ix: usize) -> Option<String> {
    let Node::Element(el) = &editor.doc().children[ix] else {
        panic!("expected element at index {ix}");
    };
    el.attrs
        .get("align")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[test]
fn set_align_center_sets_attr_and_query_reflects_it() {
    let doc = Document {
        children: vec![Node::paragraph("centered")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    editor
        .run_command("block.set_align", Some(json!({ "align": "center" })))
        .unwrap();

    assert_eq!(align_attr(&editor, 0).as_deref(), Some("center"));
    let align: Option<String> = editor.run_query("block.align", None).unwrap();
    assert_eq!(align.as_deref(), Some("center"));
}

#[test]
fn set_align_left_removes_attr() {
    let doc = Document {
        children: vec![Node::paragraph("text")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    editor
        .run_command("block.set_align", Some(json!({ "align": "right" })))
        .unwrap();
    assert_eq!(align_attr(&editor, 0).as_deref(), Some("right"));

    editor
        .run_command("block.set_align", Some(json!({ "align": "left" })))
        .unwrap();
    assert_eq!(align_attr(&editor, 0), None);
    let align: Option<String> = editor.run_query("block.align", None).unwrap();
    assert_eq!(align, None);
}

#[test]
fn set_align_applies_to_every_selected_block() {
    let doc = Document {
        children: vec![
            Node::paragraph("one"),
            Node::paragraph("two"),
            Node::paragraph("three"),
        ],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![1, 0], 3),
    };
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    editor
        .run_command("block.set_align", Some(json!({ "align": "center" })))
        .unwrap();

    assert_eq!(align_attr(&editor, 0).as_deref(), Some("center"));
    assert_eq!(align_attr(&editor, 1).as_deref(), Some("center"));
    assert_eq!(align_attr(&editor, 2), None);
}

#[test]
fn invalid_align_value_is_rejected() {
    let doc = Document {
        children: vec![Node::paragraph("text")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    let err = editor
        .run_command("block.set_align", Some(json!({ "align": "justify" })))
        .unwrap_err();
    assert!(err.message().contains("Invalid align"));
    assert_eq!(align_attr(&editor, 0), None);
}

#[test]
fn align_survives_block_retarget() {
    let doc = Document {
        children: vec![Node::paragraph("headline")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    editor
        .run_command("block.set_align", Some(json!({ "align": "right" })))
        .unwrap();
    editor
        .run_command("block.set_heading", Some(json!({ "level": 1 })))
        .unwrap();

    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected heading element");
    };
    assert_eq!(el.kind, "heading");
    assert_eq!(el.attrs.get("align").and_then(|v| v.as_str()), Some("right"));
}

#[test]
fn align_query_requires_every_selected_block_to_match() {
    let doc = Document {
        children: vec![Node::paragraph("one"), Node::paragraph("two")],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![1, 0], 3),
    };
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    editor
        .run_command("block.set_align", Some(json!({ "align": "center" })))
        .unwrap();
    let align: Option<String> = editor.run_query("block.align", None).unwrap();
    assert_eq!(align.as_deref(), Some("center"));

    // Re-align only the second block; the range is now mixed.
    editor.set_selection(Selection::collapsed(Point::new(vec![1, 0], 0)));
    editor
        .run_command("block.set_align", Some(json!({ "align": "right" })))
        .unwrap();

    editor.set_selection(Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![1, 0], 3),
    });
    let align: Option<String> = editor.run_query("block.align", None).unwrap();
    assert_eq!(align, None);
}
