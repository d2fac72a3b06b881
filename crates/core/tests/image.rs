use penmark_core::{Document, Editor, Node, PluginRegistry, Point, Selection};
use serde_json::json;

#[test]
fn insert_image_places_void_after_current_block() {
    let doc = Document {
        children: vec![Node::paragraph("before")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 6));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    editor
        .run_command(
            "image.insert",
            Some(json!({ "src": "https://example.com/a.png", "alt": "A" })),
        )
        .unwrap();

    let children = &editor.doc().children;
    assert_eq!(children.len(), 3);

    let Node::Void(image) = &children[1] else {
        panic!("expected image void");
    };
    assert_eq!(image.kind, "image");
    assert_eq!(
        image.attrs.get("src").and_then(|v| v.as_str()),
        Some("https://example.com/a.png")
    );
    assert_eq!(image.attrs.get("alt").and_then(|v| v.as_str()), Some("A"));

    let Node::Element(trailing) = &children[2] else {
        panic!("expected trailing paragraph");
    };
    assert_eq!(trailing.kind, "paragraph");

    // Caret lands in the trailing paragraph so typing can continue.
    assert_eq!(editor.selection().focus, Point::new(vec![2, 0], 0));
}

#[test]
fn alt_defaults_to_empty_string() {
    let doc = Document {
        children: vec![Node::paragraph("x")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 1));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    editor
        .run_command("image.insert", Some(json!({ "src": "pic.png" })))
        .unwrap();

    let Node::Void(image) = &editor.doc().children[1] else {
        panic!("expected image void");
    };
    assert_eq!(image.attrs.get("alt").and_then(|v| v.as_str()), Some(""));
}

#[test]
fn missing_src_is_an_error() {
    let doc = Document {
        children: vec![Node::paragraph("x")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    let err = editor.run_command("image.insert", None).unwrap_err();
    assert!(err.message().contains("src"));
    assert_eq!(editor.doc().children.len(), 1);
}

#[test]
fn trailing_image_gains_a_paragraph_on_normalize() {
    let doc = Document {
        children: vec![Node::paragraph("a"), Node::image("pic.png", "")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let editor = Editor::new(doc, selection, PluginRegistry::standard());

    let children = &editor.doc().children;
    assert_eq!(children.len(), 3);
    let Node::Element(last) = &children[2] else {
        panic!("expected trailing paragraph");
    };
    assert_eq!(last.kind, "paragraph");
}

#[test]
fn undo_removes_image_and_trailing_paragraph() {
    let doc = Document {
        children: vec![Node::paragraph("keep")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 4));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    editor
        .run_command("image.insert", Some(json!({ "src": "p.png" })))
        .unwrap();
    assert_eq!(editor.doc().children.len(), 3);

    assert!(editor.undo());
    assert_eq!(editor.doc().children.len(), 1);
    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected paragraph");
    };
    assert_eq!(el.kind, "paragraph");
}
