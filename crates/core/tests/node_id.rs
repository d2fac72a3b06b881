use penmark_core::{Document, Editor, Node, Op, PluginRegistry, Point, Selection, Transaction};
use serde_json::json;

#[test]
fn ids_are_unique_and_survive_clone() {
    let a = Node::paragraph("a");
    let b = Node::paragraph("a");
    assert_ne!(a.id(), b.id());
    assert_eq!(a, b);

    let cloned = a.clone();
    assert_eq!(a.id(), cloned.id());
}

#[test]
fn path_of_and_id_at_round_trip() {
    let doc = Document {
        children: vec![Node::paragraph("one"), Node::paragraph("two")],
    };

    let text_id = doc.id_at(&[1, 0]).unwrap();
    assert_eq!(doc.path_of(text_id), Some(vec![1, 0]));

    let block_id = doc.id_at(&[0]).unwrap();
    assert_eq!(doc.path_of(block_id), Some(vec![0]));
}

#[test]
fn text_run_id_survives_block_retarget() {
    let doc = Document {
        children: vec![Node::paragraph("Title")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    let run_id = editor.doc().id_at(&[0, 0]).unwrap();
    editor
        .run_command("block.set_heading", Some(json!({ "level": 1 })))
        .unwrap();

    assert_eq!(editor.doc().path_of(run_id), Some(vec![0, 0]));
}

#[test]
fn removed_node_id_stops_resolving() {
    let doc = Document {
        children: vec![Node::paragraph("a"), Node::paragraph("b")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    let removed_id = editor.doc().id_at(&[1]).unwrap();
    editor
        .apply(Transaction::new(vec![Op::RemoveNode { path: vec![1] }]))
        .unwrap();

    assert_eq!(editor.doc().path_of(removed_id), None);
}

#[test]
fn undo_revives_the_removed_node_id() {
    let doc = Document {
        children: vec![Node::paragraph("a"), Node::paragraph("b")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    let removed_id = editor.doc().id_at(&[1]).unwrap();
    editor
        .apply(Transaction::new(vec![Op::RemoveNode { path: vec![1] }]))
        .unwrap();
    assert_eq!(editor.doc().path_of(removed_id), None);

    assert!(editor.undo());
    assert_eq!(editor.doc().path_of(removed_id), Some(vec![1]));
}

#[test]
fn full_replace_mints_fresh_ids() {
    let first = penmark_core::parse_document("<p>hello</p>");
    let second = penmark_core::parse_document("<p>hello</p>");

    let stale_id = first.id_at(&[0, 0]).unwrap();
    assert_eq!(second.path_of(stale_id), None);
}
