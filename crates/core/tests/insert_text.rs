use penmark_core::{
    Document, Editor, ElementNode, Marks, Node, PluginRegistry, Point, Selection, TextNode,
};
use serde_json::json;

fn insert(editor: &mut Editor, text: &str) {
    editor
        .run_command("text.insert", Some(json!({ "text": text })))
        .unwrap();
}

#[test]
fn caret_insert_lands_at_the_offset() {
    let doc = Document {
        children: vec![Node::paragraph("Hello world")],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 5));
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    insert(&mut editor, ",");
    assert_eq!(editor.doc().plain_text(), "Hello, world");
    assert_eq!(editor.selection().focus.offset, 6);
    assert!(editor.selection().is_collapsed());
}

#[test]
fn typing_over_a_range_replaces_it() {
    let doc = Document {
        children: vec![Node::paragraph("Hello world")],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 6),
        focus: Point::new(vec![0, 0], 11),
    };
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    insert(&mut editor, "there");
    assert_eq!(editor.doc().plain_text(), "Hello there");
    assert_eq!(editor.selection().focus.offset, 11);
    assert!(editor.selection().is_collapsed());
}

#[test]
fn replacement_takes_the_marks_left_of_the_cut() {
    let doc = Document {
        children: vec![Node::Element(ElementNode::new(
            "paragraph",
            Default::default(),
            vec![
                Node::Text(TextNode::new("ab", Marks::default())),
                Node::Text(TextNode::new(
                    "cd",
                    Marks {
                        bold: true,
                        ..Marks::default()
                    },
                )),
            ],
        ))],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 1),
        focus: Point::new(vec![0, 1], 1),
    };
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    insert(&mut editor, "X");

    let Node::Element(el) = &editor.doc().children[0] else {
        panic!("expected paragraph");
    };
    let runs: Vec<_> = el
        .children
        .iter()
        .filter_map(|n| match n {
            Node::Text(t) => Some((t.text.clone(), t.marks.bold)),
            _ => None,
        })
        .collect();
    assert_eq!(
        runs,
        vec![("aX".to_string(), false), ("d".to_string(), true)]
    );
}

#[test]
fn multi_block_replacement_clears_the_blocks_between() {
    let doc = Document {
        children: vec![
            Node::paragraph("one"),
            Node::paragraph("two"),
            Node::paragraph("three"),
        ],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 2),
        focus: Point::new(vec![2, 0], 2),
    };
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    insert(&mut editor, "-");

    assert_eq!(editor.doc().children.len(), 3);
    let texts: Vec<String> = editor
        .doc()
        .children
        .iter()
        .map(|n| match n {
            Node::Element(el) => el
                .children
                .iter()
                .filter_map(|c| match c {
                    Node::Text(t) => Some(t.text.as_str()),
                    _ => None,
                })
                .collect(),
            _ => String::new(),
        })
        .collect();
    assert_eq!(texts, vec!["on-", "", "ree"]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 3));
}

#[test]
fn replacement_is_undone_as_one_step() {
    let doc = Document {
        children: vec![Node::paragraph("abcdef")],
    };
    let selection = Selection {
        anchor: Point::new(vec![0, 0], 1),
        focus: Point::new(vec![0, 0], 5),
    };
    let mut editor = Editor::new(doc, selection, PluginRegistry::standard());

    insert(&mut editor, "Z");
    assert_eq!(editor.doc().plain_text(), "aZf");

    assert!(editor.undo());
    assert_eq!(editor.doc().plain_text(), "abcdef");
}
