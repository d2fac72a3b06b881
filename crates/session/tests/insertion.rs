use std::io::Cursor;

use penmark_session::{
    CropError, CropRect, EditorSession, FlowState, InsertionFlow, SessionError,
};

fn caret_at_end(session: &mut EditorSession) {
    session.handle_focus();
    let doc = session.engine().doc();
    let end = doc.end_point();
    let id = doc.id_at(&end.path).expect("end point resolves");
    assert!(session.select((id, end.offset), (id, end.offset)));
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            image::Rgba([255, 0, 0, 255])
        } else {
            image::Rgba([0, 0, 255, 255])
        }
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn link_dialog_requires_both_fields() {
    let mut session = EditorSession::new("");
    let mut flow = InsertionFlow::new();

    flow.open_link(&mut session);
    assert!(matches!(flow.state(), FlowState::AwaitingLink(_)));
    assert!(!flow.can_confirm());

    flow.set_link_href("https://example.com");
    assert!(!flow.can_confirm());
    let err = flow.confirm(&mut session).unwrap_err();
    assert!(matches!(err, SessionError::IncompleteFields));

    flow.set_link_text("Docs");
    assert!(flow.can_confirm());
    flow.confirm(&mut session).unwrap();
    assert!(matches!(flow.state(), FlowState::Idle));
    assert_eq!(
        session.value(),
        "<p><a href=\"https://example.com\">Docs</a></p>"
    );
}

#[test]
fn link_insert_returns_to_the_remembered_selection() {
    let mut session = EditorSession::new("<p>See  for details</p>");
    session.handle_focus();
    let id = session.engine().doc().id_at(&[0, 0]).unwrap();
    session.select((id, 4), (id, 4));

    let mut flow = InsertionFlow::new();
    flow.open_link(&mut session);
    flow.set_link_href("https://example.com");
    flow.set_link_text("here");
    flow.confirm(&mut session).unwrap();

    assert_eq!(
        session.value(),
        "<p>See <a href=\"https://example.com\">here</a> for details</p>"
    );
}

#[test]
fn image_dialog_inserts_after_the_current_block() {
    let mut session = EditorSession::new("<p>Note</p>");
    caret_at_end(&mut session);

    let mut flow = InsertionFlow::new();
    flow.open_image(&mut session);
    assert!(!flow.can_confirm());

    flow.set_image_src("x.png");
    flow.set_image_alt("pic");
    assert!(flow.can_confirm());
    flow.confirm(&mut session).unwrap();

    assert_eq!(
        session.value(),
        "<p>Note</p><img src=\"x.png\" alt=\"pic\" /><p></p>"
    );
}

#[test]
fn cancel_clears_fields_and_pending_selection() {
    let mut session = EditorSession::new("<p>Note</p>");
    caret_at_end(&mut session);

    let mut flow = InsertionFlow::new();
    flow.open_image(&mut session);
    flow.set_image_src("x.png");
    flow.cancel();
    assert!(matches!(flow.state(), FlowState::Idle));

    // Reopening starts from blank fields.
    flow.open_image(&mut session);
    assert!(!flow.can_confirm());
}

#[test]
fn stale_snapshot_degrades_to_document_end() {
    let mut session = EditorSession::new("<p>Old</p>");
    caret_at_end(&mut session);

    let mut flow = InsertionFlow::new();
    flow.open_image(&mut session);
    flow.set_image_src("x.png");

    // The host replaces the document while the dialog is open; every node
    // the snapshot referenced is gone.
    session.handle_blur();
    session.set_external_value("<p>New</p>");

    flow.confirm(&mut session).unwrap();
    assert_eq!(
        session.value(),
        "<p>New</p><img src=\"x.png\" alt=\"\" /><p></p>"
    );
}

#[test]
fn crop_flow_produces_a_data_uri_source() {
    let mut session = EditorSession::new("<p>Note</p>");
    caret_at_end(&mut session);

    let mut flow = InsertionFlow::new();
    flow.open_image(&mut session);
    flow.begin_crop(&png_bytes(4, 4)).unwrap();
    assert!(matches!(flow.state(), FlowState::Cropping { .. }));
    assert!(!flow.can_confirm());

    flow.set_crop_rect(CropRect {
        x: 0.0,
        y: 0.0,
        width: 50.0,
        height: 100.0,
    });
    flow.confirm_crop().unwrap();

    let FlowState::AwaitingImage(fields) = flow.state() else {
        panic!("crop confirm should return to the image dialog");
    };
    assert!(fields.src.starts_with("data:image/png;base64,"));
    assert!(flow.can_confirm());

    flow.confirm(&mut session).unwrap();
    assert!(session.value().contains("data:image/png;base64,"));
}

#[test]
fn undecodable_bytes_leave_the_dialog_untouched() {
    let mut session = EditorSession::new("<p>Note</p>");
    caret_at_end(&mut session);

    let mut flow = InsertionFlow::new();
    flow.open_image(&mut session);
    flow.set_image_src("x.png");

    let err = flow.begin_crop(b"definitely not an image").unwrap_err();
    assert!(matches!(err, CropError::Decode(_)));
    assert!(matches!(flow.state(), FlowState::AwaitingImage(_)));
    assert!(flow.can_confirm());
}

#[test]
fn cancel_crop_keeps_the_original_source() {
    let mut session = EditorSession::new("<p>Note</p>");
    caret_at_end(&mut session);

    let mut flow = InsertionFlow::new();
    flow.open_image(&mut session);
    flow.set_image_src("x.png");
    flow.begin_crop(&png_bytes(4, 4)).unwrap();

    flow.cancel_crop();
    let FlowState::AwaitingImage(fields) = flow.state() else {
        panic!("cancel should return to the image dialog");
    };
    assert_eq!(fields.src, "x.png");
}
