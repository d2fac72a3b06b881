use penmark_session::{
    EditorSession, Rect, Size, TOOLBAR_GAP, ToolbarPlacement, position_toolbar,
};

const SURFACE: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 800.0,
    height: 600.0,
};

const TOOLBAR: Size = Size {
    width: 200.0,
    height: 40.0,
};

#[test]
fn toolbar_centers_above_the_selection() {
    let selection = Rect::new(100.0, 200.0, 80.0, 20.0);
    let placement = position_toolbar(selection, SURFACE, TOOLBAR);
    assert_eq!(
        placement,
        ToolbarPlacement::At {
            left: 100.0 + 40.0 - 100.0,
            top: 200.0 - 40.0 - TOOLBAR_GAP,
        }
    );
}

#[test]
fn toolbar_clamps_to_the_surface_edges() {
    // Selection hugging the top-left corner would push the toolbar off both
    // edges without clamping.
    let selection = Rect::new(0.0, 10.0, 10.0, 20.0);
    assert_eq!(
        position_toolbar(selection, SURFACE, TOOLBAR),
        ToolbarPlacement::At { left: 0.0, top: 0.0 }
    );

    let selection = Rect::new(780.0, 590.0, 15.0, 20.0);
    assert_eq!(
        position_toolbar(selection, SURFACE, TOOLBAR),
        ToolbarPlacement::At {
            left: SURFACE.width - TOOLBAR.width,
            top: SURFACE.height - TOOLBAR.height,
        }
    );
}

#[test]
fn degenerate_or_offscreen_selection_hides_the_toolbar() {
    assert_eq!(
        position_toolbar(Rect::new(100.0, 100.0, 0.0, 20.0), SURFACE, TOOLBAR),
        ToolbarPlacement::Hidden
    );
    assert_eq!(
        position_toolbar(Rect::new(100.0, 100.0, 80.0, 0.0), SURFACE, TOOLBAR),
        ToolbarPlacement::Hidden
    );
    assert_eq!(
        position_toolbar(Rect::new(900.0, 100.0, 80.0, 20.0), SURFACE, TOOLBAR),
        ToolbarPlacement::Hidden
    );
}

#[test]
fn session_hides_the_toolbar_for_a_collapsed_selection() {
    let mut session = EditorSession::new("<p>Hello world</p>");
    session.handle_focus();
    let id = session.engine().doc().id_at(&[0, 0]).unwrap();
    session.select((id, 3), (id, 3));

    let placement = session.update_floating_toolbar(
        Rect::new(100.0, 200.0, 2.0, 20.0),
        SURFACE,
        TOOLBAR,
    );
    assert_eq!(placement, ToolbarPlacement::Hidden);
}

#[test]
fn session_places_the_toolbar_for_a_range_selection() {
    let mut session = EditorSession::new("<p>Hello world</p>");
    session.handle_focus();
    let id = session.engine().doc().id_at(&[0, 0]).unwrap();
    session.select((id, 0), (id, 5));

    let placement = session.update_floating_toolbar(
        Rect::new(100.0, 200.0, 80.0, 20.0),
        SURFACE,
        TOOLBAR,
    );
    assert!(matches!(placement, ToolbarPlacement::At { .. }));
    assert_eq!(session.toolbar_placement(), placement);

    // Leaving the surface hides it again.
    session.selection_left_surface();
    assert_eq!(session.toolbar_placement(), ToolbarPlacement::Hidden);
}
