use penmark_core::{Editor, NodeId, PluginRegistry, Selection, parse_document, serialize_document};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::command::{FormatCommand, HistoryAction};
use crate::format_state::ActiveFormats;
use crate::snapshot::{SelectionSnapshot, SelectionTracker};
use crate::toolbar::{Rect, Size, ToolbarPlacement, position_toolbar};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The serialized value changed through an in-editor mutation.
    ContentChanged(String),
    FormatsChanged(ActiveFormats),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("the remembered selection no longer exists in the document")]
    StaleSelection,
    #[error("no selection is available to format")]
    SelectionUnavailable,
    #[error("command failed: {0}")]
    Command(String),
    #[error("required fields are missing")]
    IncompleteFields,
}

/// One editor surface as the host sees it: a controlled HTML value, focus
/// and selection intake, command dispatch and the floating toolbar.
///
/// The value contract is one-directional at a time: while the session has
/// focus, external writes are ignored and the engine owns the value; once
/// blurred, an external write replaces the whole document and every node id
/// minted before it goes stale.
pub struct EditorSession {
    engine: Editor,
    content: String,
    has_focus: bool,
    live_selection: bool,
    tracker: SelectionTracker,
    active_formats: ActiveFormats,
    toolbar: ToolbarPlacement,
    events: Vec<SessionEvent>,
}

impl EditorSession {
    pub fn new(value: &str) -> Self {
        let doc = parse_document(value);
        let selection = Selection::collapsed(doc.end_point());
        let engine = Editor::new(doc, selection, PluginRegistry::standard());
        let content = serialize_document(engine.doc());
        let active_formats = ActiveFormats::recompute(&engine);
        Self {
            engine,
            content,
            has_focus: false,
            live_selection: false,
            tracker: SelectionTracker::default(),
            active_formats,
            toolbar: ToolbarPlacement::default(),
            events: Vec::new(),
        }
    }

    pub fn engine(&self) -> &Editor {
        &self.engine
    }

    pub fn value(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn has_focus(&self) -> bool {
        self.has_focus
    }

    pub fn active_formats(&self) -> &ActiveFormats {
        &self.active_formats
    }

    pub fn toolbar_placement(&self) -> ToolbarPlacement {
        self.toolbar
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn handle_focus(&mut self) {
        self.has_focus = true;
    }

    pub fn handle_blur(&mut self) {
        self.has_focus = false;
        self.live_selection = false;
        self.toolbar = ToolbarPlacement::Hidden;
    }

    /// Host-side write of the controlled value. Ignored while focused so a
    /// slow round-trip cannot clobber what the user is typing.
    pub fn set_external_value(&mut self, value: &str) {
        if self.has_focus {
            debug!("ignoring external value while the session is focused");
            return;
        }
        // The host echoing our own ContentChanged back must not clobber
        // node ids and selection state.
        if value == self.content {
            return;
        }
        let doc = parse_document(value);
        let selection = Selection::collapsed(doc.end_point());
        self.engine = Editor::new(doc, selection, PluginRegistry::standard());
        self.tracker.clear();
        self.live_selection = false;
        self.toolbar = ToolbarPlacement::Hidden;
        self.content = serialize_document(self.engine.doc());
        self.active_formats = ActiveFormats::recompute(&self.engine);
    }

    /// Selection intake from the host, addressed by node identity. Returns
    /// false (and changes nothing) when either endpoint does not resolve.
    pub fn select(&mut self, anchor: (NodeId, usize), focus: (NodeId, usize)) -> bool {
        let snapshot = SelectionSnapshot { anchor, focus };
        let Some(selection) = snapshot.resolve(self.engine.doc()) else {
            return false;
        };
        self.engine.set_selection(selection);
        self.live_selection = true;
        self.tracker
            .capture(self.engine.doc(), self.engine.selection());
        self.refresh_formats();
        true
    }

    /// The DOM selection moved off the editor (a dialog opened, the toolbar
    /// was clicked). The tracker keeps the last in-editor selection.
    pub fn selection_left_surface(&mut self) {
        self.live_selection = false;
        self.toolbar = ToolbarPlacement::Hidden;
    }

    pub fn capture_snapshot(&mut self) -> Option<SelectionSnapshot> {
        if self.live_selection {
            self.tracker
                .capture(self.engine.doc(), self.engine.selection())
        } else {
            self.tracker.latest()
        }
    }

    /// Re-selects a snapshot, or collapses to the end of the document when
    /// the snapshot is missing or stale. Returns whether the snapshot
    /// itself was restored.
    pub fn restore_snapshot(&mut self, snapshot: Option<SelectionSnapshot>) -> bool {
        self.has_focus = true;
        match snapshot.and_then(|s| s.resolve(self.engine.doc())) {
            Some(selection) => {
                self.engine.set_selection(selection);
                self.live_selection = true;
                true
            }
            None => {
                warn!("selection snapshot is stale; falling back to the end of the document");
                let end = self.engine.doc().end_point();
                self.engine.set_selection(Selection::collapsed(end));
                self.live_selection = true;
                false
            }
        }
    }

    /// Types text at the caret, as the host forwards keystrokes. A range
    /// selection is replaced by the typed text.
    pub fn insert_text(&mut self, text: &str) -> Result<(), SessionError> {
        self.has_focus = true;
        self.ensure_live_selection_or_end();

        self.engine
            .run_command("text.insert", Some(json!({ "text": text })))
            .map_err(|e| SessionError::Command(e.message().to_string()))?;
        self.commit_after_mutation();
        Ok(())
    }

    pub fn dispatch(&mut self, command: FormatCommand) -> Result<(), SessionError> {
        debug!(?command, "dispatch");
        // Focus returns to the editor before any command takes effect.
        self.has_focus = true;

        if let FormatCommand::History(action) = command {
            let changed = match action {
                HistoryAction::Undo => self.engine.undo(),
                HistoryAction::Redo => self.engine.redo(),
            };
            if changed {
                self.live_selection = true;
                self.commit_after_mutation();
            }
            return Ok(());
        }

        if !self.live_selection {
            let restored = self
                .tracker
                .latest()
                .and_then(|s| s.resolve(self.engine.doc()));
            match restored {
                Some(selection) => {
                    self.engine.set_selection(selection);
                    self.live_selection = true;
                }
                None if matches!(command, FormatCommand::Insert(_)) => {
                    // Insertions degrade to the end of the document rather
                    // than dropping the user's content on the floor.
                    let end = self.engine.doc().end_point();
                    self.engine.set_selection(Selection::collapsed(end));
                    self.live_selection = true;
                }
                None if self.tracker.latest().is_some() => {
                    return Err(SessionError::StaleSelection);
                }
                None => return Err(SessionError::SelectionUnavailable),
            }
        }

        let Some((id, args)) = command.engine_command() else {
            return Ok(());
        };
        self.engine
            .run_command(id, args)
            .map_err(|e| SessionError::Command(e.message().to_string()))?;
        self.commit_after_mutation();
        Ok(())
    }

    pub fn update_floating_toolbar(
        &mut self,
        selection: Rect,
        surface: Rect,
        toolbar: Size,
    ) -> ToolbarPlacement {
        let placement = if self.live_selection && !self.engine.selection().is_collapsed() {
            position_toolbar(selection, surface, toolbar)
        } else {
            ToolbarPlacement::Hidden
        };
        self.toolbar = placement;
        placement
    }

    fn ensure_live_selection_or_end(&mut self) {
        if self.live_selection {
            return;
        }
        let selection = self
            .tracker
            .latest()
            .and_then(|s| s.resolve(self.engine.doc()))
            .unwrap_or_else(|| Selection::collapsed(self.engine.doc().end_point()));
        self.engine.set_selection(selection);
        self.live_selection = true;
    }

    fn commit_after_mutation(&mut self) {
        self.tracker
            .capture(self.engine.doc(), self.engine.selection());
        self.refresh_formats();
        let serialized = serialize_document(self.engine.doc());
        if serialized != self.content {
            self.content = serialized;
            self.events
                .push(SessionEvent::ContentChanged(self.content.clone()));
        }
    }

    fn refresh_formats(&mut self) {
        let next = ActiveFormats::recompute(&self.engine);
        if next != self.active_formats {
            self.active_formats = next.clone();
            self.events.push(SessionEvent::FormatsChanged(next));
        }
    }
}
