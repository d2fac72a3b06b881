use crate::command::{FormatCommand, Insertion};
use crate::crop::{CropError, CropRect, CropSession};
use crate::session::{EditorSession, SessionError};
use crate::snapshot::SelectionSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkFields {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageFields {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Default)]
pub enum FlowState {
    #[default]
    Idle,
    AwaitingLink(LinkFields),
    AwaitingImage(ImageFields),
    Cropping {
        fields: ImageFields,
        crop: CropSession,
    },
}

/// The link/image dialog flow. Opening a dialog steals focus from the
/// editor, so the selection is snapshotted first and re-applied on confirm;
/// a snapshot gone stale by then degrades to the end of the document.
#[derive(Debug, Default)]
pub struct InsertionFlow {
    state: FlowState,
    pending_selection: Option<SelectionSnapshot>,
}

impl InsertionFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn open_link(&mut self, session: &mut EditorSession) {
        self.pending_selection = session.capture_snapshot();
        session.selection_left_surface();
        self.state = FlowState::AwaitingLink(LinkFields::default());
    }

    pub fn open_image(&mut self, session: &mut EditorSession) {
        self.pending_selection = session.capture_snapshot();
        session.selection_left_surface();
        self.state = FlowState::AwaitingImage(ImageFields::default());
    }

    pub fn set_link_href(&mut self, href: &str) {
        if let FlowState::AwaitingLink(fields) = &mut self.state {
            fields.href = href.to_string();
        }
    }

    pub fn set_link_text(&mut self, text: &str) {
        if let FlowState::AwaitingLink(fields) = &mut self.state {
            fields.text = text.to_string();
        }
    }

    pub fn set_image_src(&mut self, src: &str) {
        if let FlowState::AwaitingImage(fields) = &mut self.state {
            fields.src = src.to_string();
        }
    }

    pub fn set_image_alt(&mut self, alt: &str) {
        if let FlowState::AwaitingImage(fields) = &mut self.state {
            fields.alt = alt.to_string();
        }
    }

    pub fn can_confirm(&self) -> bool {
        match &self.state {
            FlowState::Idle | FlowState::Cropping { .. } => false,
            FlowState::AwaitingLink(fields) => !fields.href.is_empty() && !fields.text.is_empty(),
            FlowState::AwaitingImage(fields) => !fields.src.is_empty(),
        }
    }

    pub fn cancel(&mut self) {
        self.state = FlowState::Idle;
        self.pending_selection = None;
    }

    /// Applies the dialog: restore the remembered selection (or fall back to
    /// the end of the document) and dispatch the insertion.
    pub fn confirm(&mut self, session: &mut EditorSession) -> Result<(), SessionError> {
        if !self.can_confirm() {
            return Err(SessionError::IncompleteFields);
        }
        let insertion = match std::mem::take(&mut self.state) {
            FlowState::AwaitingLink(fields) => Insertion::Link {
                href: fields.href,
                text: fields.text,
            },
            FlowState::AwaitingImage(fields) => Insertion::Image {
                src: fields.src,
                alt: fields.alt,
            },
            state => {
                self.state = state;
                return Err(SessionError::IncompleteFields);
            }
        };

        let snapshot = self.pending_selection.take();
        session.restore_snapshot(snapshot);
        session.dispatch(FormatCommand::Insert(insertion))
    }

    /// Opens the crop editor over the raw image bytes. Only reachable from
    /// the image dialog; decode failure leaves the dialog untouched.
    pub fn begin_crop(&mut self, bytes: &[u8]) -> Result<(), CropError> {
        match std::mem::take(&mut self.state) {
            FlowState::AwaitingImage(fields) => match CropSession::load(bytes) {
                Ok(crop) => {
                    self.state = FlowState::Cropping { fields, crop };
                    Ok(())
                }
                Err(err) => {
                    self.state = FlowState::AwaitingImage(fields);
                    Err(err)
                }
            },
            state => {
                self.state = state;
                Ok(())
            }
        }
    }

    pub fn set_crop_rect(&mut self, rect: CropRect) {
        if let FlowState::Cropping { crop, .. } = &mut self.state {
            crop.set_rect(rect);
        }
    }

    /// Renders the crop and hands the result back to the image dialog as its
    /// source.
    pub fn confirm_crop(&mut self) -> Result<(), CropError> {
        match std::mem::take(&mut self.state) {
            FlowState::Cropping { mut fields, crop } => match crop.render() {
                Ok(src) => {
                    fields.src = src;
                    self.state = FlowState::AwaitingImage(fields);
                    Ok(())
                }
                Err(err) => {
                    self.state = FlowState::Cropping { fields, crop };
                    Err(err)
                }
            },
            state => {
                self.state = state;
                Ok(())
            }
        }
    }

    pub fn cancel_crop(&mut self) {
        if let FlowState::Cropping { .. } = self.state {
            let FlowState::Cropping { fields, .. } = std::mem::take(&mut self.state) else {
                return;
            };
            self.state = FlowState::AwaitingImage(fields);
        }
    }
}
