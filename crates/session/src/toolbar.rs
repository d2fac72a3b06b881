/// Pure geometry for the floating toolbar. All coordinates are in the host
/// surface's coordinate space; nothing here touches the document.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Vertical clearance between the selection and the toolbar.
pub const TOOLBAR_GAP: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ToolbarPlacement {
    #[default]
    Hidden,
    At {
        top: f32,
        left: f32,
    },
}

/// Centers the toolbar above the selection, then clamps it into the surface
/// so it never overflows an edge.
pub fn position_toolbar(selection: Rect, surface: Rect, toolbar: Size) -> ToolbarPlacement {
    if selection.width <= 0.0 || selection.height <= 0.0 || !selection.intersects(&surface) {
        return ToolbarPlacement::Hidden;
    }

    let left = selection.x + selection.width / 2.0 - toolbar.width / 2.0;
    let top = selection.y - toolbar.height - TOOLBAR_GAP;

    let max_left = (surface.x + surface.width - toolbar.width).max(surface.x);
    let max_top = (surface.y + surface.height - toolbar.height).max(surface.y);

    ToolbarPlacement::At {
        left: left.clamp(surface.x, max_left),
        top: top.clamp(surface.y, max_top),
    }
}
