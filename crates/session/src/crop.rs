use std::io::Cursor;

use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

/// Crop region in percent of the natural image size, so the same rect means
/// the same thing at any display scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRect {
    /// The initial selection: a centered box covering half of each axis.
    pub fn centered() -> Self {
        Self {
            x: 25.0,
            y: 25.0,
            width: 50.0,
            height: 50.0,
        }
    }

    pub fn clamped(self) -> Self {
        let x = self.x.clamp(0.0, 100.0);
        let y = self.y.clamp(0.0, 100.0);
        Self {
            x,
            y,
            width: self.width.clamp(0.0, 100.0 - x),
            height: self.height.clamp(0.0, 100.0 - y),
        }
    }
}

#[derive(Debug, Error)]
pub enum CropError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("crop region is empty")]
    EmptyRegion,
    #[error("failed to encode cropped image: {0}")]
    Encode(image::ImageError),
}

/// A decoded source image plus the current crop rect. Construction fails on
/// undecodable bytes, which is what keeps the crop action unreachable for
/// broken images.
#[derive(Debug)]
pub struct CropSession {
    source: DynamicImage,
    rect: CropRect,
}

impl CropSession {
    pub fn load(bytes: &[u8]) -> Result<Self, CropError> {
        let source = image::load_from_memory(bytes)?;
        Ok(Self {
            source,
            rect: CropRect::centered(),
        })
    }

    pub fn natural_size(&self) -> (u32, u32) {
        (self.source.width(), self.source.height())
    }

    pub fn rect(&self) -> CropRect {
        self.rect
    }

    pub fn set_rect(&mut self, rect: CropRect) {
        self.rect = rect.clamped();
    }

    /// Rasterizes the selected region to a PNG data URI.
    pub fn render(&self) -> Result<String, CropError> {
        let (w, h) = self.natural_size();
        let rect = self.rect.clamped();

        let px = |percent: f32, total: u32| -> u32 {
            ((percent / 100.0) * total as f32).round() as u32
        };

        let x = px(rect.x, w).min(w);
        let y = px(rect.y, h).min(h);
        let width = px(rect.width, w).min(w - x);
        let height = px(rect.height, h).min(h - y);
        if width == 0 || height == 0 {
            return Err(CropError::EmptyRegion);
        }

        let cropped = self.source.crop_imm(x, y, width, height);
        let mut buf: Vec<u8> = Vec::new();
        cropped
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(CropError::Encode)?;

        Ok(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&buf)
        ))
    }
}
