use std::io::Cursor;

use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use penmark_session::{CropError, CropRect, CropSession};

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

fn half_and_half_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 { RED } else { BLUE }
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn decode_data_uri(uri: &str) -> DynamicImage {
    let payload = uri
        .strip_prefix("data:image/png;base64,")
        .expect("png data uri");
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .unwrap();
    image::load_from_memory(&bytes).unwrap()
}

#[test]
fn load_reports_the_natural_size_and_a_centered_rect() {
    let session = CropSession::load(&half_and_half_png(8, 6)).unwrap();
    assert_eq!(session.natural_size(), (8, 6));
    assert_eq!(session.rect(), CropRect::centered());
}

#[test]
fn cropping_the_left_half_keeps_only_red_pixels() {
    let mut session = CropSession::load(&half_and_half_png(4, 4)).unwrap();
    session.set_rect(CropRect {
        x: 0.0,
        y: 0.0,
        width: 50.0,
        height: 100.0,
    });

    let cropped = decode_data_uri(&session.render().unwrap());
    assert_eq!((cropped.width(), cropped.height()), (2, 4));
    let rgba = cropped.to_rgba8();
    assert!(rgba.pixels().all(|p| *p == RED));
}

#[test]
fn centered_rect_takes_the_middle_of_each_axis() {
    let session = CropSession::load(&half_and_half_png(4, 4)).unwrap();
    let cropped = decode_data_uri(&session.render().unwrap());
    assert_eq!((cropped.width(), cropped.height()), (2, 2));
}

#[test]
fn out_of_range_rect_is_clamped() {
    let mut session = CropSession::load(&half_and_half_png(10, 10)).unwrap();
    session.set_rect(CropRect {
        x: 90.0,
        y: 90.0,
        width: 50.0,
        height: 50.0,
    });
    assert_eq!(
        session.rect(),
        CropRect {
            x: 90.0,
            y: 90.0,
            width: 10.0,
            height: 10.0,
        }
    );

    let cropped = decode_data_uri(&session.render().unwrap());
    assert_eq!((cropped.width(), cropped.height()), (1, 1));
}

#[test]
fn zero_area_rect_is_rejected() {
    let mut session = CropSession::load(&half_and_half_png(4, 4)).unwrap();
    session.set_rect(CropRect {
        x: 10.0,
        y: 10.0,
        width: 0.0,
        height: 50.0,
    });
    assert!(matches!(session.render(), Err(CropError::EmptyRegion)));
}

#[test]
fn garbage_bytes_fail_to_load() {
    let err = CropSession::load(b"not a png").unwrap_err();
    assert!(matches!(err, CropError::Decode(_)));
}
