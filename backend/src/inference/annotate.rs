//! Drawing detections and encoding the annotated result.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use std::io::Cursor;

use super::Detection;
use super::labels::COCO_LABELS;

const BOX_THICKNESS: u32 = 2;

const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [44, 153, 168],
    [0, 194, 255],
];

fn color_for(label: &str) -> Rgb<u8> {
    let index = COCO_LABELS
        .iter()
        .position(|l| *l == label)
        .unwrap_or(label.len());
    Rgb(PALETTE[index % PALETTE.len()])
}

/// Draws one hollow rectangle per detection.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    let (img_w, img_h) = image.dimensions();
    if img_w == 0 || img_h == 0 {
        return;
    }
    for detection in detections {
        let color = color_for(&detection.label);
        for inset in 0..BOX_THICKNESS {
            if let Some(rect) = rect_from_bbox(&detection.bbox, img_w, img_h, inset) {
                draw_hollow_rect_mut(image, rect, color);
            }
        }
    }
}

fn rect_from_bbox(bbox: &[f32; 4], img_w: u32, img_h: u32, inset: u32) -> Option<Rect> {
    let max_x = (img_w - 1) as f32;
    let max_y = (img_h - 1) as f32;
    let inset = inset as f32;

    let x1 = (bbox[0] + inset).clamp(0.0, max_x);
    let y1 = (bbox[1] + inset).clamp(0.0, max_y);
    let x2 = (bbox[2] - inset).clamp(0.0, max_x);
    let y2 = (bbox[3] - inset).clamp(0.0, max_y);
    if x2 < x1 || y2 < y1 {
        return None;
    }

    let width = (x2 - x1).max(1.0).round() as u32;
    let height = (y2 - y1).max(1.0).round() as u32;
    Some(Rect::at(x1.round() as i32, y1.round() as i32).of_size(width, height))
}

/// Output format for an extension: PNG, JPEG, or PNG bytes for anything else.
pub fn format_for_extension(ext: &str) -> ImageFormat {
    match ext.to_ascii_lowercase().as_str() {
        ".jpg" | ".jpeg" => ImageFormat::Jpeg,
        _ => ImageFormat::Png,
    }
}

pub fn encode_image(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image.clone()).write_to(&mut Cursor::new(&mut buf), format)?;
    Ok(buf)
}
