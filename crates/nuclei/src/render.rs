//! Drawing of detection results onto a copy of the slide raster.

use std::{fs::File, io::BufWriter, path::Path};

use image::{
    codecs::png::{CompressionType, FilterType, PngEncoder},
    GrayImage, Luma, Rgb, RgbImage,
};
use imageproc::{
    distance_transform::Norm,
    drawing::{draw_hollow_rect_mut, draw_line_segment_mut},
    morphology::dilate,
    rect::Rect,
};

use crate::{algorithms::extraction::external_contours, error::Result, types::{Contour, PixelRect}};

pub const OBJECT_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
pub const SEAM_COLOUR: Rgb<u8> = Rgb([255, 0, 255]);
pub const BOX_COLOUR: Rgb<u8> = Rgb([255, 255, 0]);
pub const ZONE_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);

fn trace<C>(canvas: &mut C, points: &[[i32; 2]], colour: C::Pixel)
where
    C: imageproc::drawing::Canvas,
{
    let as_f32 = |p: &[i32; 2]| (p[0] as f32, p[1] as f32);
    match points {
        [] => {}
        [only] => draw_line_segment_mut(canvas, as_f32(only), as_f32(only), colour),
        [first, .., last] => {
            for pair in points.windows(2) {
                draw_line_segment_mut(canvas, as_f32(&pair[0]), as_f32(&pair[1]), colour);
            }
            draw_line_segment_mut(canvas, as_f32(last), as_f32(first), colour);
        }
    }
}

/// Closed 1 px outline of a contour in image coordinates
pub fn draw_outline(canvas: &mut RgbImage, contour: &Contour, colour: Rgb<u8>) {
    trace(canvas, &contour.points, colour);
}

/// Grow a binary mask with a `thickness` x `thickness` square anchored at its
/// centre; even sizes reach one pixel further down and right than up and left
fn thicken(mask: &GrayImage, thickness: u32) -> GrayImage {
    let thickness = thickness.clamp(1, 2 * u8::MAX as u32 + 1);
    let radius = ((thickness - 1) / 2) as u8;
    let grown = if radius == 0 { mask.clone() } else { dilate(mask, Norm::LInf, radius) };
    if thickness % 2 == 1 {
        return grown;
    }

    GrayImage::from_fn(grown.width(), grown.height(), |x, y| {
        let at = |dx: u32, dy: u32| x >= dx && y >= dy && grown.get_pixel(x - dx, y - dy)[0] != 0;
        if at(0, 0) || at(1, 0) || at(0, 1) || at(1, 1) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Paint every non-zero pixel of `mask` placed at `origin`, after thickening
pub fn overlay_mask(canvas: &mut RgbImage, mask: &GrayImage, origin: (u32, u32), thickness: u32, colour: Rgb<u8>) {
    let thick = thicken(mask, thickness);
    let (width, height) = canvas.dimensions();
    for (x, y, pixel) in thick.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        let (cx, cy) = (origin.0 + x, origin.1 + y);
        if cx < width && cy < height {
            canvas.put_pixel(cx, cy, colour);
        }
    }
}

/// Hollow box from `(x, y)` to `(x + width, y + height)` inclusive
pub fn draw_box(canvas: &mut RgbImage, rect: &PixelRect, colour: Rgb<u8>) {
    let outline = Rect::at(rect.x as i32, rect.y as i32).of_size(rect.width + 1, rect.height + 1);
    draw_hollow_rect_mut(canvas, outline, colour);
}

/// Outline of every outer component of the zone mask
pub fn draw_zone_outline(canvas: &mut RgbImage, zone_mask: &GrayImage, thickness: u32) {
    let mut outline = GrayImage::new(zone_mask.width(), zone_mask.height());
    for contour in external_contours(zone_mask) {
        trace(&mut outline, &contour.points, Luma([255u8]));
    }
    overlay_mask(canvas, &outline, (0, 0), thickness, ZONE_COLOUR);
}

/// Map a 0..=9 compression level onto the encoder presets
pub fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

pub fn save_png<P: AsRef<Path>>(image: &RgbImage, path: P, level: u8) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    let encoder = PngEncoder::new_with_quality(writer, png_compression(level), FilterType::Adaptive);
    image.write_with_encoder(encoder)?;
    Ok(())
}
