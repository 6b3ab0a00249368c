use image::{GrayImage, Luma};
use imageproc::{drawing::draw_polygon_mut, point::Point};

use crate::io::annotation::Ring;

pub const ZONE_VALUE: u8 = 255;

/// Rasterize zone rings into a `width` x `height` binary mask.
///
/// Vertices are clipped to the raster before being truncated to pixels, so
/// annotations drawn past the slide edge still cover the border pixels.
pub fn build_zone_mask(rings: &[Ring], width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return mask;
    }

    for ring in rings {
        let polygon = clip_ring(ring, width, height);
        if polygon.len() < 3 {
            continue;
        }
        draw_polygon_mut(&mut mask, &polygon, Luma([ZONE_VALUE]));
    }

    mask
}

/// Clip, truncate and dedupe ring vertices; the closing vertex is dropped
fn clip_ring(ring: &[[f64; 2]], width: u32, height: u32) -> Vec<Point<i32>> {
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;

    let mut points: Vec<Point<i32>> = Vec::with_capacity(ring.len());
    for &[x, y] in ring {
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        let point = Point::new(x.clamp(0.0, max_x) as i32, y.clamp(0.0, max_y) as i32);
        if points.last() != Some(&point) {
            points.push(point);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Number of pixels inside the zones
pub fn masked_area(mask: &GrayImage) -> u64 {
    mask.as_raw().iter().filter(|&&v| v != 0).count() as u64
}

/// Whether any zone pixel falls inside the given window
pub fn any_in_window(mask: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> bool {
    let stride = mask.width() as usize;
    let raw = mask.as_raw();
    (y..y + height).any(|row| {
        let start = row as usize * stride + x as usize;
        raw[start..start + width as usize].iter().any(|&v| v != 0)
    })
}
