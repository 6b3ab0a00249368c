use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};

use crate::types::Contour;

/// Result of an external contour pass
#[derive(Debug, Clone, PartialEq)]
pub enum ContourSet {
    Found(Vec<Contour>),
    /// More contours than the noise guard allows; the count is kept for logs
    TooMany(usize),
}

/// External borders of every non-zero component.
///
/// Borders of components nested inside a hole of another component are
/// dropped, as are hole borders.
pub fn external_contours(binary: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .map(|contour| Contour::from_points(contour.points.iter().map(|p| [p.x, p.y]).collect()))
        .collect()
}

/// External contours guarded by a maximum count
pub fn extract_external_contours(binary: &GrayImage, max_contours: usize) -> ContourSet {
    let contours = external_contours(binary);
    if contours.len() > max_contours {
        ContourSet::TooMany(contours.len())
    } else {
        ContourSet::Found(contours)
    }
}
