use geo_types::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle, `x..x + width` by `y..y + height`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Half-open containment test
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

/// External boundary of one connected stain-positive component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    /// Border pixels in tracing order
    pub points: Vec<[i32; 2]>,
    /// Polygon area enclosed by the traced border
    pub area: f64,
    pub bounds: PixelRect,
}

impl Contour {
    pub fn from_points(points: Vec<[i32; 2]>) -> Self {
        let area = polygon_area(&points);
        let bounds = bounding_rect(&points);
        Self { points, area, bounds }
    }

    /// Shift every point, used when a contour found in a patch is moved back
    /// into image coordinates
    pub fn translate(&mut self, dx: i32, dy: i32) {
        for point in &mut self.points {
            point[0] += dx;
            point[1] += dy;
        }
        self.bounds.x = (self.bounds.x as i64 + dx as i64).max(0) as u32;
        self.bounds.y = (self.bounds.y as i64 + dy as i64).max(0) as u32;
    }
}

fn to_polygon(points: &[[i32; 2]]) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = points
        .iter()
        .map(|&[x, y]| Coord { x: x as f64, y: y as f64 })
        .collect();
    Polygon::new(LineString::new(coords), vec![])
}

fn polygon_area(points: &[[i32; 2]]) -> f64 {
    use geo::Area;
    if points.len() < 3 {
        return 0.0;
    }
    to_polygon(points).unsigned_area()
}

/// Inclusive pixel extent of a point set
fn bounding_rect(points: &[[i32; 2]]) -> PixelRect {
    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;

    for &[x, y] in points {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    if points.is_empty() {
        return PixelRect::new(0, 0, 0, 0);
    }

    PixelRect::new(
        min_x.max(0) as u32,
        min_y.max(0) as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rectangle(x: i32, y: i32, w: i32, h: i32) -> Vec<[i32; 2]> {
        vec![[x, y], [x + w - 1, y], [x + w - 1, y + h - 1], [x, y + h - 1]]
    }

    #[test]
    fn area_is_polygon_area_through_border_pixels() {
        let contour = Contour::from_points(rectangle(10, 20, 7, 11));
        assert_eq!(contour.area, 60.0);
        assert_eq!(contour.bounds, PixelRect::new(10, 20, 7, 11));
    }

    #[test]
    fn degenerate_contours_have_zero_area() {
        assert_eq!(Contour::from_points(vec![[3, 3]]).area, 0.0);
        assert_eq!(Contour::from_points(vec![[3, 3], [4, 3]]).area, 0.0);
    }

    #[test]
    fn translate_moves_points_and_bounds() {
        let mut contour = Contour::from_points(rectangle(0, 0, 5, 5));
        contour.translate(100, 40);
        assert_eq!(contour.points[0], [100, 40]);
        assert_eq!(contour.bounds, PixelRect::new(100, 40, 5, 5));
    }

    #[test]
    fn rect_containment_is_half_open() {
        let rect = PixelRect::new(10, 10, 5, 5);
        assert!(rect.contains(10, 10));
        assert!(rect.contains(14, 14));
        assert!(!rect.contains(15, 14));
        assert_eq!(rect.pixel_count(), 25);
    }
}
