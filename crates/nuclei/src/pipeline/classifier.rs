use crate::{config::DetectionConfig, types::Contour};

/// How one external contour is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentPath {
    /// Area outside the accepted range
    Discard,
    /// Small enough to be a single nucleus
    Direct,
    /// Split by one watershed pass over its bounding box
    SinglePass,
    /// Bounding box too large for one pass, split tile by tile
    Tiled,
}

/// Routes contours by area and bounding-box size
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentClassifier {
    pub min_area: f64,
    pub small_area: f64,
    pub max_area: f64,
    pub huge_roi_pixels: u64,
}

impl ComponentClassifier {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            min_area: config.min_area,
            small_area: config.small_area,
            max_area: config.max_area,
            huge_roi_pixels: config.huge_roi_pixels,
        }
    }

    /// Open interval `(min_area, max_area)`
    pub fn accepts(&self, area: f64) -> bool {
        area > self.min_area && area < self.max_area
    }

    pub fn classify(&self, contour: &Contour) -> ComponentPath {
        if !self.accepts(contour.area) {
            ComponentPath::Discard
        } else if contour.area <= self.small_area {
            ComponentPath::Direct
        } else if contour.bounds.pixel_count() >= self.huge_roi_pixels {
            ComponentPath::Tiled
        } else {
            ComponentPath::SinglePass
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rectangle(w: i32, h: i32) -> Contour {
        Contour::from_points(vec![[0, 0], [w - 1, 0], [w - 1, h - 1], [0, h - 1]])
    }

    fn classifier() -> ComponentClassifier {
        ComponentClassifier {
            min_area: 10.0,
            small_area: 80.0,
            max_area: 5000.0,
            huge_roi_pixels: 3000,
        }
    }

    #[test]
    fn bounds_are_exclusive() {
        let classifier = classifier();
        assert!(!classifier.accepts(10.0));
        assert!(classifier.accepts(10.5));
        assert!(!classifier.accepts(5000.0));
    }

    #[test]
    fn routes_by_area_then_footprint() {
        let classifier = classifier();
        // 3x3 encloses 4 px
        assert_eq!(classifier.classify(&rectangle(3, 3)), ComponentPath::Discard);
        assert_eq!(classifier.classify(&rectangle(7, 11)), ComponentPath::Direct);
        assert_eq!(classifier.classify(&rectangle(40, 40)), ComponentPath::SinglePass);
        assert_eq!(classifier.classify(&rectangle(60, 60)), ComponentPath::Tiled);
        assert_eq!(classifier.classify(&rectangle(80, 80)), ComponentPath::Discard);
    }

    #[test]
    fn small_but_below_min_is_discarded() {
        let classifier = ComponentClassifier { min_area: 70.0, ..classifier() };
        assert_eq!(classifier.classify(&rectangle(7, 11)), ComponentPath::Discard);
    }
}
