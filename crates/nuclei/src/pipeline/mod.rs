//! Per-slide detection: binarize, extract, classify and count.

pub mod classifier;

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    algorithms::{
        extraction::{external_contours, extract_external_contours, ContourSet},
        seeds::SeedParams,
        stain::StainBinarizer,
        tiling::TileOrchestrator,
        watershed::WatershedSegmenter,
        zone::masked_area,
    },
    config::DetectionConfig,
    deadline::Deadline,
    error::{NucleiError, Result},
    render::{self, BOX_COLOUR, OBJECT_COLOUR, SEAM_COLOUR},
    traits::ProgressSink,
    types::Contour,
};

pub use classifier::{ComponentClassifier, ComponentPath};

/// Objects counted on each handling path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PathTally {
    /// Contours outside the accepted area range
    pub discarded: usize,
    pub direct: usize,
    /// Sub-objects outlined after a single watershed pass
    pub single_pass: usize,
    /// Segments counted in regions drawn edge-only after a single pass
    pub edge_only: usize,
    pub tiled: usize,
    /// Tiled objects wider or taller than the tile overlap
    pub oversized: usize,
}

/// Result of one slide's detection
#[derive(Debug, Clone)]
pub struct Detection {
    pub annotated: RgbImage,
    pub object_count: usize,
    pub masked_area: u64,
    /// The deadline stopped the contour loop early
    pub partial: bool,
    pub tally: PathTally,
}

impl Detection {
    /// Objects per masked pixel, as a percentage rounded to 3 decimals
    pub fn density_percent(&self) -> f64 {
        density_percent(self.object_count, self.masked_area)
    }
}

pub fn density_percent(count: usize, masked_area: u64) -> f64 {
    if masked_area == 0 {
        return 0.0;
    }
    (count as f64 / masked_area as f64 * 100.0 * 1000.0).round() / 1000.0
}

/// Counts stained objects of one raster inside a zone mask
#[derive(Debug, Clone)]
pub struct Detector {
    config: DetectionConfig,
    classifier: ComponentClassifier,
    binarizer: StainBinarizer,
    single_pass: WatershedSegmenter,
    tiles: TileOrchestrator,
}

impl Detector {
    pub fn new(config: DetectionConfig) -> Self {
        let classifier = ComponentClassifier::from_config(&config);
        let binarizer = StainBinarizer::new(config.stain_threshold, config.stain_tile_size);
        let single_pass = WatershedSegmenter::new(SeedParams::from_config(&config, config.seed_max_full));
        let tiles = TileOrchestrator::new(
            config.tile_size,
            config.tile_overlap,
            WatershedSegmenter::new(SeedParams::from_config(&config, config.seed_max_tile)),
        );
        Self {
            config,
            classifier,
            binarizer,
            single_pass,
            tiles,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn classifier(&self) -> &ComponentClassifier {
        &self.classifier
    }

    /// Run detection on `raster` restricted to `zone_mask`.
    ///
    /// The deadline is checked before every contour; once it has run out the
    /// loop stops and the objects drawn so far are returned with `partial`
    /// set. A slide whose contour count exceeds `max_contours` fails with
    /// [`NucleiError::NoiseOverload`], and an inconsistent configuration with
    /// [`NucleiError::InvalidConfig`].
    pub fn detect(
        &self,
        raster: &RgbImage,
        zone_mask: &GrayImage,
        deadline: &mut Deadline,
        progress: &mut dyn ProgressSink,
    ) -> Result<Detection> {
        self.config.validate()?;
        let binary = self.binarizer.binarize(raster, zone_mask)?;

        let contours = match extract_external_contours(&binary, self.config.max_contours) {
            ContourSet::Found(contours) => contours,
            ContourSet::TooMany(found) => {
                return Err(NucleiError::NoiseOverload {
                    found,
                    limit: self.config.max_contours,
                })
            }
        };
        debug!(contours = contours.len(), "Extracted stain contours");

        let mut annotated = raster.clone();
        let mut object_count = 0;
        let mut tally = PathTally::default();
        let mut partial = false;

        for contour in &contours {
            if let Some(note) = deadline.slow_note() {
                progress.on_image_progress(deadline.elapsed(), Some(note));
            }
            if deadline.expired() {
                warn!(
                    elapsed_s = deadline.elapsed().as_secs_f64(),
                    counted = object_count,
                    "Timeout during contour processing, keeping partial result"
                );
                partial = true;
                break;
            }

            match self.classifier.classify(contour) {
                ComponentPath::Discard => tally.discarded += 1,
                ComponentPath::Direct => {
                    render::draw_outline(&mut annotated, contour, OBJECT_COLOUR);
                    object_count += 1;
                    tally.direct += 1;
                }
                ComponentPath::SinglePass => {
                    let counted = self.segment_single_pass(&mut annotated, &binary, contour, &mut tally);
                    object_count += counted;
                }
                ComponentPath::Tiled => {
                    let counted = self.segment_tiled(&mut annotated, &binary, contour, &mut tally);
                    object_count += counted;
                }
            }
        }

        render::draw_zone_outline(&mut annotated, zone_mask, self.config.zone_outline_thickness);

        let detection = Detection {
            annotated,
            object_count,
            masked_area: masked_area(zone_mask),
            partial,
            tally,
        };
        info!(
            objects = detection.object_count,
            masked_area = detection.masked_area,
            density = detection.density_percent(),
            partial,
            "Detection finished"
        );
        Ok(detection)
    }

    fn segment_single_pass(
        &self,
        annotated: &mut RgbImage,
        binary: &GrayImage,
        contour: &Contour,
        tally: &mut PathTally,
    ) -> usize {
        let bounds = contour.bounds;
        let patch = component_patch(binary, contour);
        let markers = self.single_pass.segment(&patch);
        let regions = markers.region_stats();

        if regions.len() > self.config.draw_limit_roi {
            render::overlay_mask(
                annotated,
                &markers.edge_mask(),
                (bounds.x, bounds.y),
                self.config.edge_thickness,
                SEAM_COLOUR,
            );
            render::draw_box(annotated, &bounds, BOX_COLOUR);
            tally.edge_only += regions.len();
            return regions.len();
        }

        let mut counted = 0;
        for region in &regions {
            let region_bounds = region.bounds();
            let mask = markers.region_mask(region.label, region_bounds);
            for mut sub in external_contours(&mask) {
                if !self.classifier.accepts(sub.area) {
                    continue;
                }
                sub.translate(
                    (bounds.x + region_bounds.x) as i32,
                    (bounds.y + region_bounds.y) as i32,
                );
                render::draw_outline(annotated, &sub, OBJECT_COLOUR);
                counted += 1;
            }
        }
        tally.single_pass += counted;
        counted
    }

    fn segment_tiled(
        &self,
        annotated: &mut RgbImage,
        binary: &GrayImage,
        contour: &Contour,
        tally: &mut PathTally,
    ) -> usize {
        let bounds = contour.bounds;
        let patch = component_patch(binary, contour);
        let result = self.tiles.segment(&patch);

        render::overlay_mask(
            annotated,
            &result.edges,
            (bounds.x, bounds.y),
            self.config.edge_thickness,
            SEAM_COLOUR,
        );
        render::draw_box(annotated, &bounds, BOX_COLOUR);
        tally.tiled += result.object_count;
        tally.oversized += result.oversized_objects;
        result.object_count
    }
}

/// Foreground inside the contour's bounding box, limited to the connected
/// component the contour traces so neighbouring components are not counted
/// twice. Linear in the box area whatever the border length.
fn component_patch(binary: &GrayImage, contour: &Contour) -> GrayImage {
    let bounds = contour.bounds;
    let mut patch = imageops::crop_imm(binary, bounds.x, bounds.y, bounds.width, bounds.height).to_image();
    let labels = connected_components(&patch, Connectivity::Eight, Luma([0u8]));

    let own = contour.points.iter().find_map(|&[x, y]| {
        let (px, py) = (x - bounds.x as i32, y - bounds.y as i32);
        let inside = px >= 0 && py >= 0 && (px as u32) < bounds.width && (py as u32) < bounds.height;
        inside
            .then(|| labels.get_pixel(px as u32, py as u32)[0])
            .filter(|&label| label != 0)
    });

    match own {
        Some(own) => {
            for (pixel, label) in patch.pixels_mut().zip(labels.pixels()) {
                if label[0] != own {
                    pixel[0] = 0;
                }
            }
        }
        None => {
            warn!(x = bounds.x, y = bounds.y, "Contour does not touch its own foreground, patch left empty");
            patch.pixels_mut().for_each(|pixel| pixel[0] = 0);
        }
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NoProgress;
    use image::Rgb;

    const BROWN: Rgb<u8> = Rgb([120, 70, 30]);
    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn fill(raster: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                raster.put_pixel(x, y, BROWN);
            }
        }
    }

    fn fill_disc(raster: &mut RgbImage, cx: i64, cy: i64, r: i64) {
        for y in (cy - r).max(0)..=(cy + r).min(raster.height() as i64 - 1) {
            for x in (cx - r).max(0)..=(cx + r).min(raster.width() as i64 - 1) {
                if (x - cx).pow(2) + (y - cy).pow(2) <= r * r {
                    raster.put_pixel(x as u32, y as u32, BROWN);
                }
            }
        }
    }

    fn detect(config: DetectionConfig, raster: &RgbImage) -> Detection {
        let zone = GrayImage::from_pixel(raster.width(), raster.height(), Luma([255]));
        Detector::new(config)
            .detect(raster, &zone, &mut Deadline::unlimited(), &mut NoProgress)
            .expect("Should detect")
    }

    #[test]
    fn density_rounds_to_three_decimals() {
        assert_eq!(density_percent(1, 3), 33.333);
        assert_eq!(density_percent(5, 0), 0.0);
    }

    #[test]
    fn direct_and_single_pass_objects_are_counted() {
        let mut raster = RgbImage::from_pixel(120, 120, WHITE);
        fill(&mut raster, 10, 10, 7, 11);
        fill(&mut raster, 50, 50, 50, 50);

        let detection = detect(DetectionConfig::default(), &raster);
        assert_eq!(detection.object_count, 2);
        assert_eq!(detection.tally.direct, 1);
        assert_eq!(detection.tally.single_pass, 1);
        assert!(!detection.partial);
        assert_eq!(*detection.annotated.get_pixel(10, 15), OBJECT_COLOUR);
    }

    #[test]
    fn tiny_specks_are_discarded() {
        let mut raster = RgbImage::from_pixel(40, 40, WHITE);
        fill(&mut raster, 5, 5, 2, 2);
        let detection = detect(DetectionConfig::default(), &raster);
        assert_eq!(detection.object_count, 0);
        assert_eq!(detection.tally.discarded, 1);
    }

    #[test]
    fn crowded_region_is_drawn_edge_only() {
        let mut raster = RgbImage::from_pixel(200, 60, WHITE);
        // Chain of overlapping discs forming one necked component
        for i in 0..6 {
            fill_disc(&mut raster, 25 + i * 26, 30, 15);
        }
        let config = DetectionConfig::default().with_draw_limit_roi(1);
        let detection = detect(config, &raster);
        assert!(detection.tally.edge_only > 1);
        assert_eq!(detection.object_count, detection.tally.edge_only);
        assert_eq!(*detection.annotated.get_pixel(10, 15), BOX_COLOUR);
    }

    #[test]
    fn huge_region_goes_through_tiles() {
        let mut raster = RgbImage::from_pixel(300, 300, WHITE);
        fill(&mut raster, 20, 20, 260, 260);
        let config = DetectionConfig::default()
            .with_huge_roi_pixels(10_000)
            .with_tiling(128, 32);
        let detection = detect(config, &raster);
        assert!(detection.tally.tiled >= 1);
        assert_eq!(detection.object_count, detection.tally.tiled);
        assert_eq!(*detection.annotated.get_pixel(20, 20), BOX_COLOUR);
    }

    #[test]
    fn noise_overload_is_an_error() {
        let mut raster = RgbImage::from_pixel(60, 60, WHITE);
        for i in 0..5 {
            fill(&mut raster, 2 + i * 10, 2, 4, 4);
        }
        let zone = GrayImage::from_pixel(60, 60, Luma([255]));
        let detector = Detector::new(DetectionConfig::default().with_max_contours(4));
        let result = detector.detect(&raster, &zone, &mut Deadline::unlimited(), &mut NoProgress);
        assert!(matches!(result, Err(NucleiError::NoiseOverload { found: 5, limit: 4 })));
    }

    #[test]
    fn invalid_tiling_is_rejected_before_detection() {
        let raster = RgbImage::from_pixel(40, 40, WHITE);
        let zone = GrayImage::from_pixel(40, 40, Luma([255]));
        for config in [
            DetectionConfig::default().with_tiling(64, 64),
            DetectionConfig::default().with_tiling(0, 0),
        ] {
            let result = Detector::new(config).detect(&raster, &zone, &mut Deadline::unlimited(), &mut NoProgress);
            assert!(matches!(result, Err(NucleiError::InvalidConfig(_))));
        }
    }

    #[test]
    fn comb_patch_keeps_whole_component_and_drops_strays() {
        // Spine along the top with 2 px teeth every 3 px; the first tooth runs
        // to the bottom and specks sit under the shorter ones
        let (width, height) = (600u32, 400u32);
        let mut binary = GrayImage::new(width, height);
        for x in 0..width {
            for y in 0..4 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }
        for x in (0..width - 1).step_by(3) {
            let end = if x == 0 { height } else { 300 };
            for y in 4..end {
                binary.put_pixel(x, y, Luma([255]));
                binary.put_pixel(x + 1, y, Luma([255]));
            }
        }
        for x in (10..590).step_by(40) {
            binary.put_pixel(x, 350, Luma([255]));
        }

        let contour = external_contours(&binary)
            .into_iter()
            .max_by(|a, b| a.area.total_cmp(&b.area))
            .expect("Should find the comb");
        assert!(contour.points.len() > 50_000);

        let patch = component_patch(&binary, &contour);
        assert_eq!(patch.dimensions(), (width, height));
        for (x, y, pixel) in patch.enumerate_pixels() {
            let comb = y < 4 || (x % 3 != 2 && (y < 300 || x < 2));
            assert_eq!(pixel[0] != 0, comb, "pixel ({x}, {y})");
        }
    }

    #[test]
    fn patch_excludes_other_components_in_bounding_box() {
        let mut binary = GrayImage::new(40, 40);
        // L shape with a separate blob inside its bounding box
        for y in 0..30 {
            for x in 0..6 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 24..30 {
            for x in 0..30 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 5..10 {
            for x in 15..20 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }
        let contour = external_contours(&binary)
            .into_iter()
            .max_by(|a, b| a.area.total_cmp(&b.area))
            .expect("Should find the L shape");
        let patch = component_patch(&binary, &contour);
        assert_eq!(patch.get_pixel(17, 7)[0], 0);
        assert_eq!(patch.get_pixel(2, 2)[0], 255);
        assert_eq!(patch.get_pixel(20, 26)[0], 255);
    }
}
