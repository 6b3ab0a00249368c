//! Detection parameters.
//!
//! Every threshold the engine reads lives in [`DetectionConfig`]. The value is
//! built once (defaults, a TOML/JSON file, or the `with_*` setters) and passed
//! by reference into the detector; nothing in the crate mutates it afterwards.

use std::{fs, path::Path, time::Duration};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{NucleiError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    #[schemars(description = "Pyramid level the slide is decoded at")]
    pub level: u32,
    #[schemars(description = "DAB optical density above which a pixel is stain-positive")]
    pub stain_threshold: f32,
    #[schemars(description = "Contours with area <= min_area are discarded")]
    pub min_area: f64,
    #[schemars(description = "Contours with area <= small_area are counted without segmentation")]
    pub small_area: f64,
    #[schemars(description = "Contours with area >= max_area are discarded")]
    pub max_area: f64,
    #[schemars(description = "Per-slide wall clock budget in seconds")]
    pub timeout_s: f64,
    #[schemars(description = "Slides producing more contours than this are skipped")]
    pub max_contours: usize,
    #[schemars(description = "Bounding-box pixel count from which a region is segmented by tiles")]
    pub huge_roi_pixels: u64,
    #[schemars(description = "Above this many segments a region is drawn edge-only")]
    pub draw_limit_roi: usize,
    #[schemars(description = "Side of a watershed tile in pixels")]
    pub tile_size: u32,
    #[schemars(description = "Overlap between neighbouring watershed tiles in pixels")]
    pub tile_overlap: u32,
    #[schemars(description = "Thickness of the violet seam overlay")]
    pub edge_thickness: u32,
    #[schemars(description = "Side of the tiles used while binarizing the stain channel")]
    pub stain_tile_size: u32,
    #[schemars(description = "Minimum distance between two watershed seeds")]
    pub seed_min_dist: u32,
    #[schemars(description = "Seed threshold as a fraction of the distance maximum")]
    pub seed_thr_ratio: f32,
    #[schemars(description = "Percentile of the positive distances used as fallback seed threshold")]
    pub seed_percentile: f32,
    #[schemars(description = "Seed cap for one watershed tile")]
    pub seed_max_tile: usize,
    #[schemars(description = "Seed cap for a single-pass region")]
    pub seed_max_full: usize,
    #[schemars(description = "Fraction of the timeout after which the slide is reported as heavily loaded")]
    pub slow_note_fraction: f64,
    #[schemars(description = "Minimum elapsed seconds before the heavy-load note is reported")]
    pub slow_note_min_s: f64,
    #[schemars(description = "Thickness of the red zone outline")]
    pub zone_outline_thickness: u32,
    #[schemars(description = "PNG compression level, 0 (fastest) to 9")]
    pub png_compression: u8,
    #[schemars(description = "Marker names looked up in slide file names, in priority order")]
    pub markers: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            level: 1,
            stain_threshold: 0.02,
            min_area: 10.0,
            small_area: 80.0,
            max_area: 10_000_000_000.0,
            timeout_s: 240.0,
            max_contours: 200_000,
            huge_roi_pixels: 1_000_000,
            draw_limit_roi: 6000,
            tile_size: 1024,
            tile_overlap: 96,
            edge_thickness: 1,
            stain_tile_size: 1536,
            seed_min_dist: 2,
            seed_thr_ratio: 0.28,
            seed_percentile: 35.0,
            seed_max_tile: 12_000,
            seed_max_full: 30_000,
            slow_note_fraction: 0.45,
            slow_note_min_s: 35.0,
            zone_outline_thickness: 3,
            png_compression: 1,
            markers: vec!["CD3".to_string(), "CD7".to_string()],
        }
    }
}

impl DetectionConfig {
    /// Get the JSON schema of the configuration file
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DetectionConfig)
    }

    /// Load a configuration file, picking the format from the extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref)?;
        let config = match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content)?,
            Some("json") => Self::from_json(&content)?,
            other => {
                return Err(NucleiError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject parameter combinations the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(NucleiError::InvalidConfig(msg));

        if !(self.min_area >= 0.0 && self.min_area < self.max_area) {
            return invalid(format!(
                "min_area ({}) must be non-negative and below max_area ({})",
                self.min_area, self.max_area
            ));
        }
        if self.tile_size == 0 || self.stain_tile_size == 0 {
            return invalid("tile sizes must be positive".to_string());
        }
        if self.tile_overlap >= self.tile_size {
            return invalid(format!(
                "tile_overlap ({}) must be smaller than tile_size ({})",
                self.tile_overlap, self.tile_size
            ));
        }
        if !(0.0..=100.0).contains(&self.seed_percentile) {
            return invalid(format!(
                "seed_percentile ({}) must lie in 0..=100",
                self.seed_percentile
            ));
        }
        if !(self.seed_thr_ratio > 0.0 && self.seed_thr_ratio <= 1.0) {
            return invalid(format!(
                "seed_thr_ratio ({}) must lie in (0, 1]",
                self.seed_thr_ratio
            ));
        }
        if self.edge_thickness == 0 || self.zone_outline_thickness == 0 {
            return invalid("outline thicknesses must be at least 1".to_string());
        }
        if self.png_compression > 9 {
            return invalid(format!(
                "png_compression ({}) must lie in 0..=9",
                self.png_compression
            ));
        }
        if self.timeout_s.is_nan() || self.timeout_s < 0.0 {
            return invalid(format!("timeout_s ({}) must be non-negative", self.timeout_s));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        seconds(self.timeout_s)
    }

    /// Elapsed time after which a slide is flagged as heavily loaded
    pub fn slow_note_after(&self) -> Duration {
        seconds(self.slow_note_min_s.max(self.timeout_s * self.slow_note_fraction))
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_stain_threshold(mut self, threshold: f32) -> Self {
        self.stain_threshold = threshold;
        self
    }

    pub fn with_areas(mut self, min_area: f64, small_area: f64, max_area: f64) -> Self {
        self.min_area = min_area;
        self.small_area = small_area;
        self.max_area = max_area;
        self
    }

    pub fn with_timeout_s(mut self, timeout_s: f64) -> Self {
        self.timeout_s = timeout_s;
        self
    }

    pub fn with_max_contours(mut self, max_contours: usize) -> Self {
        self.max_contours = max_contours;
        self
    }

    pub fn with_huge_roi_pixels(mut self, pixels: u64) -> Self {
        self.huge_roi_pixels = pixels;
        self
    }

    pub fn with_draw_limit_roi(mut self, limit: usize) -> Self {
        self.draw_limit_roi = limit;
        self
    }

    pub fn with_tiling(mut self, tile_size: u32, tile_overlap: u32) -> Self {
        self.tile_size = tile_size;
        self.tile_overlap = tile_overlap;
        self
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(if value > 0.0 { Duration::MAX } else { Duration::ZERO })
}
