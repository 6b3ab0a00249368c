//! Watershed seeds from distance-transform maxima.

use std::cmp::Ordering;

use image::{GrayImage, ImageBuffer, Luma};

use crate::config::DetectionConfig;

/// Single-channel float image, used for distance maps
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

pub const SEED: u8 = 255;

/// Lower bound of the seed threshold
const THRESHOLD_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct SeedParams {
    /// Half side of the square neighbourhood a peak must dominate
    pub min_distance: u32,
    /// Fraction of the global maximum a seed must exceed
    pub threshold_ratio: f32,
    /// Percentile of the positive distances, used when lower than the ratio threshold
    pub percentile: f32,
    /// Keep at most this many of the highest peaks
    pub max_seeds: Option<usize>,
}

impl Default for SeedParams {
    fn default() -> Self {
        Self {
            min_distance: 2,
            threshold_ratio: 0.28,
            percentile: 35.0,
            max_seeds: None,
        }
    }
}

impl SeedParams {
    pub fn from_config(config: &DetectionConfig, max_seeds: usize) -> Self {
        Self {
            min_distance: config.seed_min_dist,
            threshold_ratio: config.seed_thr_ratio,
            percentile: config.seed_percentile,
            max_seeds: Some(max_seeds),
        }
    }

    pub fn with_max_seeds(mut self, max_seeds: Option<usize>) -> Self {
        self.max_seeds = max_seeds;
        self
    }
}

/// Seed threshold: `max(eps, min(ratio * max, percentile(positive values)))`
pub fn seed_threshold(distance: &FloatImage, params: &SeedParams) -> f32 {
    let values = distance.as_raw();
    let global_max = values.iter().copied().fold(0.0f32, f32::max);
    let positives: Vec<f32> = values.iter().copied().filter(|&v| v > 0.0).collect();
    let by_ratio = global_max * params.threshold_ratio;
    let by_percentile = percentile(positives, params.percentile).unwrap_or(0.0);
    by_ratio.min(by_percentile).max(THRESHOLD_EPSILON)
}

/// Percentile with linear interpolation between the two closest ranks
pub fn percentile(mut values: Vec<f32>, p: f32) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let rank = (p.clamp(0.0, 100.0) as f64 / 100.0) * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let fraction = (rank - lower as f64) as f32;

    let (_, pivot, above) = values.select_nth_unstable_by(lower, f32::total_cmp);
    let low = *pivot;
    if fraction == 0.0 || above.is_empty() {
        return Some(low);
    }
    let high = above.iter().copied().fold(f32::INFINITY, f32::min);
    Some(low + (high - low) * fraction)
}

/// Square maximum filter of half side `radius`; pixels outside the image are ignored
pub fn max_filter(image: &FloatImage, radius: u32) -> FloatImage {
    let (width, height) = image.dimensions();
    if radius == 0 {
        return image.clone();
    }
    let r = radius as i64;

    let mut horizontal = FloatImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let lo = (x as i64 - r).max(0) as u32;
            let hi = (x as i64 + r).min(width as i64 - 1) as u32;
            let m = (lo..=hi).map(|xx| image.get_pixel(xx, y)[0]).fold(f32::NEG_INFINITY, f32::max);
            horizontal.put_pixel(x, y, Luma([m]));
        }
    }

    let mut out = FloatImage::new(width, height);
    for y in 0..height {
        let lo = (y as i64 - r).max(0) as u32;
        let hi = (y as i64 + r).min(height as i64 - 1) as u32;
        for x in 0..width {
            let m = (lo..=hi).map(|yy| horizontal.get_pixel(x, yy)[0]).fold(f32::NEG_INFINITY, f32::max);
            out.put_pixel(x, y, Luma([m]));
        }
    }
    out
}

/// Binary seed image (255 = seed) from a distance map.
///
/// A seed is a pixel equal to the maximum of its `2 * min_distance + 1`
/// neighbourhood and above [`seed_threshold`]. When more candidates than
/// `max_seeds` exist, only the highest are kept (ties go to the earlier pixel
/// in raster order). A map without any positive value yields no seeds.
pub fn generate_seeds(distance: &FloatImage, params: &SeedParams) -> GrayImage {
    let (width, height) = distance.dimensions();
    let mut seeds = GrayImage::new(width, height);

    let threshold = seed_threshold(distance, params);
    if !distance.as_raw().iter().any(|&v| v > threshold) {
        return seeds;
    }

    let dilated = max_filter(distance, params.min_distance);
    let mut candidates: Vec<(usize, f32)> = distance
        .as_raw()
        .iter()
        .zip(dilated.as_raw())
        .enumerate()
        .filter(|(_, (v, m))| **v > threshold && *v == *m)
        .map(|(index, (v, _))| (index, *v))
        .collect();

    if let Some(cap) = params.max_seeds {
        if candidates.len() > cap {
            if cap == 0 {
                return seeds;
            }
            let by_strength = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
                b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
            };
            candidates.select_nth_unstable_by(cap - 1, by_strength);
            candidates.truncate(cap);
        }
    }

    let raw: &mut [u8] = &mut seeds;
    for (index, _) in candidates {
        raw[index] = SEED;
    }
    seeds
}
