use image::{GrayImage, Rgb, RgbImage};
use tracing::debug;

use crate::{
    algorithms::zone::any_in_window,
    error::{NucleiError, Result},
};

pub const FOREGROUND: u8 = 255;

/// Stain vectors (rows: haematoxylin, eosin, DAB) in RGB optical density space
const RGB_FROM_HED: [[f64; 3]; 3] = [[0.65, 0.70, 0.29], [0.07, 0.99, 0.11], [0.27, 0.57, 0.78]];

const OD_FLOOR: f64 = 1e-6;

/// Haematoxylin-Eosin-DAB colour deconvolution reduced to the DAB channel
#[derive(Debug, Clone)]
pub struct DabDeconvolution {
    /// DAB column of the inverse stain matrix
    dab: [f32; 3],
    log_floor: f32,
}

impl Default for DabDeconvolution {
    fn default() -> Self {
        let inverse = invert3(RGB_FROM_HED);
        Self {
            dab: [inverse[0][2] as f32, inverse[1][2] as f32, inverse[2][2] as f32],
            log_floor: OD_FLOOR.ln() as f32,
        }
    }
}

impl DabDeconvolution {
    /// DAB optical density of one pixel, clamped at zero
    #[inline]
    pub fn dab(&self, pixel: &Rgb<u8>) -> f32 {
        let mut density = 0.0f32;
        for (channel, weight) in pixel.0.iter().zip(self.dab) {
            let value = (*channel as f32 / 255.0).max(OD_FLOOR as f32);
            density += value.ln() / self.log_floor * weight;
        }
        density.max(0.0)
    }
}

fn invert3(m: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let [[a, b, c], [d, e, f], [g, h, i]] = m;
    let det = a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g);
    [
        [(e * i - f * h) / det, (c * h - b * i) / det, (b * f - c * e) / det],
        [(f * g - d * i) / det, (a * i - c * g) / det, (c * d - a * f) / det],
        [(d * h - e * g) / det, (b * g - a * h) / det, (a * e - b * d) / det],
    ]
}

/// Tiled DAB thresholding restricted to a zone mask
#[derive(Debug, Clone)]
pub struct StainBinarizer {
    pub threshold: f32,
    pub tile_size: u32,
    deconvolution: DabDeconvolution,
}

impl Default for StainBinarizer {
    fn default() -> Self {
        Self::new(0.02, 1536)
    }
}

impl StainBinarizer {
    pub fn new(threshold: f32, tile_size: u32) -> Self {
        Self {
            threshold,
            tile_size: tile_size.max(1),
            deconvolution: DabDeconvolution::default(),
        }
    }

    /// Binary foreground, 255 where the DAB density exceeds the threshold
    /// inside the zone mask.
    ///
    /// Tiles that hold no zone pixel are never converted.
    pub fn binarize(&self, raster: &RgbImage, zone_mask: &GrayImage) -> Result<GrayImage> {
        let (width, height) = raster.dimensions();
        if zone_mask.dimensions() != (width, height) {
            return Err(NucleiError::ImageProcessing(format!(
                "zone mask is {:?} but raster is {:?}",
                zone_mask.dimensions(),
                (width, height)
            )));
        }

        let mut out = GrayImage::new(width, height);
        let mut skipped = 0usize;
        let mut converted = 0usize;

        for ty in (0..height).step_by(self.tile_size as usize) {
            for tx in (0..width).step_by(self.tile_size as usize) {
                let tw = self.tile_size.min(width - tx);
                let th = self.tile_size.min(height - ty);
                if !any_in_window(zone_mask, tx, ty, tw, th) {
                    skipped += 1;
                    continue;
                }
                converted += 1;
                for y in ty..ty + th {
                    for x in tx..tx + tw {
                        if zone_mask.get_pixel(x, y)[0] == 0 {
                            continue;
                        }
                        if self.deconvolution.dab(raster.get_pixel(x, y)) > self.threshold {
                            out.put_pixel(x, y, image::Luma([FOREGROUND]));
                        }
                    }
                }
            }
        }

        debug!(converted, skipped, "Stain binarization tiles");
        Ok(out)
    }
}
