//! Marker-based watershed over a binary patch.
//!
//! The patch is turned into a Euclidean distance map, seeds are taken from its
//! maxima, and every seed floods the foreground in order of decreasing
//! distance. Background pixels never change owner.

use std::{cmp::Ordering, collections::BinaryHeap};

use image::{GrayImage, Luma};
use imageproc::{
    distance_transform::euclidean_squared_distance_transform,
    region_labelling::{connected_components, Connectivity},
};

use crate::{
    algorithms::seeds::{generate_seeds, FloatImage, SeedParams},
    types::PixelRect,
};

/// Foreground pixel not reached by any seed
pub const UNLABELLED: i32 = 0;
/// Pixel outside the binary foreground
pub const BACKGROUND_LABEL: i32 = 1;
/// First label given to a seed-grown region
pub const FIRST_REGION_LABEL: i32 = 2;
/// Pixel where two regions meet
pub const EDGE_LABEL: i32 = -1;

const QUEUED: i32 = -2;

/// Euclidean distance of every foreground pixel to the nearest background
/// pixel; pixels outside the patch count as background.
pub fn distance_transform(binary: &GrayImage) -> FloatImage {
    let (width, height) = binary.dimensions();

    // Background (and a one pixel frame) become the features the transform
    // measures distance to.
    let mut features = GrayImage::from_pixel(width + 2, height + 2, Luma([255u8]));
    for (x, y, pixel) in binary.enumerate_pixels() {
        if pixel[0] != 0 {
            features.put_pixel(x + 1, y + 1, Luma([0]));
        }
    }

    let squared = euclidean_squared_distance_transform(&features);
    FloatImage::from_fn(width, height, |x, y| {
        Luma([squared.get_pixel(x + 1, y + 1)[0].sqrt() as f32])
    })
}

/// Per-region statistics gathered in one pass over the markers grid
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStats {
    pub label: i32,
    pub area: u64,
    sum_x: u64,
    sum_y: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl RegionStats {
    fn new(label: i32) -> Self {
        Self {
            label,
            area: 0,
            sum_x: 0,
            sum_y: 0,
            min_x: u32::MAX,
            min_y: u32::MAX,
            max_x: 0,
            max_y: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Centroid truncated to whole pixels
    pub fn centroid(&self) -> (u32, u32) {
        ((self.sum_x / self.area) as u32, (self.sum_y / self.area) as u32)
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(
            self.min_x,
            self.min_y,
            self.max_x - self.min_x + 1,
            self.max_y - self.min_y + 1,
        )
    }
}

/// Label grid produced by one watershed pass
#[derive(Debug, Clone, PartialEq)]
pub struct Markers {
    width: u32,
    height: u32,
    labels: Vec<i32>,
}

impl Markers {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> i32 {
        self.labels[y as usize * self.width as usize + x as usize]
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    /// 255 on every seam pixel
    pub fn edge_mask(&self) -> GrayImage {
        let raw = self
            .labels
            .iter()
            .map(|&l| if l == EDGE_LABEL { 255 } else { 0 })
            .collect();
        GrayImage::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Statistics of every region (labels >= 2), ordered by label
    pub fn region_stats(&self) -> Vec<RegionStats> {
        let max_label = self.labels.iter().copied().max().unwrap_or(0);
        if max_label < FIRST_REGION_LABEL {
            return Vec::new();
        }
        let mut stats: Vec<RegionStats> = (FIRST_REGION_LABEL..=max_label).map(RegionStats::new).collect();
        let width = self.width as usize;
        for (index, &label) in self.labels.iter().enumerate() {
            if label >= FIRST_REGION_LABEL {
                let x = (index % width) as u32;
                let y = (index / width) as u32;
                stats[(label - FIRST_REGION_LABEL) as usize].add(x, y);
            }
        }
        stats.retain(|s| s.area > 0);
        stats
    }

    pub fn region_count(&self) -> usize {
        self.region_stats().len()
    }

    /// Binary mask (255) of one region cropped to `rect`
    pub fn region_mask(&self, label: i32, rect: PixelRect) -> GrayImage {
        GrayImage::from_fn(rect.width, rect.height, |x, y| {
            if self.get(rect.x + x, rect.y + y) == label {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

#[derive(Debug, PartialEq)]
struct Pending {
    level: f32,
    order: u64,
    index: usize,
}

impl Eq for Pending {}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // Highest level first, then first come first served
        self.level
            .total_cmp(&other.level)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn neighbours(index: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
    let x = index % width;
    let y = index / width;
    [
        (x > 0).then(|| index - 1),
        (x + 1 < width).then(|| index + 1),
        (y > 0).then(|| index - width),
        (y + 1 < height).then(|| index + width),
    ]
    .into_iter()
    .flatten()
}

/// Flood `labels` from its seed regions over the pixels where `surface` is
/// positive, highest surface first.
fn flood(labels: &mut [i32], surface: &FloatImage) {
    let width = surface.width() as usize;
    let height = surface.height() as usize;
    let levels = surface.as_raw();
    let mut queue = BinaryHeap::new();
    let mut order = 0u64;

    let mut enqueue_neighbours = |labels: &mut [i32], queue: &mut BinaryHeap<Pending>, index: usize| {
        for n in neighbours(index, width, height) {
            if labels[n] == UNLABELLED {
                labels[n] = QUEUED;
                queue.push(Pending { level: levels[n], order, index: n });
                order += 1;
            }
        }
    };

    for index in 0..labels.len() {
        if labels[index] >= FIRST_REGION_LABEL {
            enqueue_neighbours(labels, &mut queue, index);
        }
    }

    while let Some(Pending { index, .. }) = queue.pop() {
        let mut owner = UNLABELLED;
        for n in neighbours(index, width, height) {
            let label = labels[n];
            if label < FIRST_REGION_LABEL {
                continue;
            }
            if owner == UNLABELLED {
                owner = label;
            } else if owner != label {
                owner = EDGE_LABEL;
                break;
            }
        }
        labels[index] = owner;
        if owner >= FIRST_REGION_LABEL {
            enqueue_neighbours(labels, &mut queue, index);
        }
    }
}

/// Distance transform, seeding and flooding of one binary patch
#[derive(Debug, Clone, Default)]
pub struct WatershedSegmenter {
    pub seeds: SeedParams,
}

impl WatershedSegmenter {
    pub fn new(seeds: SeedParams) -> Self {
        Self { seeds }
    }

    pub fn segment(&self, binary: &GrayImage) -> Markers {
        let (width, height) = binary.dimensions();
        let distance = distance_transform(binary);
        let seeds = generate_seeds(&distance, &self.seeds);
        let components = connected_components(&seeds, Connectivity::Eight, Luma([0u8]));

        let mut labels: Vec<i32> = binary
            .as_raw()
            .iter()
            .zip(components.as_raw())
            .map(|(&pixel, &component)| match (pixel, component) {
                (0, _) => BACKGROUND_LABEL,
                (_, 0) => UNLABELLED,
                (_, c) => c as i32 + 1,
            })
            .collect();

        flood(&mut labels, &distance);

        Markers { width, height, labels }
    }
}
