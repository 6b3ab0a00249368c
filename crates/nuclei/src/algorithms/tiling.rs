//! Watershed over regions too large for a single pass.
//!
//! The region is cut into overlapping tiles; each tile is segmented on its
//! full extent, seams are merged with a pointwise maximum, and an object is
//! counted by the one tile whose core rectangle holds its centroid. Cores
//! partition the region, so an object fully visible in two tiles is still
//! counted once.

use image::{imageops, GrayImage};
use tracing::{debug, warn};

use crate::{
    algorithms::{watershed::WatershedSegmenter, zone::any_in_window},
    types::PixelRect,
};

/// One tile of a [`TileGrid`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDescriptor {
    /// Pixels handed to the segmenter
    pub rect: PixelRect,
    /// Pixels whose objects this tile counts
    pub core: PixelRect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisSpan {
    start: u32,
    end: u32,
    core_start: u32,
    core_end: u32,
}

/// Tile starts along one axis on a stride of `tile - overlap`; the last tile
/// is the first one reaching `len`.
fn axis_spans(len: u32, tile: u32, overlap: u32) -> Vec<AxisSpan> {
    if len == 0 || tile == 0 {
        return Vec::new();
    }
    let step = tile.saturating_sub(overlap).max(1);
    let margin = overlap / 2;

    let mut starts = vec![0u32];
    while let Some(&last) = starts.last() {
        if last as u64 + tile as u64 >= len as u64 {
            break;
        }
        starts.push(last + step);
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = (start as u64 + tile as u64).min(len as u64) as u32;
            let core_start = if i == 0 { 0 } else { start + margin };
            let core_end = match starts.get(i + 1) {
                Some(&next) => (next + margin).min(end),
                None => len,
            };
            if core_start >= core_end {
                AxisSpan { start, end, core_start: start, core_end: end }
            } else {
                AxisSpan { start, end, core_start, core_end }
            }
        })
        .collect()
}

/// Overlapping tiling of a `width` x `height` region
#[derive(Debug, Clone)]
pub struct TileGrid {
    tiles: Vec<TileDescriptor>,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tile_size: u32, overlap: u32) -> Self {
        let columns = axis_spans(width, tile_size, overlap);
        let rows = axis_spans(height, tile_size, overlap);

        let tiles = rows
            .iter()
            .flat_map(|row| {
                columns.iter().map(move |column| TileDescriptor {
                    rect: PixelRect::new(column.start, row.start, column.end - column.start, row.end - row.start),
                    core: PixelRect::new(
                        column.core_start,
                        row.core_start,
                        column.core_end - column.core_start,
                        row.core_end - row.core_start,
                    ),
                })
            })
            .collect();

        Self { tiles }
    }

    pub fn tiles(&self) -> &[TileDescriptor] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Region-wide seam mask built from tile seam masks
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeAccumulator {
    mask: GrayImage,
}

impl EdgeAccumulator {
    pub fn new(width: u32, height: u32) -> Self {
        Self { mask: GrayImage::new(width, height) }
    }

    /// Pointwise maximum of the tile mask placed at the tile offset
    pub fn composite(&mut self, rect: &PixelRect, edges: &GrayImage) {
        let width = edges.width().min(self.mask.width().saturating_sub(rect.x));
        let height = edges.height().min(self.mask.height().saturating_sub(rect.y));
        for y in 0..height {
            for x in 0..width {
                let value = edges.get_pixel(x, y)[0];
                let target = self.mask.get_pixel_mut(rect.x + x, rect.y + y);
                target[0] = target[0].max(value);
            }
        }
    }

    pub fn into_mask(self) -> GrayImage {
        self.mask
    }
}

/// Segmentation of one tile, reduced to what the region needs
#[derive(Debug, Clone)]
pub struct TileResult {
    pub tile: TileDescriptor,
    pub edges: GrayImage,
    /// Objects whose centroid lies in the tile core
    pub counted: usize,
    /// Counted objects wider or taller than the tile overlap
    pub oversized: usize,
}

/// Outcome of a tiled segmentation
#[derive(Debug, Clone)]
pub struct TiledSegmentation {
    pub edges: GrayImage,
    pub object_count: usize,
    pub tiles_segmented: usize,
    pub tiles_skipped: usize,
    pub oversized_objects: usize,
}

#[derive(Debug, Clone)]
pub struct TileOrchestrator {
    pub tile_size: u32,
    pub overlap: u32,
    pub segmenter: WatershedSegmenter,
}

impl TileOrchestrator {
    pub fn new(tile_size: u32, overlap: u32, segmenter: WatershedSegmenter) -> Self {
        Self { tile_size, overlap, segmenter }
    }

    /// Segment one tile of `roi`; `None` when the tile holds no foreground
    pub fn segment_tile(&self, roi: &GrayImage, tile: &TileDescriptor) -> Option<TileResult> {
        let rect = tile.rect;
        if !any_in_window(roi, rect.x, rect.y, rect.width, rect.height) {
            return None;
        }

        let patch = imageops::crop_imm(roi, rect.x, rect.y, rect.width, rect.height).to_image();
        let markers = self.segmenter.segment(&patch);

        let mut counted = 0;
        let mut oversized = 0;
        for region in markers.region_stats() {
            let (cx, cy) = region.centroid();
            if !tile.core.contains(rect.x + cx, rect.y + cy) {
                continue;
            }
            counted += 1;
            let bounds = region.bounds();
            if bounds.width > self.overlap || bounds.height > self.overlap {
                oversized += 1;
            }
        }

        Some(TileResult {
            tile: *tile,
            edges: markers.edge_mask(),
            counted,
            oversized,
        })
    }

    pub fn segment(&self, roi: &GrayImage) -> TiledSegmentation {
        let (width, height) = roi.dimensions();
        let grid = TileGrid::new(width, height, self.tile_size, self.overlap);
        let mut edges = EdgeAccumulator::new(width, height);
        let mut object_count = 0;
        let mut tiles_segmented = 0;
        let mut oversized_objects = 0;

        for tile in grid.tiles() {
            let Some(result) = self.segment_tile(roi, tile) else {
                continue;
            };
            edges.composite(&result.tile.rect, &result.edges);
            object_count += result.counted;
            oversized_objects += result.oversized;
            tiles_segmented += 1;
        }

        let tiles_skipped = grid.len() - tiles_segmented;
        debug!(tiles_segmented, tiles_skipped, object_count, "Tiled watershed");
        if oversized_objects > 0 {
            warn!(
                oversized_objects,
                overlap = self.overlap,
                "Objects larger than the tile overlap may be counted twice or missed"
            );
        }

        TiledSegmentation {
            edges: edges.into_mask(),
            object_count,
            tiles_segmented,
            tiles_skipped,
            oversized_objects,
        }
    }
}
