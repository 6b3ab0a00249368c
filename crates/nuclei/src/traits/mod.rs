use std::{path::Path, time::Duration};

use image::RgbImage;

use crate::{batch::SlideOutcome, error::Result};

/// Source of decoded slide rasters
pub trait SlideReader: Send + Sync {
    /// Decode the whole slide at the requested pyramid level
    fn read_level(&self, path: &Path, level: u32) -> Result<RgbImage>;

    /// Whether this reader recognises the file, judged from its name
    fn accepts(&self, path: &Path) -> bool;
}

/// Receives progress notifications from a batch run.
///
/// Calls happen between slides and at a few fixed points inside one slide
/// (after decoding, and once when the slide crosses the heavy-load mark),
/// never from inside a tile loop.
pub trait ProgressSink {
    fn on_image_start(&mut self, index: usize, total: usize, name: &str);

    fn on_image_progress(&mut self, elapsed: Duration, note: Option<&str>);

    fn on_image_done(&mut self, index: usize, total: usize, outcome: &SlideOutcome);
}

/// Progress sink that drops every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_image_start(&mut self, _index: usize, _total: usize, _name: &str) {}

    fn on_image_progress(&mut self, _elapsed: Duration, _note: Option<&str>) {}

    fn on_image_done(&mut self, _index: usize, _total: usize, _outcome: &SlideOutcome) {}
}
