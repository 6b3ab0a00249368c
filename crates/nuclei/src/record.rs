//! Per-slide summary rows collected over a batch.

use serde::{Deserialize, Serialize};

use crate::{
    batch::SkipReason,
    config::DetectionConfig,
    pipeline::{density_percent, Detection},
};

/// One row of the batch summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub file: String,
    pub marker: String,
    pub level: u32,
    pub stain_threshold: f32,
    pub min_area: f64,
    pub max_area: f64,
    pub object_count: usize,
    pub masked_area: u64,
    pub density_percent: f64,
    /// The slide ran out of time and holds a partial count
    #[serde(default)]
    pub partial: bool,
}

impl DetectionRecord {
    pub fn new(
        file: impl Into<String>,
        marker: impl Into<String>,
        config: &DetectionConfig,
        object_count: usize,
        masked_area: u64,
    ) -> Self {
        Self {
            file: file.into(),
            marker: marker.into(),
            level: config.level,
            stain_threshold: config.stain_threshold,
            min_area: config.min_area,
            max_area: config.max_area,
            object_count,
            masked_area,
            density_percent: density_percent(object_count, masked_area),
            partial: false,
        }
    }

    pub fn from_detection(
        file: impl Into<String>,
        marker: impl Into<String>,
        config: &DetectionConfig,
        detection: &Detection,
    ) -> Self {
        let mut record = Self::new(file, marker, config, detection.object_count, detection.masked_area);
        record.partial = detection.partial;
        record
    }
}

/// A slide left out of the summary, and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSlide {
    pub file: String,
    pub reason: SkipReason,
}

/// Append-only collection of the records of one batch
#[derive(Debug, Clone, Default)]
pub struct RecordAggregator {
    records: Vec<DetectionRecord>,
    skipped: Vec<SkippedSlide>,
}

impl RecordAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: DetectionRecord) {
        self.records.push(record);
    }

    pub fn skip(&mut self, file: impl Into<String>, reason: SkipReason) {
        self.skipped.push(SkippedSlide {
            file: file.into(),
            reason,
        });
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    pub fn skipped(&self) -> &[SkippedSlide] {
        &self.skipped
    }

    pub fn into_parts(self) -> (Vec<DetectionRecord>, Vec<SkippedSlide>) {
        (self.records, self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_configuration() {
        let config = DetectionConfig::default().with_level(2).with_stain_threshold(0.05);
        let record = DetectionRecord::new("slide_CD3.tif", "CD3", &config, 12, 4000);
        assert_eq!(record.level, 2);
        assert_eq!(record.stain_threshold, 0.05);
        assert_eq!(record.density_percent, 0.3);
        assert!(!record.partial);
    }

    #[test]
    fn empty_zone_has_zero_density() {
        let record = DetectionRecord::new("a.tif", "?", &DetectionConfig::default(), 3, 0);
        assert_eq!(record.density_percent, 0.0);
    }

    #[test]
    fn aggregator_keeps_records_and_skips_apart() {
        let mut aggregator = RecordAggregator::new();
        aggregator.push(DetectionRecord::new("a.tif", "CD3", &DetectionConfig::default(), 1, 10));
        aggregator.skip("b.tif", SkipReason::MissingAnnotation);

        assert_eq!(aggregator.records().len(), 1);
        assert_eq!(aggregator.skipped()[0].file, "b.tif");
        assert_eq!(aggregator.skipped()[0].reason, SkipReason::MissingAnnotation);
    }
}
