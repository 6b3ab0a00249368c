//! Sequential processing of a directory of slides.
//!
//! Every slide ends in a [`SlideOutcome`]: a record, or the reason it was
//! left out. No slide can stop the batch; only failing to list the slides or
//! to write the summary files is reported as an error.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use tracing::{info, warn};

use crate::{
    algorithms::zone::build_zone_mask,
    config::DetectionConfig,
    deadline::Deadline,
    error::{NucleiError, Result},
    io::{
        annotation::ZoneAnnotations,
        raster::{detect_marker, discover_slides, file_name, file_stem, ImageSlideReader},
        summary::{write_summary_csv, write_summary_json},
    },
    pipeline::Detector,
    record::{DetectionRecord, RecordAggregator, SkippedSlide},
    render::save_png,
    traits::{ProgressSink, SlideReader},
};

pub const OVERLAY_SUFFIX: &str = "_detected_masked.png";
pub const ANNOTATION_SUFFIX: &str = "_annotation.json";
pub const SUMMARY_CSV: &str = "resume_detection.csv";
pub const SUMMARY_JSON: &str = "resume_detection.json";

/// Why a slide produced no record
#[derive(Debug, Clone, Serialize, Deserialize, Display, IntoStaticStr, PartialEq)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// No zone annotation file next to the slide
    MissingAnnotation,
    /// The slide could not be decoded
    DecodeFailed { message: String },
    /// The budget was spent before detection started
    TimedOutAfterLoad,
    /// Too many contours for a meaningful count
    NoiseOverload { contours: usize, limit: usize },
    /// Any other failure while handling the slide
    Failed { message: String },
}

impl SkipReason {
    pub fn description(&self) -> String {
        match self {
            Self::MissingAnnotation => "zone annotation not found".to_string(),
            Self::DecodeFailed { message } => format!("slide could not be decoded: {message}"),
            Self::TimedOutAfterLoad => "timeout reached right after decoding".to_string(),
            Self::NoiseOverload { contours, limit } => {
                format!("{contours} contours exceed the limit of {limit}")
            }
            Self::Failed { message } => format!("processing failed: {message}"),
        }
    }
}

impl From<NucleiError> for SkipReason {
    fn from(err: NucleiError) -> Self {
        match err {
            NucleiError::NoiseOverload { found, limit } => Self::NoiseOverload {
                contours: found,
                limit,
            },
            other => Self::Failed {
                message: other.to_string(),
            },
        }
    }
}

pub type SlideOutcome = std::result::Result<DetectionRecord, SkipReason>;

/// Where a batch reads and writes its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    pub slides_dir: PathBuf,
    pub annotations_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl BatchLayout {
    pub fn new(
        slides_dir: impl Into<PathBuf>,
        annotations_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            slides_dir: slides_dir.into(),
            annotations_dir: annotations_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn annotation_path(&self, slide: &Path) -> PathBuf {
        self.annotations_dir
            .join(format!("{}{ANNOTATION_SUFFIX}", file_stem(slide)))
    }

    pub fn overlay_path(&self, slide: &Path) -> PathBuf {
        self.output_dir.join(format!("{}{OVERLAY_SUFFIX}", file_stem(slide)))
    }

    pub fn summary_csv_path(&self) -> PathBuf {
        self.output_dir.join(SUMMARY_CSV)
    }

    pub fn summary_json_path(&self) -> PathBuf {
        self.output_dir.join(SUMMARY_JSON)
    }
}

/// Outcome of a whole batch
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub records: Vec<DetectionRecord>,
    pub skipped: Vec<SkippedSlide>,
    /// Paths actually written, which differ from the layout when the
    /// targets were locked
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.records.len() + self.skipped.len()
    }
}

pub struct BatchRunner<R: SlideReader = ImageSlideReader> {
    layout: BatchLayout,
    detector: Detector,
    reader: R,
}

impl BatchRunner<ImageSlideReader> {
    pub fn new(layout: BatchLayout, config: DetectionConfig) -> Self {
        Self::with_reader(layout, config, ImageSlideReader)
    }
}

impl<R: SlideReader> BatchRunner<R> {
    pub fn with_reader(layout: BatchLayout, config: DetectionConfig, reader: R) -> Self {
        Self {
            layout,
            detector: Detector::new(config),
            reader,
        }
    }

    pub fn layout(&self) -> &BatchLayout {
        &self.layout
    }

    pub fn config(&self) -> &DetectionConfig {
        self.detector.config()
    }

    /// Process every slide of the layout. Fails before touching any file when
    /// the configuration is inconsistent.
    pub fn run(&self, progress: &mut dyn ProgressSink) -> Result<BatchSummary> {
        self.config().validate()?;
        fs::create_dir_all(&self.layout.output_dir)?;
        let slides = discover_slides(&self.layout.slides_dir)?;
        let total = slides.len();
        info!(total, slides_dir = %self.layout.slides_dir.display(), "Starting detection batch");

        let mut aggregator = RecordAggregator::new();
        for (index, slide) in slides.iter().enumerate() {
            let name = file_name(slide);
            progress.on_image_start(index, total, &name);

            let outcome = self.process_slide(slide, progress);
            match &outcome {
                Ok(record) => {
                    info!(
                        slide = %name,
                        objects = record.object_count,
                        density = record.density_percent,
                        partial = record.partial,
                        "Slide processed"
                    );
                    aggregator.push(record.clone());
                }
                Err(reason) => {
                    warn!(slide = %name, reason = %reason, "Slide skipped: {}", reason.description());
                    aggregator.skip(name.clone(), reason.clone());
                }
            }
            progress.on_image_done(index, total, &outcome);
        }

        let (records, skipped) = aggregator.into_parts();
        let csv_path = write_summary_csv(&self.layout.summary_csv_path(), &records)?;
        let json_path = write_summary_json(&self.layout.summary_json_path(), &records)?;
        info!(
            processed = records.len(),
            skipped = skipped.len(),
            summary = %csv_path.display(),
            "Detection batch finished"
        );

        Ok(BatchSummary {
            records,
            skipped,
            csv_path,
            json_path,
        })
    }

    /// Detect one slide, writing its overlay next to the summary
    pub fn process_slide(&self, slide: &Path, progress: &mut dyn ProgressSink) -> SlideOutcome {
        let config = self.detector.config();
        let annotation_path = self.layout.annotation_path(slide);
        if !annotation_path.is_file() {
            return Err(SkipReason::MissingAnnotation);
        }

        let mut deadline = Deadline::start(config.timeout(), config.slow_note_after());

        if !self.reader.accepts(slide) {
            return Err(SkipReason::DecodeFailed {
                message: format!("no reader for {}", file_name(slide)),
            });
        }
        let raster = self
            .reader
            .read_level(slide, config.level)
            .map_err(|err| SkipReason::DecodeFailed {
                message: err.to_string(),
            })?;

        let note = deadline.slow_note();
        progress.on_image_progress(deadline.elapsed(), note);
        if deadline.expired() {
            return Err(SkipReason::TimedOutAfterLoad);
        }

        let annotations = ZoneAnnotations::from_file(&annotation_path)?;
        let zone_mask = build_zone_mask(&annotations.rings(), raster.width(), raster.height());

        let detection = self
            .detector
            .detect(&raster, &zone_mask, &mut deadline, progress)?;
        save_png(
            &detection.annotated,
            self.layout.overlay_path(slide),
            config.png_compression,
        )?;

        let marker = detect_marker(&file_name(slide), &config.markers);
        Ok(DetectionRecord::from_detection(
            file_name(slide),
            marker,
            config,
            &detection,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_names_follow_slide_stem() {
        let layout = BatchLayout::new("/slides", "/ann", "/out");
        let slide = Path::new("/slides/P01_CD3.ndpi");
        assert_eq!(layout.annotation_path(slide), PathBuf::from("/ann/P01_CD3_annotation.json"));
        assert_eq!(layout.overlay_path(slide), PathBuf::from("/out/P01_CD3_detected_masked.png"));
        assert_eq!(layout.summary_csv_path(), PathBuf::from("/out/resume_detection.csv"));
    }

    #[test]
    fn noise_overload_error_becomes_skip_reason() {
        let reason = SkipReason::from(NucleiError::NoiseOverload { found: 9, limit: 4 });
        assert_eq!(reason, SkipReason::NoiseOverload { contours: 9, limit: 4 });
        let failed = SkipReason::from(NucleiError::InvalidAnnotation("bad".to_string()));
        assert!(matches!(failed, SkipReason::Failed { .. }));
    }

    #[test]
    fn skip_reasons_have_snake_case_tags() {
        let tag: &'static str = (&SkipReason::TimedOutAfterLoad).into();
        assert_eq!(tag, "timed_out_after_load");
        assert_eq!(SkipReason::MissingAnnotation.to_string(), "missing_annotation");
    }
}
