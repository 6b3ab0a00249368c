//! # Stained Nucleus Counting Library
//!
//! Counts DAB-stained nuclei inside annotated zones of large slide rasters.
//! A slide is binarized on its DAB channel, split into connected components,
//! and each component is either counted as is, split by a watershed pass, or
//! split tile by tile when its footprint is too large for a single pass.
//!
//! ## Core Features
//!
//! - **Zone masks**: GeoJSON-like polygon annotations rasterized per slide
//! - **Tiled binarization**: zone-free tiles are never converted
//! - **Watershed splitting**: distance-transform seeds with an adaptive threshold and a seed cap
//! - **Seam-safe tiling**: overlapping tiles, each object counted by exactly one tile core
//! - **Time budget**: partial results instead of stalled batches
//! - **Batch summaries**: `;`-separated CSV plus JSON, and a marker ratio analysis
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nuclei::{BatchLayout, BatchRunner, DetectionConfig, NoProgress};
//!
//! let layout = BatchLayout::new("slides", "annotations", "output/detected");
//! let runner = BatchRunner::new(layout, DetectionConfig::default());
//! let summary = runner.run(&mut NoProgress)?;
//! println!("{} slides counted, {} skipped", summary.records.len(), summary.skipped.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Single Raster
//!
//! ```rust,no_run
//! use nuclei::{algorithms::build_zone_mask, Deadline, DetectionConfig, Detector, NoProgress, ZoneAnnotations};
//!
//! let raster = image::open("slide.png")?.to_rgb8();
//! let zones = ZoneAnnotations::from_file("slide_annotation.json")?;
//! let mask = build_zone_mask(&zones.rings(), raster.width(), raster.height());
//!
//! let detector = Detector::new(DetectionConfig::default());
//! let mut deadline = Deadline::unlimited();
//! let detection = detector.detect(&raster, &mask, &mut deadline, &mut NoProgress)?;
//! println!("{} nuclei, density {}%", detection.object_count, detection.density_percent());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod algorithms;
pub mod analysis;
pub mod batch;
pub mod config;
pub mod deadline;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod traits;
pub mod types;

pub use analysis::{PatientRatio, RatioAnalysis};
pub use batch::{BatchLayout, BatchRunner, BatchSummary, SkipReason, SlideOutcome};
pub use config::DetectionConfig;
pub use deadline::Deadline;
pub use error::{NucleiError, Result};
pub use io::*;
pub use pipeline::{ComponentClassifier, ComponentPath, Detection, Detector, PathTally};
pub use record::{DetectionRecord, RecordAggregator, SkippedSlide};
pub use traits::*;
pub use types::{Contour, PixelRect};
