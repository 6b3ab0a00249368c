pub mod annotation;
pub mod raster;
pub mod summary;

pub use annotation::{Ring, ZoneAnnotation, ZoneAnnotations};
pub use raster::{detect_marker, discover_slides, ImageSlideReader};
pub use summary::{read_summary, write_summary_csv, write_summary_json};
