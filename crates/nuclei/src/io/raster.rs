//! Decoding slides and naming the files around them.

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::RgbImage;
use tracing::debug;

use crate::{error::Result, traits::SlideReader};

/// Extensions picked up when scanning a slides directory
pub const SLIDE_EXTENSIONS: [&str; 7] = ["ndpi", "svs", "tif", "tiff", "png", "jpg", "jpeg"];

/// Marker recorded when the file name names none of the configured markers
pub const UNKNOWN_MARKER: &str = "?";

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Reader for plain raster files decodable by the `image` crate.
///
/// These files hold a single resolution, so every requested level is served
/// from level 0, the same way a pyramid reader clamps to its last level.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSlideReader;

impl SlideReader for ImageSlideReader {
    fn read_level(&self, path: &Path, level: u32) -> Result<RgbImage> {
        if level > 0 {
            debug!(level, path = %path.display(), "Single-level raster, reading level 0");
        }
        Ok(image::open(path)?.to_rgb8())
    }

    fn accepts(&self, path: &Path) -> bool {
        matches!(
            extension_of(path).as_deref(),
            Some("tif" | "tiff" | "png" | "jpg" | "jpeg")
        )
    }
}

/// Slide files of `dir` with a known extension, sorted by file name
pub fn discover_slides(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut slides: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            extension_of(path).is_some_and(|ext| SLIDE_EXTENSIONS.contains(&ext.as_str()))
        })
        .collect();
    slides.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(slides)
}

/// First of `markers` found in the upper-cased file name
pub fn detect_marker(file_name: &str, markers: &[String]) -> String {
    let upper = file_name.to_uppercase();
    markers
        .iter()
        .find(|marker| upper.contains(&marker.to_uppercase()))
        .cloned()
        .unwrap_or_else(|| UNKNOWN_MARKER.to_string())
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn markers() -> Vec<String> {
        vec!["CD3".to_string(), "CD7".to_string()]
    }

    #[test]
    fn marker_follows_configured_priority() {
        assert_eq!(detect_marker("p01_cd7.ndpi", &markers()), "CD7");
        assert_eq!(detect_marker("P01_CD3_CD7.svs", &markers()), "CD3");
        assert_eq!(detect_marker("P01_HE.svs", &markers()), UNKNOWN_MARKER);
    }

    #[test]
    fn discovery_filters_and_sorts() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        for name in ["b_CD3.tif", "a_CD7.PNG", "notes.txt", "c.svs"] {
            fs::write(dir.path().join(name), b"").expect("Should write file");
        }
        fs::create_dir(dir.path().join("nested.tif")).expect("Should create dir");

        let names: Vec<String> = discover_slides(dir.path())
            .expect("Should list slides")
            .iter()
            .map(|p| file_name(p))
            .collect();
        assert_eq!(names, vec!["a_CD7.PNG", "b_CD3.tif", "c.svs"]);
    }

    #[test]
    fn image_reader_clamps_level() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("slide.png");
        RgbImage::from_pixel(6, 4, Rgb([10, 20, 30]))
            .save(&path)
            .expect("Should save PNG");

        let reader = ImageSlideReader;
        assert!(reader.accepts(&path));
        assert!(!reader.accepts(Path::new("slide.ndpi")));
        let raster = reader.read_level(&path, 3).expect("Should decode");
        assert_eq!(raster.dimensions(), (6, 4));
        assert_eq!(*raster.get_pixel(0, 0), Rgb([10, 20, 30]));
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("broken.tif");
        fs::write(&path, b"not a tiff").expect("Should write file");
        assert!(ImageSlideReader.read_level(&path, 0).is_err());
    }
}
