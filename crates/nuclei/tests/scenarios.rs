use std::time::Duration;

use image::{GrayImage, Luma, Rgb, RgbImage};
use nuclei::{
    algorithms::{build_zone_mask, SeedParams, TileOrchestrator, WatershedSegmenter},
    render::{BOX_COLOUR, ZONE_COLOUR},
    Deadline, DetectionConfig, DetectionRecord, Detector, NoProgress,
};

const BROWN: Rgb<u8> = Rgb([120, 70, 30]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

fn binary_disc(img: &mut GrayImage, cx: i64, cy: i64, r: i64) {
    for y in (cy - r).max(0)..=(cy + r).min(img.height() as i64 - 1) {
        for x in (cx - r).max(0)..=(cx + r).min(img.width() as i64 - 1) {
            if (x - cx).pow(2) + (y - cy).pow(2) <= r * r {
                img.put_pixel(x as u32, y as u32, Luma([255]));
            }
        }
    }
}

fn stained_rect(raster: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32) {
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            raster.put_pixel(x, y, BROWN);
        }
    }
}

fn rect_ring(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<[f64; 2]> {
    vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]
}

fn run(config: DetectionConfig, raster: &RgbImage, zone: &GrayImage, deadline: &mut Deadline) -> nuclei::Detection {
    Detector::new(config)
        .detect(raster, zone, deadline, &mut NoProgress)
        .expect("Should detect")
}

#[test]
fn blank_slide_with_small_zone_has_zero_density() {
    let raster = RgbImage::from_pixel(4000, 4000, WHITE);
    let zone = build_zone_mask(&[rect_ring(1000.0, 1000.0, 1100.0, 1200.0)], 4000, 4000);

    let detection = run(DetectionConfig::default(), &raster, &zone, &mut Deadline::unlimited());
    assert_eq!(detection.object_count, 0);
    assert!(detection.masked_area >= 20_000);
    assert_eq!(detection.density_percent(), 0.0);

    let record = DetectionRecord::from_detection("blank_CD3.tif", "CD3", &DetectionConfig::default(), &detection);
    assert_eq!(record.density_percent, 0.0);
}

#[test]
fn one_direct_and_one_watershed_object() {
    let mut raster = RgbImage::from_pixel(300, 300, WHITE);
    // Encloses 60 px: below small_area
    stained_rect(&mut raster, 40, 40, 7, 11);
    // Encloses 2401 px: split by watershed
    stained_rect(&mut raster, 150, 150, 50, 50);
    let zone = build_zone_mask(&[rect_ring(10.0, 10.0, 290.0, 290.0)], 300, 300);

    let detection = run(DetectionConfig::default(), &raster, &zone, &mut Deadline::unlimited());
    assert_eq!(detection.object_count, 2);
    assert_eq!(detection.tally.direct, 1);
    assert_eq!(detection.tally.single_pass, 1);
}

#[test]
fn stain_outside_zone_is_ignored() {
    let mut raster = RgbImage::from_pixel(200, 200, WHITE);
    stained_rect(&mut raster, 20, 20, 30, 30);
    stained_rect(&mut raster, 140, 140, 30, 30);
    let zone = build_zone_mask(&[rect_ring(0.0, 0.0, 100.0, 100.0)], 200, 200);

    let detection = run(DetectionConfig::default(), &raster, &zone, &mut Deadline::unlimited());
    assert_eq!(detection.object_count, 1);
}

#[test]
fn area_filter_bounds_every_counted_object() {
    let mut raster = RgbImage::from_pixel(400, 200, WHITE);
    // 2 px, 60 px, 400-ish px and 12000-ish px enclosed areas
    stained_rect(&mut raster, 10, 10, 2, 2);
    stained_rect(&mut raster, 30, 10, 7, 11);
    stained_rect(&mut raster, 60, 10, 21, 21);
    stained_rect(&mut raster, 150, 40, 120, 100);
    let zone = GrayImage::from_pixel(400, 200, Luma([255]));

    let config = DetectionConfig::default().with_areas(10.0, 80.0, 1000.0);
    let detection = run(config, &raster, &zone, &mut Deadline::unlimited());
    assert_eq!(detection.object_count, 2);
    assert_eq!(detection.tally.discarded, 2);
}

#[test]
fn nine_blobs_across_tile_seams_are_counted_once() {
    let mut roi = GrayImage::new(2000, 2000);
    for cy in [500, 1000, 1900] {
        for cx in [500, 1000, 1900] {
            binary_disc(&mut roi, cx, cy, 40);
        }
    }

    let single = WatershedSegmenter::default().segment(&roi).region_count();
    let tiled = TileOrchestrator::new(1024, 96, WatershedSegmenter::default()).segment(&roi);

    assert_eq!(single, 9);
    assert_eq!(tiled.object_count, 9);
    assert_eq!(tiled.oversized_objects, 0);
}

#[test]
fn tiled_count_matches_single_pass_when_overlap_covers_objects() {
    let mut roi = GrayImage::new(1000, 300);
    for cy in [100, 225] {
        for cx in [150, 210, 270, 400, 460, 590, 650, 790, 850, 940] {
            binary_disc(&mut roi, cx, cy, 24);
        }
    }
    let single = WatershedSegmenter::default().segment(&roi).region_count();
    assert_eq!(single, 20);

    for overlap in [64, 96] {
        let seeds = SeedParams::default().with_max_seeds(Some(12_000));
        let tiled = TileOrchestrator::new(256, overlap, WatershedSegmenter::new(seeds)).segment(&roi);
        assert_eq!(tiled.object_count, single, "overlap {overlap}");
    }
}

#[test]
fn huge_component_is_counted_exactly_through_tiles() {
    // Nine discs of radius 40 overlapping at narrow necks: one component whose
    // box crosses four 256 px tiles, each tile holding at least two whole discs
    let mut raster = RgbImage::from_pixel(760, 120, WHITE);
    for i in 0..9 {
        let cx = 60 + 78 * i as i64;
        for y in 20..=100u32 {
            for x in (cx - 40) as u32..=(cx + 40) as u32 {
                let (dx, dy) = (x as i64 - cx, y as i64 - 60);
                if dx * dx + dy * dy <= 1600 {
                    raster.put_pixel(x, y, BROWN);
                }
            }
        }
    }
    let zone = GrayImage::from_pixel(760, 120, Luma([255]));

    let config = DetectionConfig::default()
        .with_huge_roi_pixels(10_000)
        .with_tiling(256, 96);
    let detection = run(config, &raster, &zone, &mut Deadline::unlimited());
    assert_eq!(detection.object_count, 9);
    assert_eq!(detection.tally.tiled, 9);
    assert_eq!(detection.tally.single_pass, 0);
    assert_eq!(*detection.annotated.get_pixel(20, 20), BOX_COLOUR);
}

#[test]
fn zero_timeout_returns_partial_result() {
    let mut raster = RgbImage::from_pixel(300, 300, WHITE);
    for i in 0..5 {
        stained_rect(&mut raster, 20 + i * 50, 100, 30, 30);
    }
    let zone = build_zone_mask(&[rect_ring(5.0, 5.0, 295.0, 295.0)], 300, 300);

    let full = run(DetectionConfig::default(), &raster, &zone, &mut Deadline::unlimited());
    assert_eq!(full.object_count, 5);

    let mut deadline = Deadline::start(Duration::ZERO, Duration::ZERO);
    std::thread::sleep(Duration::from_millis(2));
    let partial = run(DetectionConfig::default(), &raster, &zone, &mut deadline);
    assert!(partial.partial);
    assert!(partial.object_count <= full.object_count);
    assert_eq!(*partial.annotated.get_pixel(5, 150), ZONE_COLOUR);
}
