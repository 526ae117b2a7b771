use disaster_lens::io::codec::{encode, EncodeFormat};
use disaster_lens::io::reference::{FetchedImage, MapImageSource};
use disaster_lens::{
    AnalysisError, AnalysisResult, ComparisonSite, DamageScorer, DisasterAnalyzer, Image,
    InMemoryReferenceCache, Location, RateGate, ReferenceImageProvider, ReferenceRequest, Severity,
};
use std::sync::Arc;

const DARK_BLUE: [u8; 3] = [0, 0, 139];
const WHITE_GRAY: [u8; 3] = [220, 220, 220];
const MID_GRAY: [u8; 3] = [128, 128, 128];

/// Serves a fixed "before" image for every request
struct StaticSource {
    png: Vec<u8>,
}

impl StaticSource {
    fn solid(rgb: [u8; 3]) -> Self {
        let image = Image::filled(100, 100, rgb).expect("Failed to build image");
        let png = encode(&image, EncodeFormat::Png).expect("Failed to encode reference");
        Self { png }
    }
}

impl MapImageSource for StaticSource {
    fn fetch_image(&self, request: &ReferenceRequest, _api_key: &str) -> AnalysisResult<FetchedImage> {
        assert_eq!((request.width, request.height), (100, 100));
        Ok(FetchedImage {
            bytes: self.png.clone(),
            format: "png".to_string(),
        })
    }
}

fn analyzer_with_reference(rgb: [u8; 3]) -> DisasterAnalyzer {
    let provider = ReferenceImageProvider::new(
        "test-key",
        Arc::new(StaticSource::solid(rgb)),
        Arc::new(InMemoryReferenceCache::new()),
        RateGate::new(100.0, None).expect("Failed to create rate gate"),
    );
    DisasterAnalyzer::new(provider, DamageScorer::new())
}

fn png(rgb: [u8; 3]) -> Vec<u8> {
    let image = Image::filled(100, 100, rgb).expect("Failed to build image");
    encode(&image, EncodeFormat::Png).expect("Failed to encode field image")
}

fn site() -> ComparisonSite {
    ComparisonSite::satellite(Location::new(29.9511, -90.0715), 15)
}

#[test]
fn test_flooded_scene_against_dry_reference() {
    let _ = env_logger::builder().is_test(true).try_init();

    let analyzer = analyzer_with_reference(WHITE_GRAY);
    let comparison = analyzer
        .compare_with_reference(&png(DARK_BLUE), site())
        .expect("Comparison failed");
    let change = &comparison.change;

    println!("Change summary: {}", change.summary());
    assert!(change.change_percentage > 90.0);
    assert_eq!(change.tier, Severity::Critical);
    assert!(change.flags.water_increase);
    assert!(change.flags.color_shift_detected);
    assert!(change.luminance_shift < -20.0);
    assert_eq!(comparison.disaster_image_size, (100, 100));
}

#[test]
fn test_identical_scenes_report_no_change() {
    let _ = env_logger::builder().is_test(true).try_init();

    let analyzer = analyzer_with_reference(MID_GRAY);
    let report = analyzer
        .assess(&png(MID_GRAY), Some(site()))
        .expect("Assessment failed");

    let change = report.change.as_ref().expect("Missing change report");
    assert_eq!(change.change_percentage, 0.0);
    assert!(!change.flags.any());

    let damage = report.damage.as_ref().expect("Missing damage verdict");
    assert_eq!(damage.damage_score, 0.0);
    assert_eq!(damage.severity, Severity::Low);
    assert!(!damage.damage_detected);

    assert_eq!(report.overall_severity, Severity::Low);
    assert_eq!(report.recommendations, vec!["Continue monitoring".to_string()]);
}

#[test]
fn test_assessment_merges_flood_recommendations() {
    let analyzer = analyzer_with_reference(WHITE_GRAY);
    let report = analyzer
        .assess(&png(DARK_BLUE), Some(site()))
        .expect("Assessment failed");

    assert_eq!(report.overall_severity, Severity::Critical);
    let evacuate = report
        .recommendations
        .iter()
        .filter(|r| r.as_str() == "Evacuate low-lying areas")
        .count();
    assert_eq!(evacuate, 1);
    assert!(!report.recommendations.contains(&"Continue monitoring".to_string()));

    let json = serde_json::to_value(&report).expect("Failed to serialize report");
    assert_eq!(json["overall_severity"], "critical");
    assert_eq!(json["change"]["changes_detected"]["water_increase"], true);
}

#[test]
fn test_assessment_without_site_skips_reference() {
    let analyzer = analyzer_with_reference(WHITE_GRAY);
    let report = analyzer.assess(&png(MID_GRAY), None).expect("Assessment failed");

    assert!(report.change.is_none());
    assert!(report.damage.is_some());
    assert_eq!(analyzer.provider().cached_entries(), 0);
}

#[test]
fn test_swapping_inputs_changes_luminance_direction() {
    let analyzer = analyzer_with_reference(WHITE_GRAY);
    let dark = Image::filled(100, 100, DARK_BLUE).expect("Failed to build image");
    let light = Image::filled(100, 100, WHITE_GRAY).expect("Failed to build image");

    let forward = analyzer.compare_images(&dark, &light).expect("Comparison failed");
    let backward = analyzer.compare_images(&light, &dark).expect("Comparison failed");

    assert!(forward.flags.water_increase);
    assert!(!backward.flags.water_increase);
    assert_eq!(forward.change_percentage, backward.change_percentage);
}

#[test]
fn test_undecodable_field_image() {
    let analyzer = analyzer_with_reference(WHITE_GRAY);
    let result = analyzer.assess(b"definitely not an image", Some(site()));
    assert!(matches!(result, Err(AnalysisError::Decode(_))));
}

#[test]
fn test_area_comparison_fetches_satellite_reference() {
    let provider = ReferenceImageProvider::new(
        "test-key",
        Arc::new(StaticSourceAnySize(StaticSource::solid(WHITE_GRAY))),
        Arc::new(InMemoryReferenceCache::new()),
        RateGate::new(100.0, None).expect("Failed to create rate gate"),
    );
    let analyzer = DisasterAnalyzer::new(provider, DamageScorer::new());

    let area = analyzer
        .area_comparison(Location::new(0.0, 0.0), 5.0, None)
        .expect("Area comparison failed");

    assert!(area.bounding_box.max_lat > 0.0 && area.bounding_box.min_lat < 0.0);
    assert!((area.coverage_area_km2 - 78.54).abs() < 0.01);
    assert_eq!(area.reference_image.request.zoom, 14);

    assert!(matches!(
        analyzer.area_comparison(Location::new(0.0, 0.0), -1.0, None),
        Err(AnalysisError::InvalidInput(_))
    ));
}

struct StaticSourceAnySize(StaticSource);

impl MapImageSource for StaticSourceAnySize {
    fn fetch_image(&self, _request: &ReferenceRequest, _api_key: &str) -> AnalysisResult<FetchedImage> {
        Ok(FetchedImage {
            bytes: self.0.png.clone(),
            format: "png".to_string(),
        })
    }
}
