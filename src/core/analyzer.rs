use crate::config::{Config, ReferenceDefaults};
use crate::core::change_detection::{ChangeDetector, ChangeReport};
use crate::core::damage::{DamageScorer, DamageVerdict};
use crate::core::report::{AssessmentReport, ReportAssembler};
use crate::io::cache::CachedReference;
use crate::io::codec;
use crate::io::reference::ReferenceImageProvider;
use crate::types::{AnalysisError, AnalysisResult, BoundingBox, Image, Location, MapStyle, ReferenceRequest};
use serde::{Deserialize, Serialize};

/// Kilometres per degree of latitude, used for area bounding boxes
pub const KM_PER_DEGREE: f64 = 111.0;

/// Where to fetch the "before" reference for a comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSite {
    pub location: Location,
    pub zoom: u8,
    pub style: MapStyle,
}

impl ComparisonSite {
    pub fn satellite(location: Location, zoom: u8) -> Self {
        Self {
            location,
            zoom,
            style: MapStyle::Satellite,
        }
    }
}

/// Change report plus the geometry of both inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub location: Location,
    pub change: ChangeReport,
    pub disaster_image_size: (usize, usize),
    pub reference_image_size: (usize, usize),
    pub reference_style: MapStyle,
}

/// Reference imagery and extent for an area around a point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaComparison {
    pub center: Location,
    pub radius_km: f64,
    pub bounding_box: BoundingBox,
    pub coverage_area_km2: f64,
    pub reference_image: CachedReference,
}

/// Entry point tying the provider, detector, scorer and assembler together
pub struct DisasterAnalyzer {
    provider: ReferenceImageProvider,
    detector: ChangeDetector,
    scorer: DamageScorer,
    assembler: ReportAssembler,
    defaults: ReferenceDefaults,
}

impl DisasterAnalyzer {
    pub fn new(provider: ReferenceImageProvider, scorer: DamageScorer) -> Self {
        Self {
            provider,
            detector: ChangeDetector::new(),
            scorer,
            assembler: ReportAssembler::new(),
            defaults: ReferenceDefaults::default(),
        }
    }

    /// HTTP-backed analyzer using statistical damage scoring
    pub fn from_config(config: &Config) -> AnalysisResult<Self> {
        config.validate()?;
        let provider = ReferenceImageProvider::from_config(config)?;
        Ok(Self::new(provider, DamageScorer::new()).with_defaults(config.reference.clone()))
    }

    pub fn with_defaults(mut self, defaults: ReferenceDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn provider(&self) -> &ReferenceImageProvider {
        &self.provider
    }

    pub fn scorer(&self) -> &DamageScorer {
        &self.scorer
    }

    /// Damage verdict for an encoded image
    pub fn analyze_image(&self, bytes: &[u8]) -> AnalysisResult<DamageVerdict> {
        self.scorer.analyze_bytes(bytes)
    }

    /// Change report between two already decoded images
    pub fn compare_images(&self, disaster: &Image, reference: &Image) -> AnalysisResult<ChangeReport> {
        self.detector.compare(disaster, reference)
    }

    /// Compare an encoded field image against a reference fetched for `site`
    ///
    /// The reference is requested at the field image's dimensions.
    pub fn compare_with_reference(&self, bytes: &[u8], site: ComparisonSite) -> AnalysisResult<ComparisonResult> {
        let disaster = codec::decode(bytes)?;
        self.compare_decoded(&disaster, site)
    }

    fn compare_decoded(&self, disaster: &Image, site: ComparisonSite) -> AnalysisResult<ComparisonResult> {
        if !self.provider.is_configured() {
            return Err(AnalysisError::NotConfigured);
        }

        let request = ReferenceRequest::new(
            site.location,
            site.zoom,
            disaster.width() as u32,
            disaster.height() as u32,
            site.style,
        );
        let reference = self.provider.fetch(&request)?;
        let change = self.detector.compare(disaster, &reference)?;

        Ok(ComparisonResult {
            location: site.location,
            change,
            disaster_image_size: disaster.dimensions(),
            reference_image_size: reference.dimensions(),
            reference_style: site.style,
        })
    }

    /// Damage scoring plus an optional reference comparison, merged
    pub fn assess(&self, bytes: &[u8], site: Option<ComparisonSite>) -> AnalysisResult<AssessmentReport> {
        let disaster = codec::decode(bytes)?;
        let damage = self.scorer.score(&disaster);

        let comparison = match site {
            Some(site) => Some(self.compare_decoded(&disaster, site)?),
            None => None,
        };

        self.assembler
            .assemble(comparison.as_ref().map(|c| &c.change), Some(&damage))
    }

    /// Satellite reference covering `radius_km` around a point
    pub fn area_comparison(
        &self,
        center: Location,
        radius_km: f64,
        zoom: Option<u8>,
    ) -> AnalysisResult<AreaComparison> {
        if !self.provider.is_configured() {
            return Err(AnalysisError::NotConfigured);
        }
        center.validate()?;
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "radius_km must be positive, got {}",
                radius_km
            )));
        }

        let bounding_box = area_bounding_box(center, radius_km);
        let size = self.defaults.area_size;
        let reference_image = self.provider.fetch_satellite(
            center,
            zoom.unwrap_or(self.defaults.area_zoom),
            size,
            size,
        )?;
        let reference_image = CachedReference::clone(&reference_image);

        Ok(AreaComparison {
            center,
            radius_km,
            bounding_box,
            coverage_area_km2: (std::f64::consts::PI * radius_km * radius_km * 100.0).round() / 100.0,
            reference_image,
        })
    }

    /// Default zoom for comparisons
    pub fn default_site(&self, location: Location) -> ComparisonSite {
        ComparisonSite::satellite(location, self.defaults.zoom)
    }
}

/// Box of `radius_km` around `center`, using 1 degree ~ 111 km
///
/// Edges are clamped to valid coordinates; near the poles the longitude span
/// saturates at the full [-180, 180] range.
pub fn area_bounding_box(center: Location, radius_km: f64) -> BoundingBox {
    let lat_offset = radius_km / KM_PER_DEGREE;
    let lon_scale = center.lat.to_radians().cos().abs();
    let lon_offset = (radius_km / (KM_PER_DEGREE * lon_scale)).min(180.0);

    BoundingBox {
        min_lon: (center.lon - lon_offset).max(-180.0),
        max_lon: (center.lon + lon_offset).min(180.0),
        min_lat: (center.lat - lat_offset).max(-90.0),
        max_lat: (center.lat + lat_offset).min(90.0),
    }
}
