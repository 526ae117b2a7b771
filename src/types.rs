use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Decoded 8-bit raster, stored as (height, width, channels)
///
/// Channel count is 1 (grayscale) or 3 (RGB). The backing array is always in
/// standard (row-major) layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pixels: Array3<u8>,
}

impl Image {
    /// Build an image from a raw interleaved sample buffer
    pub fn from_raw(
        width: usize,
        height: usize,
        channels: usize,
        buffer: Vec<u8>,
    ) -> AnalysisResult<Self> {
        Self::check_shape(width, height, channels)?;
        if width * height * channels != buffer.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "Buffer length {} does not match {}x{}x{}",
                buffer.len(), width, height, channels
            )));
        }

        let pixels = Array3::from_shape_vec((height, width, channels), buffer)
            .map_err(|e| AnalysisError::InvalidInput(format!("Failed to shape image buffer: {}", e)))?;
        Ok(Self { pixels })
    }

    /// Wrap an existing (height, width, channels) array
    pub fn from_array(pixels: Array3<u8>) -> AnalysisResult<Self> {
        let (height, width, channels) = pixels.dim();
        Self::check_shape(width, height, channels)?;

        let pixels = if pixels.is_standard_layout() {
            pixels
        } else {
            pixels.as_standard_layout().into_owned()
        };
        Ok(Self { pixels })
    }

    /// Solid RGB image, mostly useful for synthetic scenes
    pub fn filled(width: usize, height: usize, rgb: [u8; 3]) -> AnalysisResult<Self> {
        Self::check_shape(width, height, 3)?;
        Ok(Self {
            pixels: Array3::from_shape_fn((height, width, 3), |(_, _, c)| rgb[c]),
        })
    }

    fn check_shape(width: usize, height: usize, channels: usize) -> AnalysisResult<()> {
        if width == 0 || height == 0 {
            return Err(AnalysisError::InvalidInput(format!(
                "Image dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        if channels != 1 && channels != 3 {
            return Err(AnalysisError::InvalidInput(format!(
                "Unsupported channel count {} (expected 1 or 3)",
                channels
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn channels(&self) -> usize {
        self.pixels.dim().2
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    pub fn pixel_count(&self) -> usize {
        self.width() * self.height()
    }

    pub fn pixels(&self) -> &Array3<u8> {
        &self.pixels
    }

    /// Interleaved samples; constructors keep the array in standard layout
    pub fn samples(&self) -> &[u8] {
        self.pixels.as_slice().unwrap_or(&[])
    }

    /// Samples of one row (width * channels values)
    pub fn row(&self, y: usize) -> &[u8] {
        let stride = self.width() * self.channels();
        &self.samples()[y * stride..(y + 1) * stride]
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.pixels.into_raw_vec()
    }

    /// Expand a grayscale image to three identical channels
    pub fn to_rgb(&self) -> Image {
        if self.channels() == 3 {
            return self.clone();
        }
        let pixels = Array3::from_shape_fn((self.height(), self.width(), 3), |(y, x, _)| {
            self.pixels[[y, x, 0]]
        });
        Image { pixels }
    }
}

/// Severity tier derived from a scalar score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Upper-case label used in change narratives
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Map rendering style offered by the reference image provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapStyle {
    Normal,
    Satellite,
    Terrain,
    Hybrid,
}

impl MapStyle {
    /// Numeric `t` parameter of the map image endpoint
    pub fn type_code(&self) -> u8 {
        match self {
            MapStyle::Normal => 0,
            MapStyle::Satellite => 1,
            MapStyle::Terrain => 2,
            MapStyle::Hybrid => 3,
        }
    }
}

impl std::fmt::Display for MapStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapStyle::Normal => write!(f, "normal"),
            MapStyle::Satellite => write!(f, "satellite"),
            MapStyle::Terrain => write!(f, "terrain"),
            MapStyle::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for MapStyle {
    type Err = AnalysisError;

    /// Accepts both bare names and the `.day` scheme names ("satellite.day")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        let name = name.strip_suffix(".day").unwrap_or(&name);
        match name {
            "normal" => Ok(MapStyle::Normal),
            "satellite" => Ok(MapStyle::Satellite),
            "terrain" => Ok(MapStyle::Terrain),
            "hybrid" => Ok(MapStyle::Hybrid),
            _ => Err(AnalysisError::InvalidInput(format!("Unknown map style: {}", s))),
        }
    }
}

/// WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(AnalysisError::InvalidInput(format!(
                "Latitude {} outside [-90, 90]",
                self.lat
            )));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(AnalysisError::InvalidInput(format!(
                "Longitude {} outside [-180, 180]",
                self.lon
            )));
        }
        Ok(())
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Parameters of one reference image request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRequest {
    pub location: Location,
    /// Zoom level, 1 (world) to 20 (street detail)
    pub zoom: u8,
    pub width: u32,
    pub height: u32,
    pub style: MapStyle,
}

pub const MIN_ZOOM: u8 = 1;
pub const MAX_ZOOM: u8 = 20;

impl ReferenceRequest {
    pub fn new(location: Location, zoom: u8, width: u32, height: u32, style: MapStyle) -> Self {
        Self {
            location,
            zoom,
            width,
            height,
            style,
        }
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        self.location.validate()?;
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&self.zoom) {
            return Err(AnalysisError::InvalidInput(format!(
                "Zoom {} outside [{}, {}]",
                self.zoom, MIN_ZOOM, MAX_ZOOM
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(AnalysisError::InvalidInput(format!(
                "Reference dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Exact-match cache key; coordinates compare bitwise
    pub fn cache_key(&self) -> ReferenceKey {
        ReferenceKey {
            lat_bits: self.location.lat.to_bits(),
            lon_bits: self.location.lon.to_bits(),
            zoom: self.zoom,
            width: self.width,
            height: self.height,
            style: self.style,
        }
    }
}

/// Hashable form of a [`ReferenceRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceKey {
    lat_bits: u64,
    lon_bits: u64,
    zoom: u8,
    width: u32,
    height: u32,
    style: MapStyle,
}

/// Error types for disaster image analysis
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Map image provider credential is not configured")]
    NotConfigured,

    #[error("Rate limit reached, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Reference fetch failed: {message}")]
    FetchFailed { message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_from_raw_checks_length() {
        assert!(Image::from_raw(2, 2, 3, vec![0; 12]).is_ok());
        assert!(matches!(
            Image::from_raw(2, 2, 3, vec![0; 11]),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(matches!(
            Image::from_raw(2, 2, 4, vec![0; 16]),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(Image::from_raw(0, 2, 1, vec![]).is_err());
    }

    #[test]
    fn test_filled_rejects_zero_dimensions() {
        let image = Image::filled(3, 2, [1, 2, 3]).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert!(matches!(Image::filled(0, 0, [0, 0, 0]), Err(AnalysisError::InvalidInput(_))));
        assert!(Image::filled(4, 0, [0, 0, 0]).is_err());
    }

    #[test]
    fn test_gray_to_rgb_expansion() {
        let gray = Image::from_raw(2, 1, 1, vec![10, 200]).unwrap();
        let rgb = gray.to_rgb();
        assert_eq!(rgb.channels(), 3);
        assert_eq!(rgb.samples(), &[10, 10, 10, 200, 200, 200]);
        assert_eq!(rgb.row(0).len(), 6);
    }

    #[test]
    fn test_map_style_parsing() {
        assert_eq!("satellite.day".parse::<MapStyle>().unwrap(), MapStyle::Satellite);
        assert_eq!("Terrain".parse::<MapStyle>().unwrap(), MapStyle::Terrain);
        assert!("sepia".parse::<MapStyle>().is_err());
        assert_eq!(MapStyle::Hybrid.type_code(), 3);
    }

    #[test]
    fn test_reference_request_validation() {
        let ok = ReferenceRequest::new(Location::new(28.6, 77.2), 15, 512, 512, MapStyle::Normal);
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.zoom = 21;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.location.lat = 91.0;
        assert!(bad.validate().is_err());

        let mut bad = ok;
        bad.width = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_cache_key_is_exact_match() {
        let a = ReferenceRequest::new(Location::new(10.0, 20.0), 15, 512, 512, MapStyle::Satellite);
        let mut b = a.clone();
        assert_eq!(a.cache_key(), b.cache_key());
        b.style = MapStyle::Normal;
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::Medium.label(), "MEDIUM");
    }
}
