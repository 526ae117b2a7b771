use crate::config::Config;
use crate::io::cache::{CachedReference, InMemoryReferenceCache, ReferenceCache};
use crate::io::codec;
use crate::io::rate_gate::RateGate;
use crate::types::{AnalysisError, AnalysisResult, Image, Location, MapStyle, ReferenceRequest};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Placeholder credential shipped in sample environment files
pub const PLACEHOLDER_API_KEY: &str = "YOUR_HERE_API_KEY_HERE";

/// Retry hint used when a 429 response carries no usable Retry-After header
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Raw image returned by a map image source
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub format: String,
}

/// Outbound map image endpoint
pub trait MapImageSource: Send + Sync {
    /// Issue exactly one request; never retries
    fn fetch_image(&self, request: &ReferenceRequest, api_key: &str) -> AnalysisResult<FetchedImage>;
}

/// HERE Map Image API (`mapview`) over a blocking HTTP client
pub struct HttpMapImageSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpMapImageSource {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> AnalysisResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| AnalysisError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn mapview_url(&self) -> String {
        format!("{}/mapview", self.base_url)
    }
}

impl MapImageSource for HttpMapImageSource {
    fn fetch_image(&self, request: &ReferenceRequest, api_key: &str) -> AnalysisResult<FetchedImage> {
        let url = self.mapview_url();
        log::info!(
            "Requesting {} reference image for {}, {} (zoom {})",
            request.style, request.location.lat, request.location.lon, request.zoom
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("c", format!("{},{}", request.location.lat, request.location.lon)),
                ("z", request.zoom.to_string()),
                ("w", request.width.to_string()),
                ("h", request.height.to_string()),
                ("t", request.style.type_code().to_string()),
                ("apiKey", api_key.to_string()),
            ])
            .send()
            .map_err(|e| AnalysisError::FetchFailed {
                message: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            log::warn!("Map image provider rate limited the request (retry after {}s)", retry_after);
            return Err(AnalysisError::RateLimited { retry_after });
        }

        if !status.is_success() {
            return Err(AnalysisError::FetchFailed {
                message: format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                ),
            });
        }

        let bytes = response
            .bytes()
            .map_err(|e| AnalysisError::FetchFailed {
                message: format!("Failed to read response body: {}", e),
            })?
            .to_vec();

        log::debug!("Downloaded {} bytes", bytes.len());
        Ok(FetchedImage {
            format: format_tag(&bytes),
            bytes,
        })
    }
}

/// Short format name sniffed from the payload, "png" when unknown
pub fn format_tag(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("png")
        .to_string()
}

/// Cartographic reference images with a cache and a global rate gate
pub struct ReferenceImageProvider {
    api_key: String,
    source: Arc<dyn MapImageSource>,
    cache: Arc<dyn ReferenceCache>,
    gate: RateGate,
}

impl ReferenceImageProvider {
    pub fn new(
        api_key: impl Into<String>,
        source: Arc<dyn MapImageSource>,
        cache: Arc<dyn ReferenceCache>,
        gate: RateGate,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            source,
            cache,
            gate,
        }
    }

    /// Provider using the HTTP source, an unbounded cache and the configured gate
    pub fn from_config(config: &Config) -> AnalysisResult<Self> {
        let map = &config.map_image;
        let source = HttpMapImageSource::new(
            &map.base_url,
            Duration::from_secs(map.timeout_secs),
            &map.user_agent,
        )?;
        let gate = RateGate::new(
            config.rate_limit.max_requests_per_second,
            config.rate_limit.max_wait(),
        )?;

        Ok(Self::new(
            map.api_key.clone(),
            Arc::new(source),
            Arc::new(InMemoryReferenceCache::new()),
            gate,
        ))
    }

    /// True only when a real (non-placeholder) credential is present
    pub fn is_configured(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != PLACEHOLDER_API_KEY
    }

    /// Fetch the encoded reference image, from cache when possible
    pub fn fetch_reference(&self, request: &ReferenceRequest) -> AnalysisResult<Arc<CachedReference>> {
        if !self.is_configured() {
            return Err(AnalysisError::NotConfigured);
        }
        request.validate()?;

        let key = request.cache_key();
        if let Some(cached) = self.cache.get(&key) {
            log::debug!(
                "Returning cached reference for {}, {}",
                request.location.lat, request.location.lon
            );
            return Ok(cached);
        }

        self.gate.acquire()?;
        let fetched = self.source.fetch_image(request, &self.api_key)?;
        if fetched.bytes.is_empty() {
            return Err(AnalysisError::FetchFailed {
                message: "Provider returned an empty body".to_string(),
            });
        }

        let cached = Arc::new(CachedReference {
            request: request.clone(),
            bytes: fetched.bytes,
            format: fetched.format,
            fetched_at: Utc::now(),
        });
        self.cache.put(key, cached.clone());
        log::info!(
            "Cached reference for {}, {} ({} entries)",
            request.location.lat,
            request.location.lon,
            self.cache.len()
        );

        Ok(cached)
    }

    /// Fetch and decode the reference image
    pub fn fetch(&self, request: &ReferenceRequest) -> AnalysisResult<Image> {
        let cached = self.fetch_reference(request)?;
        codec::decode(&cached.bytes)
    }

    /// Satellite-style reference for a location
    pub fn fetch_satellite(
        &self,
        location: Location,
        zoom: u8,
        width: u32,
        height: u32,
    ) -> AnalysisResult<Arc<CachedReference>> {
        let request = ReferenceRequest::new(location, zoom, width, height, MapStyle::Satellite);
        self.fetch_reference(&request)
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
