use crate::core::classifier::{self, Classifier, ClassifierLoader, ClassifierState, ClassifierStatus};
use crate::io::codec;
use crate::types::{AnalysisResult, Image, Severity};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Damage score above which `damage_detected` is set
pub const DAMAGE_DETECTED_THRESHOLD: f64 = 0.6;
/// Variance divisor of the statistical fallback
pub const FALLBACK_VARIANCE_SCALE: f64 = 10_000.0;
/// Leading classes of the output distribution summed into the damage proxy
pub const DAMAGE_CLASS_SLICE: usize = 100;
/// Share of water-colored pixels above which flooding is reported
pub const FLOOD_PIXEL_FRACTION: f64 = 0.20;
/// Water band in 8-bit HSV: (min, max) for hue, saturation, value
pub const WATER_HUE: (f32, f32) = (90.0, 130.0);
pub const WATER_SATURATION: (f32, f32) = (50.0, 255.0);
pub const WATER_VALUE: (f32, f32) = (50.0, 255.0);
/// Minimum bounding-box area of an edge component counted as a structure
pub const STRUCTURE_MIN_AREA: usize = 500;

pub const CONTINUE_MONITORING: &str = "Continue monitoring";

/// Which scoring route produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringPath {
    Model,
    Statistical,
}

/// Damage assessment of a single image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageVerdict {
    /// Always within [0, 1]
    pub damage_score: f64,
    pub damage_detected: bool,
    pub severity: Severity,
    pub flood_detected: bool,
    pub infrastructure_count: usize,
    pub recommendations: Vec<String>,
    pub scoring_path: ScoringPath,
    pub analysis_timestamp: DateTime<Utc>,
    /// Set when scoring failed internally; the score is then 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DamageVerdict {
    fn failed(message: String, scoring_path: ScoringPath) -> Self {
        Self {
            damage_score: 0.0,
            damage_detected: false,
            severity: Severity::Low,
            flood_detected: false,
            infrastructure_count: 0,
            recommendations: Vec::new(),
            scoring_path,
            analysis_timestamp: Utc::now(),
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Severity from damage score and flooding; monotonic in the score
pub fn severity_for(damage_score: f64, flood_detected: bool) -> Severity {
    if damage_score > 0.8 || flood_detected {
        Severity::Critical
    } else if damage_score > 0.6 {
        Severity::High
    } else if damage_score > 0.4 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Rule-based response recommendations
pub fn recommendations(damage_score: f64, flood_detected: bool) -> Vec<String> {
    let mut items = Vec::new();

    if damage_score > 0.7 {
        items.push("Immediate rescue operations required");
        items.push("Deploy emergency response teams");
    }
    if flood_detected {
        items.push("Evacuate low-lying areas");
        items.push("Deploy water rescue teams");
        items.push("Set up temporary shelters");
    }
    if damage_score > 0.5 {
        items.push("Assess structural integrity of buildings");
        items.push("Establish medical aid stations");
    }
    if items.is_empty() {
        items.push(CONTINUE_MONITORING);
    }

    items.into_iter().map(String::from).collect()
}

/// True when more than 20% of pixels fall in the water color band
pub fn detect_flood(image: &Image) -> bool {
    let rgb = image.to_rgb();
    let water_pixels = rgb
        .samples()
        .chunks_exact(3)
        .filter(|px| {
            let (h, s, v) = codec::rgb_to_hsv(px[0], px[1], px[2]);
            in_band(h, WATER_HUE) && in_band(s, WATER_SATURATION) && in_band(v, WATER_VALUE)
        })
        .count();

    water_pixels as f64 / rgb.pixel_count() as f64 > FLOOD_PIXEL_FRACTION
}

fn in_band(value: f32, (low, high): (f32, f32)) -> bool {
    value >= low && value <= high
}

/// Count 8-connected edge components with a large enough bounding box
pub fn count_structures(image: &Image) -> usize {
    let edges = codec::edge_mask(image);
    let (rows, cols) = edges.dim();
    let mut visited = Array2::from_elem((rows, cols), false);
    let mut queue = VecDeque::new();
    let mut structures = 0;

    for i in 0..rows {
        for j in 0..cols {
            if !edges[[i, j]] || visited[[i, j]] {
                continue;
            }

            visited[[i, j]] = true;
            queue.push_back((i, j));
            let (mut min_i, mut max_i, mut min_j, mut max_j) = (i, i, j, j);

            while let Some((ci, cj)) = queue.pop_front() {
                min_i = min_i.min(ci);
                max_i = max_i.max(ci);
                min_j = min_j.min(cj);
                max_j = max_j.max(cj);

                for ni in ci.saturating_sub(1)..=(ci + 1).min(rows - 1) {
                    for nj in cj.saturating_sub(1)..=(cj + 1).min(cols - 1) {
                        if edges[[ni, nj]] && !visited[[ni, nj]] {
                            visited[[ni, nj]] = true;
                            queue.push_back((ni, nj));
                        }
                    }
                }
            }

            let area = (max_i - min_i + 1) * (max_j - min_j + 1);
            if area > STRUCTURE_MIN_AREA {
                structures += 1;
            }
        }
    }

    structures
}

/// Image-level damage scorer with lazy, one-shot classifier loading
///
/// Without a loader, or after a failed load, scores come from pixel variance.
/// A failed load is never retried for the lifetime of the scorer.
pub struct DamageScorer {
    loader: Option<Box<dyn ClassifierLoader>>,
    state: Mutex<ClassifierState>,
}

impl Default for DamageScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl DamageScorer {
    /// Scorer that always uses the statistical fallback
    pub fn new() -> Self {
        Self {
            loader: None,
            state: Mutex::new(ClassifierState::Unavailable),
        }
    }

    /// Scorer that loads a classifier on first use
    pub fn with_loader<L: ClassifierLoader + 'static>(loader: L) -> Self {
        Self {
            loader: Some(Box::new(loader)),
            state: Mutex::new(ClassifierState::NotLoaded),
        }
    }

    pub fn status(&self) -> ClassifierStatus {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).status()
    }

    /// Perform the one-time load if it has not happened yet
    ///
    /// Idempotent: later calls return the outcome of the first attempt.
    pub fn ensure_loaded(&self) -> Option<Arc<dyn Classifier>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let ClassifierState::NotLoaded = *state {
            *state = match &self.loader {
                Some(loader) => match loader.load() {
                    Ok(model) => {
                        log::info!("Loaded damage classifier: {}", model.name());
                        ClassifierState::Loaded(model)
                    }
                    Err(e) => {
                        log::warn!("Could not load damage classifier: {}", e);
                        log::warn!("Using statistical damage scoring for the rest of this process");
                        ClassifierState::Unavailable
                    }
                },
                None => ClassifierState::Unavailable,
            };
        }

        match &*state {
            ClassifierState::Loaded(model) => Some(model.clone()),
            _ => None,
        }
    }

    /// Decode and score an encoded image
    pub fn analyze_bytes(&self, bytes: &[u8]) -> AnalysisResult<DamageVerdict> {
        let image = codec::decode(bytes)?;
        Ok(self.score(&image))
    }

    /// Score an image; internal failures are reported in the verdict
    pub fn score(&self, image: &Image) -> DamageVerdict {
        log::info!("Scoring damage for {}x{} image", image.width(), image.height());
        let rgb = image.to_rgb();

        let (damage_score, scoring_path) = match self.ensure_loaded() {
            Some(model) => match Self::model_score(model.as_ref(), &rgb) {
                Ok(score) => (score, ScoringPath::Model),
                Err(message) => {
                    log::warn!("Damage scoring failed: {}", message);
                    return DamageVerdict::failed(message, ScoringPath::Model);
                }
            },
            None => (Self::fallback_score(&rgb), ScoringPath::Statistical),
        };

        let flood_detected = detect_flood(&rgb);
        let infrastructure_count = count_structures(&rgb);
        let severity = severity_for(damage_score, flood_detected);

        log::debug!(
            "Damage score {:.3} via {:?}, flood {}, {} structures",
            damage_score, scoring_path, flood_detected, infrastructure_count
        );

        DamageVerdict {
            damage_score,
            damage_detected: damage_score > DAMAGE_DETECTED_THRESHOLD,
            severity,
            flood_detected,
            infrastructure_count,
            recommendations: recommendations(damage_score, flood_detected),
            scoring_path,
            analysis_timestamp: Utc::now(),
            error: None,
        }
    }

    /// Variance-based estimate: min(variance / 10000, 1)
    pub fn fallback_score(image: &Image) -> f64 {
        (codec::statistics(image).variance / FALLBACK_VARIANCE_SCALE).clamp(0.0, 1.0)
    }

    /// Probability mass of the leading classes
    ///
    /// This is a proxy taken from a generic classifier, not a trained damage
    /// model; its thresholds have not been validated against real damage.
    fn model_score(model: &dyn Classifier, image: &Image) -> Result<f64, String> {
        let input = classifier::preprocess(image).map_err(|e| e.to_string())?;
        let logits = model.predict(&input).map_err(|e| e.to_string())?;

        if logits.is_empty() {
            return Err("Classifier returned no outputs".to_string());
        }
        if logits.iter().any(|l| !l.is_finite()) {
            return Err("Classifier returned non-finite outputs".to_string());
        }

        let probabilities = classifier::softmax(&logits);
        let mass: f32 = probabilities.iter().take(DAMAGE_CLASS_SLICE).sum();
        let score = mass as f64;
        if !score.is_finite() {
            return Err("Damage score is not finite".to_string());
        }
        Ok(score.clamp(0.0, 1.0))
    }
}

impl std::fmt::Debug for DamageScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DamageScorer")
            .field("has_loader", &self.loader.is_some())
            .field("status", &self.status())
            .finish()
    }
}
