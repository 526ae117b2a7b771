//! Pixelwise comparison of a field image against a reference map image
//!
//! All thresholds are fixed 8-bit intensity constants; nothing is learned.
//! Sums are accumulated as integers, so repeated runs on the same image pair
//! give bit-identical reports.

use crate::io::codec::{self, ResizeFilter};
use crate::parallel::{add_counters, fold_rows};
use crate::types::{AnalysisError, AnalysisResult, Image, Severity};
use serde::{Deserialize, Serialize};

/// Per-channel absolute difference above which a pixel counts as changed
pub const PIXEL_CHANGE_THRESHOLD: u8 = 30;
/// Mean luminance drop (disaster minus reference) that suggests standing water
pub const WATER_LUMINANCE_SHIFT: f64 = -20.0;
/// Mean green-channel loss that suggests vegetation loss
pub const VEGETATION_GREEN_LOSS: f64 = 10.0;
/// Luminance standard deviation change that suggests structural change
pub const TEXTURE_STDDEV_SHIFT: f64 = 15.0;
/// Mean absolute sample difference that counts as an overall color shift
pub const COLOR_SHIFT_MEAN_DIFF: f64 = 25.0;

/// Qualitative change types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFlags {
    pub water_increase: bool,
    pub vegetation_loss: bool,
    pub infrastructure_damage: bool,
    pub color_shift_detected: bool,
}

impl ChangeFlags {
    pub fn any(&self) -> bool {
        self.water_increase || self.vegetation_loss || self.infrastructure_damage || self.color_shift_detected
    }
}

/// Result of comparing a disaster image against its reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    /// Percent of pixels with any channel difference above the threshold
    pub change_percentage: f64,
    pub tier: Severity,
    #[serde(rename = "changes_detected")]
    pub flags: ChangeFlags,
    pub narrative: Vec<String>,
    pub mean_abs_difference: f64,
    /// Mean of disaster luminance minus reference luminance
    pub luminance_shift: f64,
}

impl ChangeReport {
    /// Narrative joined into one line
    pub fn summary(&self) -> String {
        self.narrative.join(" | ")
    }
}

/// Tier from the share of changed pixels
pub fn change_tier(change_percentage: f64) -> Severity {
    if change_percentage > 50.0 {
        Severity::Critical
    } else if change_percentage > 30.0 {
        Severity::High
    } else if change_percentage > 15.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn tier_sentence(tier: Severity) -> String {
    let detail = match tier {
        Severity::Critical => "Major changes detected (>50% pixel difference)",
        Severity::High => "Significant changes detected (>30% pixel difference)",
        Severity::Medium => "Moderate changes detected (>15% pixel difference)",
        Severity::Low => "Minor changes detected (<15% pixel difference)",
    };
    format!("{}: {}", tier.label(), detail)
}

/// Build the ordered list of findings
pub fn narrative(change_percentage: f64, flags: &ChangeFlags) -> Vec<String> {
    let mut findings = vec![tier_sentence(change_tier(change_percentage))];

    if flags.water_increase {
        findings.push("Possible flooding detected (increased dark/water areas)".to_string());
    }
    if flags.vegetation_loss {
        findings.push("Vegetation loss detected (decreased green coverage)".to_string());
    }
    if flags.infrastructure_damage {
        findings.push("Structural changes detected (texture/edge differences)".to_string());
    }
    if flags.color_shift_detected {
        findings.push("Overall color shift detected (large mean channel difference)".to_string());
    }

    findings
}

// Counter slots accumulated per row
const CHANGED: usize = 0;
const ABS_DIFF: usize = 1;
const D_SUM: usize = 2;
const D_SUM_SQ: usize = 3;
const R_SUM: usize = 4;
const R_SUM_SQ: usize = 5;
const D_GREEN: usize = 6;
const R_GREEN: usize = 7;

/// Compares co-registered disaster and reference images
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Compare `disaster` against `reference`
    ///
    /// The reference is resized to the disaster image's dimensions, never the
    /// other way around. A grayscale image compared with an RGB one is
    /// expanded to RGB first.
    pub fn compare(&self, disaster: &Image, reference: &Image) -> AnalysisResult<ChangeReport> {
        log::info!(
            "Comparing {}x{} disaster image against {}x{} reference",
            disaster.width(), disaster.height(), reference.width(), reference.height()
        );

        let reference = if reference.dimensions() != disaster.dimensions() {
            codec::resize(reference, disaster.width(), disaster.height(), ResizeFilter::Bilinear)?
        } else {
            reference.clone()
        };

        let (disaster, reference) = if disaster.channels() != reference.channels() {
            (disaster.to_rgb(), reference.to_rgb())
        } else {
            (disaster.clone(), reference)
        };

        if disaster.dimensions() != reference.dimensions() {
            return Err(AnalysisError::InvalidInput(
                "Reference could not be aligned to the disaster image".to_string(),
            ));
        }

        let channels = disaster.channels();
        let counters = fold_rows(
            disaster.height(),
            [0u64; 8],
            |y| Self::row_counters(disaster.row(y), reference.row(y), channels),
            add_counters,
        );

        let pixels = disaster.pixel_count() as f64;
        let samples = pixels * channels as f64;

        let raw_percentage = counters[CHANGED] as f64 / pixels * 100.0;
        let mean_abs_difference = counters[ABS_DIFF] as f64 / samples;
        // Luminance is the channel mean, so its total is the sample total / channels
        let luminance_shift =
            (counters[D_SUM] as f64 - counters[R_SUM] as f64) / samples;

        let disaster_std = luminance_std(counters[D_SUM], counters[D_SUM_SQ], disaster.pixel_count(), channels);
        let reference_std = luminance_std(counters[R_SUM], counters[R_SUM_SQ], disaster.pixel_count(), channels);

        let green_loss = if channels == 3 {
            (counters[R_GREEN] as f64 - counters[D_GREEN] as f64) / pixels
        } else {
            0.0
        };

        let flags = ChangeFlags {
            water_increase: luminance_shift < WATER_LUMINANCE_SHIFT,
            vegetation_loss: channels == 3 && green_loss > VEGETATION_GREEN_LOSS,
            infrastructure_damage: (disaster_std - reference_std).abs() > TEXTURE_STDDEV_SHIFT,
            color_shift_detected: mean_abs_difference > COLOR_SHIFT_MEAN_DIFF,
        };

        log::debug!(
            "Change {:.2}%, luminance shift {:.2}, green loss {:.2}, std {:.2} -> {:.2}, mean diff {:.2}",
            raw_percentage, luminance_shift, green_loss, reference_std, disaster_std, mean_abs_difference
        );

        // Tiers use the exact percentage; only the reported value is rounded
        Ok(ChangeReport {
            change_percentage: round2(raw_percentage),
            tier: change_tier(raw_percentage),
            narrative: narrative(raw_percentage, &flags),
            flags,
            mean_abs_difference,
            luminance_shift,
        })
    }

    fn row_counters(disaster: &[u8], reference: &[u8], channels: usize) -> [u64; 8] {
        let mut acc = [0u64; 8];

        for (d_px, r_px) in disaster.chunks_exact(channels).zip(reference.chunks_exact(channels)) {
            let mut changed = false;
            let mut d_sum = 0u64;
            let mut r_sum = 0u64;

            for (&d, &r) in d_px.iter().zip(r_px.iter()) {
                let diff = d.abs_diff(r);
                changed |= diff > PIXEL_CHANGE_THRESHOLD;
                acc[ABS_DIFF] += diff as u64;
                d_sum += d as u64;
                r_sum += r as u64;
            }

            acc[CHANGED] += changed as u64;
            acc[D_SUM] += d_sum;
            acc[D_SUM_SQ] += d_sum * d_sum;
            acc[R_SUM] += r_sum;
            acc[R_SUM_SQ] += r_sum * r_sum;
            if channels == 3 {
                acc[D_GREEN] += d_px[1] as u64;
                acc[R_GREEN] += r_px[1] as u64;
            }
        }

        acc
    }
}

/// Population standard deviation of per-pixel luminance from channel-sum moments
fn luminance_std(sum: u64, sum_sq: u64, pixels: usize, channels: usize) -> f64 {
    let n = pixels as u128;
    let (sum, sum_sq) = (sum as u128, sum_sq as u128);
    let variance_of_sums = (n * sum_sq - sum * sum) as f64 / (n * n) as f64;
    variance_of_sums.sqrt() / channels as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
