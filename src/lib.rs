//! disaster-lens: change detection and damage severity scoring for disaster imagery
//!
//! Compares a field-captured image against a cartographic reference fetched
//! for the same coordinate, scores visible damage, and merges both into a
//! severity verdict with response recommendations. Surrounding services pass
//! in raw image bytes and coordinates and receive serde-serializable reports.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

mod parallel;

// Re-export main types and functions for easier access
pub use types::{
    AnalysisError, AnalysisResult, BoundingBox, Image, Location, MapStyle, ReferenceRequest, Severity,
};

pub use config::Config;
pub use crate::io::{CachedReference, InMemoryReferenceCache, RateGate, ReferenceCache, ReferenceImageProvider};
pub use crate::core::{
    AssessmentReport, ChangeDetector, ChangeReport, ComparisonSite, DamageScorer, DamageVerdict,
    DisasterAnalyzer, ReportAssembler,
};
