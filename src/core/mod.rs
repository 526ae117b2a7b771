//! Core analysis modules

pub mod change_detection;
pub mod classifier;
pub mod damage;
pub mod report;
pub mod analyzer;

// Re-export main types
pub use change_detection::{ChangeDetector, ChangeFlags, ChangeReport};
pub use classifier::{Classifier, ClassifierError, ClassifierLoader, ClassifierState, ClassifierStatus};
pub use damage::{DamageScorer, DamageVerdict, ScoringPath};
pub use report::{AssessmentReport, ReportAssembler};
pub use analyzer::{AreaComparison, ComparisonResult, ComparisonSite, DisasterAnalyzer};
