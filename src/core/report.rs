use crate::core::change_detection::ChangeReport;
use crate::core::damage::{DamageVerdict, CONTINUE_MONITORING};
use crate::types::{AnalysisError, AnalysisResult, Severity};
use serde::{Deserialize, Serialize};

/// Combined verdict over a change report and/or a damage verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub overall_severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage: Option<DamageVerdict>,
    pub narrative: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Merges analysis outputs; performs no I/O
#[derive(Debug, Clone, Default)]
pub struct ReportAssembler;

impl ReportAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(
        &self,
        change: Option<&ChangeReport>,
        damage: Option<&DamageVerdict>,
    ) -> AnalysisResult<AssessmentReport> {
        if change.is_none() && damage.is_none() {
            return Err(AnalysisError::InvalidInput(
                "Nothing to assemble: both change report and damage verdict are missing".to_string(),
            ));
        }
        if let Some(change) = change {
            Self::validate_change(change)?;
        }
        if let Some(damage) = damage {
            Self::validate_damage(damage)?;
        }

        let mut overall_severity = Severity::Low;
        let mut narrative = Vec::new();
        let mut recommendations = Vec::new();

        if let Some(damage) = damage {
            match &damage.error {
                Some(error) => narrative.push(format!("Damage scoring unavailable: {}", error)),
                None => {
                    overall_severity = overall_severity.max(damage.severity);
                    narrative.push(format!(
                        "Damage score {:.2} ({} severity)",
                        damage.damage_score, damage.severity
                    ));
                    if damage.flood_detected {
                        narrative.push("Water-colored areas cover more than 20% of the image".to_string());
                    }
                }
            }
            recommendations.extend(damage.recommendations.iter().cloned());
        }

        if let Some(change) = change {
            overall_severity = overall_severity.max(change.tier);
            narrative.extend(change.narrative.iter().cloned());
            recommendations.extend(Self::change_recommendations(change));
        }

        Ok(AssessmentReport {
            overall_severity,
            change: change.cloned(),
            damage: damage.cloned(),
            narrative,
            recommendations: Self::dedup_recommendations(recommendations),
        })
    }

    fn change_recommendations(change: &ChangeReport) -> Vec<String> {
        let mut items = Vec::new();
        if change.flags.water_increase {
            items.push("Evacuate low-lying areas");
            items.push("Deploy water rescue teams");
        }
        if change.flags.infrastructure_damage {
            items.push("Assess structural integrity of buildings");
        }
        if change.flags.vegetation_loss {
            items.push("Survey slopes for landslide risk");
        }
        items.into_iter().map(String::from).collect()
    }

    /// Drop duplicates keeping first occurrence; the monitoring placeholder
    /// survives only when nothing else is recommended
    fn dedup_recommendations(items: Vec<String>) -> Vec<String> {
        let mut merged: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            if item != CONTINUE_MONITORING && !merged.contains(&item) {
                merged.push(item);
            }
        }
        if merged.is_empty() {
            merged.push(CONTINUE_MONITORING.to_string());
        }
        merged
    }

    fn validate_change(change: &ChangeReport) -> AnalysisResult<()> {
        if !(0.0..=100.0).contains(&change.change_percentage) {
            return Err(AnalysisError::InvalidInput(format!(
                "change_percentage {} outside [0, 100]",
                change.change_percentage
            )));
        }
        Ok(())
    }

    fn validate_damage(damage: &DamageVerdict) -> AnalysisResult<()> {
        if !(0.0..=1.0).contains(&damage.damage_score) {
            return Err(AnalysisError::InvalidInput(format!(
                "damage_score {} outside [0, 1]",
                damage.damage_score
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::change_detection::{narrative, ChangeFlags};
    use crate::core::damage::{recommendations, severity_for, ScoringPath};
    use chrono::Utc;

    fn change(pct: f64, flags: ChangeFlags) -> ChangeReport {
        ChangeReport {
            change_percentage: pct,
            tier: crate::core::change_detection::change_tier(pct),
            flags,
            narrative: narrative(pct, &flags),
            mean_abs_difference: 0.0,
            luminance_shift: 0.0,
        }
    }

    fn damage(score: f64, flood: bool) -> DamageVerdict {
        DamageVerdict {
            damage_score: score,
            damage_detected: score > 0.6,
            severity: severity_for(score, flood),
            flood_detected: flood,
            infrastructure_count: 0,
            recommendations: recommendations(score, flood),
            scoring_path: ScoringPath::Statistical,
            analysis_timestamp: Utc::now(),
            error: None,
        }
    }

    #[test]
    fn test_both_missing_is_invalid() {
        let result = ReportAssembler::new().assemble(None, None);
        assert!(matches!(result, Err(AnalysisError::InvalidInput(_))));
    }

    #[test]
    fn test_damage_only() {
        let report = ReportAssembler::new().assemble(None, Some(&damage(0.1, false))).unwrap();
        assert_eq!(report.overall_severity, Severity::Low);
        assert_eq!(report.recommendations, vec![CONTINUE_MONITORING.to_string()]);
        assert!(report.change.is_none());
    }

    #[test]
    fn test_overall_severity_is_max() {
        let flags = ChangeFlags::default();
        let report = ReportAssembler::new()
            .assemble(Some(&change(60.0, flags)), Some(&damage(0.5, false)))
            .unwrap();
        assert_eq!(report.overall_severity, Severity::Critical);
        assert!(report.narrative.iter().any(|s| s.starts_with("CRITICAL")));
    }

    #[test]
    fn test_recommendations_deduplicated() {
        let flags = ChangeFlags {
            water_increase: true,
            infrastructure_damage: true,
            ..Default::default()
        };
        let report = ReportAssembler::new()
            .assemble(Some(&change(40.0, flags)), Some(&damage(0.6, true)))
            .unwrap();

        let recs = &report.recommendations;
        for item in recs {
            assert_eq!(recs.iter().filter(|r| *r == item).count(), 1);
        }
        assert!(recs.contains(&"Evacuate low-lying areas".to_string()));
        assert!(!recs.contains(&CONTINUE_MONITORING.to_string()));
    }

    #[test]
    fn test_placeholder_dropped_when_change_recommends() {
        let flags = ChangeFlags {
            vegetation_loss: true,
            ..Default::default()
        };
        let report = ReportAssembler::new()
            .assemble(Some(&change(10.0, flags)), Some(&damage(0.0, false)))
            .unwrap();
        assert_eq!(report.recommendations, vec!["Survey slopes for landslide risk".to_string()]);
    }

    #[test]
    fn test_out_of_range_inputs_rejected() {
        let assembler = ReportAssembler::new();
        let mut bad = damage(0.2, false);
        bad.damage_score = 1.5;
        assert!(assembler.assemble(None, Some(&bad)).is_err());

        let mut bad = change(10.0, ChangeFlags::default());
        bad.change_percentage = f64::NAN;
        assert!(assembler.assemble(Some(&bad), None).is_err());
    }
}
