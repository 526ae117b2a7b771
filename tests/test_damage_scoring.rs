use disaster_lens::core::classifier::{Classifier, ClassifierError, ClassifierStatus, INPUT_SIZE};
use disaster_lens::core::damage::severity_for;
use disaster_lens::core::ScoringPath;
use disaster_lens::{DamageScorer, Image, Severity};
use ndarray::Array3;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Returns fixed logits for any input
struct FixedLogits(Vec<f32>);

impl Classifier for FixedLogits {
    fn name(&self) -> &str {
        "fixed-logits"
    }

    fn predict(&self, input: &Array3<f32>) -> Result<Vec<f32>, ClassifierError> {
        assert_eq!(input.dim(), (3, INPUT_SIZE, INPUT_SIZE));
        Ok(self.0.clone())
    }
}

struct BrokenModel;

impl Classifier for BrokenModel {
    fn predict(&self, _input: &Array3<f32>) -> Result<Vec<f32>, ClassifierError> {
        Err(ClassifierError::Inference("tensor shape mismatch".to_string()))
    }
}

fn checkerboard(width: usize, height: usize, cell: usize) -> Image {
    let mut raw = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            let v = if (x / cell + y / cell) % 2 == 0 { 0 } else { 255 };
            raw.extend_from_slice(&[v, v, v]);
        }
    }
    Image::from_raw(width, height, 3, raw).expect("Failed to build checkerboard")
}

fn gradient(width: usize, height: usize) -> Image {
    let mut raw = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            raw.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
        }
    }
    Image::from_raw(width, height, 3, raw).expect("Failed to build gradient")
}

#[test]
fn test_statistical_scores_stay_in_unit_range() {
    let _ = env_logger::builder().is_test(true).try_init();

    let scorer = DamageScorer::new();
    let images = vec![
        Image::filled(1, 1, [0, 0, 0]).expect("Failed to build image"),
        Image::filled(64, 48, [255, 255, 255]).expect("Failed to build image"),
        checkerboard(80, 80, 1),
        checkerboard(200, 120, 40),
        gradient(300, 200),
    ];

    for image in &images {
        let verdict = scorer.score(image);
        println!(
            "{}x{}: score {:.3}, severity {}",
            image.width(),
            image.height(),
            verdict.damage_score,
            verdict.severity
        );
        assert!((0.0..=1.0).contains(&verdict.damage_score));
        assert_eq!(verdict.scoring_path, ScoringPath::Statistical);
        assert_eq!(verdict.damage_detected, verdict.damage_score > 0.6);
        assert!(!verdict.recommendations.is_empty());
    }
}

#[test]
fn test_high_variance_image_saturates_fallback() {
    // 0/255 checkerboard has sample variance 255^2 / 4 > 10000
    let verdict = DamageScorer::new().score(&checkerboard(100, 100, 2));
    assert_eq!(verdict.damage_score, 1.0);
    assert_eq!(verdict.severity, Severity::Critical);
    assert!(verdict.damage_detected);
}

#[test]
fn test_severity_is_monotonic_in_score() {
    for flood in [false, true] {
        let mut previous = Severity::Low;
        for step in 0..=100 {
            let severity = severity_for(step as f64 / 100.0, flood);
            assert!(severity >= previous, "severity dropped at score {}", step);
            previous = severity;
        }
    }
    assert_eq!(severity_for(0.0, true), Severity::Critical);
}

#[test]
fn test_model_path_scores_leading_class_mass() {
    let mut logits = vec![-10.0f32; 1000];
    for logit in logits.iter_mut().take(100) {
        *logit = 10.0;
    }

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let scorer = DamageScorer::with_loader(move || -> Result<Arc<dyn Classifier>, ClassifierError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FixedLogits(logits.clone())))
    });

    let first = scorer.score(&Image::filled(50, 50, [90, 90, 90]).expect("Failed to build image"));
    let second = scorer.score(&gradient(64, 64));

    assert_eq!(scorer.status(), ClassifierStatus::Loaded);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    for verdict in [&first, &second] {
        assert_eq!(verdict.scoring_path, ScoringPath::Model);
        assert!(verdict.damage_score > 0.99 && verdict.damage_score <= 1.0);
        assert_eq!(verdict.severity, Severity::Critical);
    }
}

#[test]
fn test_failed_load_falls_back_permanently() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let scorer = DamageScorer::with_loader(move || -> Result<Arc<dyn Classifier>, ClassifierError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(ClassifierError::Load("weights not found".to_string()))
    });

    for _ in 0..3 {
        let verdict = scorer.score(&Image::filled(20, 20, [10, 200, 30]).expect("Failed to build image"));
        assert_eq!(verdict.scoring_path, ScoringPath::Statistical);
        assert!(verdict.error.is_none());
    }
    assert_eq!(scorer.status(), ClassifierStatus::Unavailable);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_inference_failure_is_reported_in_verdict() {
    let scorer = DamageScorer::with_loader(|| -> Result<Arc<dyn Classifier>, ClassifierError> {
        Ok(Arc::new(BrokenModel))
    });

    let verdict = scorer.score(&Image::filled(30, 30, [100, 100, 100]).expect("Failed to build image"));
    assert_eq!(verdict.damage_score, 0.0);
    assert_eq!(verdict.severity, Severity::Low);
    assert!(verdict.error.as_deref().unwrap_or_default().contains("tensor shape mismatch"));
    assert!(verdict.recommendations.is_empty());
}

#[test]
fn test_flooded_image_is_critical_regardless_of_score() {
    let flooded = Image::filled(60, 60, [0, 0, 139]).expect("Failed to build image");
    let verdict = DamageScorer::new().score(&flooded);
    assert!(verdict.flood_detected);
    assert_eq!(verdict.severity, Severity::Critical);
    assert!(verdict.recommendations.contains(&"Set up temporary shelters".to_string()));
}

#[test]
fn test_concurrent_scoring_loads_once() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let scorer = Arc::new(DamageScorer::with_loader(
        move || -> Result<Arc<dyn Classifier>, ClassifierError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FixedLogits(vec![0.0; 200])))
        },
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let scorer = scorer.clone();
            std::thread::spawn(move || {
                let image = Image::filled(16, 16, [50, 60, 70]).expect("Failed to build image");
                scorer.score(&image).damage_score
            })
        })
        .collect();

    for handle in handles {
        let score = handle.join().expect("Scoring thread panicked");
        // Uniform logits over 200 classes put half the mass in the first 100
        assert!((score - 0.5).abs() < 1e-4);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}
