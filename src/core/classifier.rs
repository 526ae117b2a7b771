//! Pluggable image classifier used by the damage scorer
//!
//! The scorer does not ship a model. Callers inject a [`ClassifierLoader`]
//! (for example one wrapping an ONNX or torch runtime); loading is attempted
//! once, on first use.

use crate::io::codec::{self, ResizeFilter};
use crate::types::{AnalysisResult, Image};
use ndarray::Array3;
use std::sync::Arc;

/// Square input edge expected by ImageNet-style classifiers
pub const INPUT_SIZE: usize = 224;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// A forward pass from a normalized CHW tensor to class logits
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str {
        "classifier"
    }

    fn predict(&self, input: &Array3<f32>) -> Result<Vec<f32>, ClassifierError>;
}

/// Produces a classifier on first use
pub trait ClassifierLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn Classifier>, ClassifierError>;
}

impl<F> ClassifierLoader for F
where
    F: Fn() -> Result<Arc<dyn Classifier>, ClassifierError> + Send + Sync,
{
    fn load(&self) -> Result<Arc<dyn Classifier>, ClassifierError> {
        self()
    }
}

/// Model availability, transitioned at most once
pub enum ClassifierState {
    NotLoaded,
    Loaded(Arc<dyn Classifier>),
    Unavailable,
}

/// Copyable view of [`ClassifierState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierStatus {
    NotLoaded,
    Loaded,
    Unavailable,
}

impl ClassifierState {
    pub fn status(&self) -> ClassifierStatus {
        match self {
            ClassifierState::NotLoaded => ClassifierStatus::NotLoaded,
            ClassifierState::Loaded(_) => ClassifierStatus::Loaded,
            ClassifierState::Unavailable => ClassifierStatus::Unavailable,
        }
    }
}

impl std::fmt::Debug for ClassifierState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierState::NotLoaded => write!(f, "NotLoaded"),
            ClassifierState::Loaded(model) => write!(f, "Loaded({})", model.name()),
            ClassifierState::Unavailable => write!(f, "Unavailable"),
        }
    }
}

/// Resize to 224x224, scale to [0, 1] and normalize with ImageNet statistics
///
/// Returns a (channels, height, width) tensor.
pub fn preprocess(image: &Image) -> AnalysisResult<Array3<f32>> {
    let resized = codec::resize(&image.to_rgb(), INPUT_SIZE, INPUT_SIZE, ResizeFilter::Bilinear)?;
    let pixels = resized.pixels();

    Ok(Array3::from_shape_fn((3, INPUT_SIZE, INPUT_SIZE), |(c, y, x)| {
        let value = pixels[[y, x, c]] as f32 / 255.0;
        (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
    }))
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
