//! Error types for the classification service.
//!
//! Errors are split by who caused them: per-image decode failures are
//! client data and stay local to one slot, validation failures reject the
//! whole request, inference and startup failures are server faults.

use std::path::PathBuf;

use thiserror::Error;

/// A single image could not be turned into a tensor.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty image payload")]
    Empty,

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unreadable image bytes: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("image has zero size ({width}x{height})")]
    ZeroSize { width: u32, height: u32 },

    #[error("resize failed: {0}")]
    Resize(String),

    #[error("tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// The model failed on a well-formed tensor.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("onnx runtime: {0}")]
    Runtime(#[from] ort::Error),

    #[error("model returned {got} scores but {expected} labels are loaded")]
    LabelCountMismatch { expected: usize, got: usize },

    #[error("model returned no comparable score")]
    NoScore,

    #[error("unexpected output shape {0:?}, expected (1, N)")]
    OutputShape(Vec<usize>),

    #[error("inference task aborted: {0}")]
    Aborted(String),
}

/// Failure of a whole `predict_batch` call.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Model or metadata could not be loaded at process start.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("model file not found: {}", .0.display())]
    ModelMissing(PathBuf),

    #[error("failed to load model {}: {source}", .path.display())]
    Model {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },

    #[error("unsupported model signature: {0}")]
    ModelSignature(String),

    #[error("failed to read food info {}: {source}", .path.display())]
    MetadataIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse food info {}: {source}", .path.display())]
    MetadataParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("food info {} must be a JSON object keyed by dish", .0.display())]
    MetadataNotObject(PathBuf),

    #[error("food info defines no dishes")]
    EmptyLabelSet,

    #[error("model outputs {model} classes but food info defines {labels} dishes")]
    LabelCountMismatch { model: usize, labels: usize },
}
