pub mod classifier;
pub mod cli;
pub mod decode;
pub mod error;
pub mod mapping;
pub mod model;
pub mod postprocess;
pub mod predict;
pub mod preprocess;
pub mod service;

pub use crate::classifier::{Classifier, OnnxClassifier};
pub use crate::cli::Args;
pub use crate::decode::{DecodeLimits, decode_image, decode_image_with_limits};
pub use crate::error::{DecodeError, InferenceError, PredictError, StartupError};
pub use crate::mapping::{LabelSet, load_class_mapping};
pub use crate::model::OnnxModel;
pub use crate::postprocess::{Prediction, argmax_and_max};
pub use crate::predict::{ClassifierService, IMAGES_PER_TRAY};
pub use crate::preprocess::{ChannelOrder, PreprocessConfig, Processor};
pub use crate::service::{AppState, Readiness, ServerConfig, build_router};
