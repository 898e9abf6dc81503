use std::fmt;

use ndarray::ArrayView4;
use ort::session::Session;

use crate::error::{InferenceError, StartupError};

/// Maps one normalized `(1, H, W, 3)` tensor to a score per label.
///
/// Implementations are shared read-only across request threads.
pub trait Classifier: Send + Sync {
    fn classify(&self, tensor: ArrayView4<'_, f32>) -> Result<Vec<f32>, InferenceError>;

    /// Output width declared by the artifact, if it is static.
    fn num_classes(&self) -> Option<usize> {
        None
    }
}

/// Classifier backed by an ONNX Runtime session.
pub struct OnnxClassifier {
    session: Session,
    input_name: String,
    output_name: String,
}

// Session is not Debug.
impl fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("input", &self.input_name)
            .field("output", &self.output_name)
            .finish()
    }
}

impl OnnxClassifier {
    /// Binds to the first input and first output of the graph.
    pub fn new(session: Session) -> Result<Self, StartupError> {
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| StartupError::ModelSignature("model has no inputs".into()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| StartupError::ModelSignature("model has no outputs".into()))?;
        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }
}

/// Accepts `(1, N)` and `(N,)` score tensors.
pub(crate) fn check_output_shape(shape: &[usize]) -> Result<(), InferenceError> {
    match shape {
        [1, _] | [_] => Ok(()),
        shape => Err(InferenceError::OutputShape(shape.to_vec())),
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, tensor: ArrayView4<'_, f32>) -> Result<Vec<f32>, InferenceError> {
        let inputs = ort::inputs![self.input_name.as_str() => tensor]?;
        let outputs = self.session.run(inputs)?;
        let scores = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        check_output_shape(scores.shape())?;
        Ok(scores.iter().copied().collect())
    }

    fn num_classes(&self) -> Option<usize> {
        self.session
            .outputs
            .first()
            .and_then(|o| o.output_type.tensor_dimensions())
            .and_then(|dims| dims.last())
            .and_then(|&n| usize::try_from(n).ok())
    }
}
