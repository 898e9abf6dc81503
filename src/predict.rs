use std::fmt;
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;

use crate::classifier::{Classifier, OnnxClassifier};
use crate::decode::{DecodeLimits, decode_image_with_limits};
use crate::error::{InferenceError, PredictError, StartupError};
use crate::mapping::{LabelSet, load_class_mapping};
use crate::model::OnnxModel;
use crate::postprocess::{Prediction, argmax_and_max};
use crate::preprocess::Processor;

/// Number of crops the kiosk cuts from one tray photo.
pub const IMAGES_PER_TRAY: usize = 5;

/// Label set, preprocessing and model, loaded together and never mutated.
pub struct ClassifierService {
    labels: LabelSet,
    processor: Processor,
    limits: DecodeLimits,
    classifier: Box<dyn Classifier>,
}

impl fmt::Debug for ClassifierService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierService")
            .field("labels", &self.labels.keys())
            .field("processor", &self.processor)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl ClassifierService {
    /// Fails if the model declares an output width different from the
    /// number of labels.
    pub fn new(
        labels: LabelSet,
        processor: Processor,
        classifier: Box<dyn Classifier>,
    ) -> Result<Self, StartupError> {
        if labels.is_empty() {
            return Err(StartupError::EmptyLabelSet);
        }
        match classifier.num_classes() {
            Some(model) if model != labels.len() => {
                return Err(StartupError::LabelCountMismatch {
                    model,
                    labels: labels.len(),
                });
            }
            Some(_) => {}
            None => tracing::warn!(
                labels = labels.len(),
                "model output width is dynamic, label count checked per request"
            ),
        }
        Ok(Self {
            labels,
            processor,
            limits: DecodeLimits::default(),
            classifier,
        })
    }

    /// Replaces the default per-image decode limits.
    pub fn with_decode_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Loads the food info document and the ONNX model from disk.
    pub fn load(
        model_path: &Path,
        food_info_path: &Path,
        processor: Processor,
        cuda: bool,
    ) -> Result<Self, StartupError> {
        tracing::info!(path = %food_info_path.display(), "loading food info");
        let labels = load_class_mapping(food_info_path)?;
        tracing::info!(labels = ?labels.keys(), "label set loaded");

        tracing::info!(path = %model_path.display(), cuda, "loading model");
        if !model_path.is_file() {
            return Err(StartupError::ModelMissing(model_path.to_path_buf()));
        }
        let session = OnnxModel::new(cuda)
            .load_model(model_path)
            .map_err(|source| StartupError::Model {
                path: model_path.to_path_buf(),
                source,
            })?;
        let classifier = OnnxClassifier::new(session)?;
        Self::new(labels, processor, Box::new(classifier))
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Decode, normalize and classify one image. Decode or normalize
    /// failures give `Prediction::Unreadable`; inference failures are errors.
    pub fn predict_one(&self, payload: &str) -> Result<Prediction, InferenceError> {
        let tensor = match decode_image_with_limits(payload, &self.limits)
            .and_then(|img| self.processor.preprocess(&img))
        {
            Ok(tensor) => tensor,
            Err(e) => {
                tracing::debug!(error = %e, "image unreadable");
                return Ok(Prediction::Unreadable {
                    reason: e.to_string(),
                });
            }
        };

        let scores = self.classifier.classify(tensor.view())?;
        if scores.len() != self.labels.len() {
            return Err(InferenceError::LabelCountMismatch {
                expected: self.labels.len(),
                got: scores.len(),
            });
        }
        let (index, confidence) = argmax_and_max(&scores).ok_or(InferenceError::NoScore)?;
        let key = self
            .labels
            .get(index)
            .ok_or(InferenceError::LabelCountMismatch {
                expected: self.labels.len(),
                got: scores.len(),
            })?;
        Ok(Prediction::Dish {
            key: key.to_owned(),
            confidence,
        })
    }

    /// Classifies the five crops of one tray, in input order.
    pub fn predict_batch(&self, images: &[String]) -> Result<Vec<Prediction>, PredictError> {
        if images.len() != IMAGES_PER_TRAY {
            return Err(PredictError::Validation(format!(
                "expected {IMAGES_PER_TRAY} images, got {}",
                images.len()
            )));
        }

        let t = Instant::now();
        let predictions = images
            .par_iter()
            .map(|img| self.predict_one(img))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            elapsed = ?t.elapsed(),
            keys = ?predictions.iter().map(Prediction::key).collect::<Vec<_>>(),
            "tray classified"
        );
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::{Broken, FixedScores};
    use crate::decode::tests::png_payload;
    use crate::preprocess::PreprocessConfig;
    use serde_json::{Map, Value, json};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn labels(keys: &[&str]) -> LabelSet {
        let map: Map<String, Value> = keys
            .iter()
            .map(|k| (k.to_string(), json!({"name": k})))
            .collect();
        LabelSet::from_metadata(map).unwrap()
    }

    fn service_with(classifier: Box<dyn Classifier>) -> ClassifierService {
        ClassifierService::new(
            labels(&["ca_hu_kho", "canh_chua"]),
            Processor::new(PreprocessConfig::default()),
            classifier,
        )
        .unwrap()
    }

    fn tray() -> Vec<String> {
        vec![
            png_payload(40, 30, [200, 10, 10]),
            format!("data:image/png;base64,{}", png_payload(10, 10, [0, 255, 0])),
            png_payload(128, 128, [1, 2, 3]),
            png_payload(3, 90, [50, 50, 50]),
            png_payload(64, 32, [255, 255, 255]),
        ]
    }

    struct SharedCounter(Arc<FixedScores>);

    impl Classifier for SharedCounter {
        fn classify(
            &self,
            tensor: ndarray::ArrayView4<'_, f32>,
        ) -> Result<Vec<f32>, InferenceError> {
            self.0.classify(tensor)
        }
    }

    #[test]
    fn fixed_scores_label_every_slot() {
        let service = service_with(Box::new(FixedScores::new(vec![0.9, 0.1])));
        let predictions = service.predict_batch(&tray()).unwrap();
        assert_eq!(predictions.len(), 5);
        for p in &predictions {
            assert_eq!(
                p,
                &Prediction::Dish {
                    key: "ca_hu_kho".into(),
                    confidence: 0.9
                }
            );
        }
    }

    #[test]
    fn bad_image_is_isolated_to_its_slot() {
        let service = service_with(Box::new(FixedScores::new(vec![0.2, 0.8])));
        let mut images = tray();
        images[2] = "not-base64!!".to_string();
        let predictions = service.predict_batch(&images).unwrap();
        assert_eq!(predictions.len(), 5);
        assert!(matches!(predictions[2], Prediction::Unreadable { .. }));
        for i in [0, 1, 3, 4] {
            assert_eq!(predictions[i].key(), "canh_chua");
            assert!(service.labels().contains(predictions[i].key()));
            assert!((0.0..=1.0).contains(&predictions[i].confidence()));
        }
    }

    #[test]
    fn undecodable_bytes_become_sentinel() {
        let service = service_with(Box::new(FixedScores::new(vec![0.5, 0.5])));
        let p = service.predict_one("aGVsbG8gd29ybGQ=").unwrap();
        assert_eq!(p.key(), "error");
        assert_eq!(p.confidence(), 0.0);
    }

    #[test]
    fn wrong_image_count_is_rejected_before_inference() {
        let scores = Arc::new(FixedScores::new(vec![0.9, 0.1]));
        let service = service_with(Box::new(SharedCounter(scores.clone())));
        for n in [0, 4, 6] {
            let images = vec![png_payload(4, 4, [0, 0, 0]); n];
            let err = service.predict_batch(&images).unwrap_err();
            assert!(matches!(err, PredictError::Validation(_)), "n = {n}");
        }
        assert_eq!(scores.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sentinel_slots_skip_inference() {
        let scores = Arc::new(FixedScores::new(vec![0.9, 0.1]));
        let service = service_with(Box::new(SharedCounter(scores.clone())));
        let mut images = tray();
        images[0] = String::new();
        images[4] = "%%%".into();
        service.predict_batch(&images).unwrap();
        assert_eq!(scores.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn oversized_image_becomes_sentinel() {
        let scores = Arc::new(FixedScores::new(vec![0.9, 0.1]));
        let service = service_with(Box::new(SharedCounter(scores.clone()))).with_decode_limits(
            DecodeLimits {
                max_width: 256,
                max_height: 256,
                ..DecodeLimits::default()
            },
        );
        let mut images = tray();
        images[1] = png_payload(300, 4, [0, 0, 0]);
        let predictions = service.predict_batch(&images).unwrap();
        assert!(matches!(predictions[1], Prediction::Unreadable { .. }));
        assert_eq!(predictions[1].key(), "error");
        for i in [0, 2, 3, 4] {
            assert_eq!(predictions[i].key(), "ca_hu_kho");
        }
        assert_eq!(scores.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn inference_failure_fails_the_batch() {
        let service = service_with(Box::new(Broken));
        let err = service.predict_batch(&tray()).unwrap_err();
        assert!(matches!(err, PredictError::Inference(_)));
    }

    #[test]
    fn score_length_must_match_labels() {
        let service = service_with(Box::new(FixedScores::new(vec![0.3, 0.3, 0.4])));
        let err = service.predict_batch(&tray()).unwrap_err();
        assert!(matches!(
            err,
            PredictError::Inference(InferenceError::LabelCountMismatch {
                expected: 2,
                got: 3
            })
        ));
    }

    #[test]
    fn declared_width_is_checked_at_construction() {
        let mut classifier = FixedScores::new(vec![0.5; 3]);
        classifier.declared = Some(3);
        let err = ClassifierService::new(
            labels(&["ca_hu_kho", "canh_chua"]),
            Processor::new(PreprocessConfig::default()),
            Box::new(classifier),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StartupError::LabelCountMismatch {
                model: 3,
                labels: 2
            }
        ));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let service = service_with(Box::new(FixedScores::new(vec![0.35, 0.65])));
        let images = tray();
        let first = service.predict_batch(&images).unwrap();
        let second = service.predict_batch(&images).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn load_reports_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let food_info = dir.path().join("food_info.json");
        std::fs::write(&food_info, r#"{"ca_hu_kho": {}, "canh_chua": {}}"#).unwrap();
        let err = ClassifierService::load(
            &dir.path().join("model.onnx"),
            &food_info,
            Processor::new(PreprocessConfig::default()),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, StartupError::ModelMissing(_)));
    }
}
