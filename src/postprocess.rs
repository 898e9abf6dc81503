use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Key reported on the wire for an image that could not be read.
pub const ERROR_KEY: &str = "error";

/// Outcome for one image slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Top-1 dish and its raw model score.
    Dish { key: String, confidence: f32 },
    /// The payload could not be decoded or normalized.
    Unreadable { reason: String },
}

impl Prediction {
    pub fn key(&self) -> &str {
        match self {
            Prediction::Dish { key, .. } => key,
            Prediction::Unreadable { .. } => ERROR_KEY,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Prediction::Dish { confidence, .. } => *confidence,
            Prediction::Unreadable { .. } => 0.0,
        }
    }

    pub fn is_dish(&self) -> bool {
        matches!(self, Prediction::Dish { .. })
    }
}

// Wire shape is always `{"key", "confidence"}`; unreadable slots become
// `{"key": "error", "confidence": 0}`.
impl Serialize for Prediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Prediction", 2)?;
        match self {
            Prediction::Dish { key, confidence } => {
                state.serialize_field("key", key)?;
                state.serialize_field("confidence", confidence)?;
            }
            Prediction::Unreadable { .. } => {
                state.serialize_field("key", ERROR_KEY)?;
                state.serialize_field("confidence", &0)?;
            }
        }
        state.end()
    }
}

/// Index and value of the highest score. Ties go to the lowest index and
/// NaN never wins. `None` when no score is comparable.
pub fn argmax_and_max(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (i, &val)| match best {
            Some((_, max_val)) if val <= max_val => best,
            _ => Some((i, val)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn picks_highest_score() {
        assert_eq!(argmax_and_max(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
    }

    #[test]
    fn ties_go_to_lowest_index() {
        assert_eq!(argmax_and_max(&[0.2, 0.4, 0.4]), Some((1, 0.4)));
        assert_eq!(argmax_and_max(&[0.5, 0.5]), Some((0, 0.5)));
    }

    #[test]
    fn nan_is_skipped() {
        assert_eq!(argmax_and_max(&[f32::NAN, 0.3, 0.1]), Some((1, 0.3)));
        assert_eq!(argmax_and_max(&[f32::NAN, f32::NAN]), None);
        assert_eq!(argmax_and_max(&[]), None);
    }

    #[test]
    fn dish_serializes_to_key_and_confidence() {
        let p = Prediction::Dish {
            key: "ca_hu_kho".into(),
            confidence: 0.9,
        };
        assert_eq!(
            serde_json::to_string(&p).unwrap(),
            r#"{"key":"ca_hu_kho","confidence":0.9}"#
        );
        let back: serde_json::Value = serde_json::from_str(&serde_json::to_string(&p).unwrap()).unwrap();
        assert_eq!(back, json!({"key": "ca_hu_kho", "confidence": 0.9}));
    }

    #[test]
    fn unreadable_serializes_to_error_sentinel() {
        let p = Prediction::Unreadable {
            reason: "invalid base64".into(),
        };
        assert_eq!(
            serde_json::to_string(&p).unwrap(),
            r#"{"key":"error","confidence":0}"#
        );
        assert_eq!(p.key(), "error");
        assert_eq!(p.confidence(), 0.0);
        assert!(!p.is_dish());
    }
}
