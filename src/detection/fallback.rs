use crate::detection::labels::supports_leak_classes;
use crate::models::BoundingBox;

/// Why the heuristic detector was consulted for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The model resolved but could not load or predict.
    InferenceFailed,
    /// The model's vocabulary has no leak class at all. This fires even when
    /// the fallback is configured off, so an un-fine-tuned general-purpose
    /// detector still yields leak diagnoses.
    NonLeakModel,
    /// Fallback is enabled and the model found nothing.
    Enabled,
}

/// Decide whether heuristic output should stand in for the model's.
///
/// Only ever fires when the model produced no usable detections; heuristic
/// boxes replace an empty model result and are never merged into a
/// non-empty one.
pub fn fallback_reason<S: AsRef<str>>(
    model_detections: &[BoundingBox],
    model_label_set: &[S],
    model_failed: bool,
    fallback_enabled: bool,
) -> Option<FallbackReason> {
    if !model_detections.is_empty() {
        return None;
    }
    if model_failed {
        Some(FallbackReason::InferenceFailed)
    } else if !supports_leak_classes(model_label_set) {
        Some(FallbackReason::NonLeakModel)
    } else if fallback_enabled {
        Some(FallbackReason::Enabled)
    } else {
        None
    }
}

pub fn should_use_fallback<S: AsRef<str>>(
    model_detections: &[BoundingBox],
    model_label_set: &[S],
    model_failed: bool,
    fallback_enabled: bool,
) -> bool {
    fallback_reason(model_detections, model_label_set, model_failed, fallback_enabled).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeakCategory;

    const LEAK_NAMES: [&str; 2] = ["pipe_crack", "burst_pipe"];
    const COCO_NAMES: [&str; 3] = ["person", "car", "dog"];

    fn one_box() -> Vec<BoundingBox> {
        vec![BoundingBox {
            x1: 0.0,
            y1: 0.0,
            x2: 5.0,
            y2: 5.0,
            confidence: 0.7,
            label: LeakCategory::PipeCrack,
        }]
    }

    #[test]
    fn never_overrides_model_detections() {
        assert!(!should_use_fallback(&one_box(), &COCO_NAMES, true, true));
        assert!(!should_use_fallback(&one_box(), &LEAK_NAMES, false, true));
    }

    #[test]
    fn failure_triggers_even_when_disabled() {
        assert_eq!(
            fallback_reason(&[], &LEAK_NAMES, true, false),
            Some(FallbackReason::InferenceFailed)
        );
    }

    #[test]
    fn non_leak_model_overrides_disabled_flag() {
        assert_eq!(
            fallback_reason(&[], &COCO_NAMES, false, false),
            Some(FallbackReason::NonLeakModel)
        );
        let empty: [&str; 0] = [];
        assert!(should_use_fallback(&[], &empty, false, false));
    }

    #[test]
    fn leak_model_respects_flag() {
        assert_eq!(fallback_reason(&[], &LEAK_NAMES, false, true), Some(FallbackReason::Enabled));
        assert!(!should_use_fallback(&[], &LEAK_NAMES, false, false));
    }
}
