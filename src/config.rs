use clap::{ArgAction, Args};
use clap::builder::BoolishValueParser;
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{LeakError, Result};

/// Detector settings, read once at startup from flags or environment.
#[derive(Args, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Primary detection model (.rten)
    #[arg(long, env = "YOLOV8_MODEL_PATH", default_value = "yolov8n.rten")]
    pub model_path: PathBuf,

    /// Model used when the primary path does not exist
    #[arg(long, env = "YOLOV8_FALLBACK_MODEL_PATH", default_value = "yolov8n.rten")]
    pub fallback_model_path: PathBuf,

    /// Minimum class score for a model box
    #[arg(long = "conf", env = "YOLOV8_CONF", default_value_t = 0.2)]
    pub conf_threshold: f32,

    /// IoU above which overlapping boxes of one class are suppressed
    #[arg(long = "iou", env = "YOLOV8_IOU", default_value_t = 0.55)]
    pub iou_threshold: f32,

    /// Square inference resolution in pixels
    #[arg(long = "imgsz", env = "YOLOV8_IMGSZ", default_value_t = 960)]
    pub image_size: u32,

    /// Maximum boxes kept per inference
    #[arg(long = "max-det", env = "YOLOV8_MAX_DET", default_value_t = 50)]
    pub max_detections: usize,

    /// Also predict on a mirrored view and pool the results
    #[arg(
        long = "tta",
        env = "YOLOV8_TTA",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub use_tta: bool,

    /// Run the colour/edge heuristics when the model finds nothing
    #[arg(
        long = "heuristic-fallback",
        env = "ENABLE_HEURISTIC_FALLBACK",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub enable_heuristic_fallback: bool,

    /// Class names for models without a `.names` sidecar file
    #[arg(long = "class-names", env = "YOLOV8_CLASS_NAMES", value_delimiter = ',')]
    pub class_names: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("yolov8n.rten"),
            fallback_model_path: PathBuf::from("yolov8n.rten"),
            conf_threshold: 0.2,
            iou_threshold: 0.55,
            image_size: 960,
            max_detections: 50,
            use_tta: false,
            enable_heuristic_fallback: true,
            class_names: Vec::new(),
        }
    }
}

impl DetectorConfig {
    /// Parse settings from JSON; absent keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| LeakError::InvalidConfig(format!("unreadable config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(LeakError::InvalidConfig(format!(
                "confidence threshold {} outside [0, 1]",
                self.conf_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(LeakError::InvalidConfig(format!(
                "IoU threshold {} outside [0, 1]",
                self.iou_threshold
            )));
        }
        if self.image_size == 0 {
            return Err(LeakError::InvalidConfig("inference size must be positive".into()));
        }
        if self.max_detections == 0 {
            return Err(LeakError::InvalidConfig("max detections must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enable_heuristic_fallback);
        assert!(!config.use_tta);
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let config = DetectorConfig { conf_threshold: 1.5, ..Default::default() };
        assert!(matches!(config.validate(), Err(LeakError::InvalidConfig(_))));

        let config = DetectorConfig { max_detections: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_fills_missing_keys_with_defaults() -> anyhow::Result<()> {
        let config = DetectorConfig::from_json(
            r#"{"model_path": "models/leaks.rten", "conf_threshold": 0.35, "class_names": ["crack", "burst"]}"#,
        )?;
        assert_eq!(config.model_path, PathBuf::from("models/leaks.rten"));
        assert_eq!(config.conf_threshold, 0.35);
        assert_eq!(config.class_names, vec!["crack".to_string(), "burst".to_string()]);
        assert_eq!(config.iou_threshold, 0.55);
        assert_eq!(config.image_size, 960);
        assert!(config.enable_heuristic_fallback);
        Ok(())
    }

    #[test]
    fn json_is_validated() {
        assert!(matches!(
            DetectorConfig::from_json(r#"{"iou_threshold": 2.0}"#),
            Err(LeakError::InvalidConfig(_))
        ));
        assert!(matches!(DetectorConfig::from_json("not json"), Err(LeakError::InvalidConfig(_))));
    }
}
