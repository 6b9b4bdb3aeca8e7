use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

const DEFAULT_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
const DEFAULT_CENTER_THRESHOLD: f64 = 0.2;
const DEFAULT_COOLDOWN_SECS: f64 = 3.0;
const DEFAULT_MAX_DETECTIONS: usize = 8;
const DEFAULT_DISTANCE_THRESHOLD: f64 = 0.15;

/// Per-class area-ratio limits for "close". Small items must stay tiny to
/// count as close; vehicles must fill most of the frame. Stored as `f64` so
/// the values survive JSON serialization without float noise.
const DEFAULT_CLASS_THRESHOLDS: &[(&str, f64)] = &[
    ("bottle", 0.05),
    ("cup", 0.04),
    ("cell phone", 0.04),
    ("book", 0.05),
    ("cat", 0.05),
    ("dog", 0.10),
    ("backpack", 0.10),
    ("person", 0.15),
    ("bicycle", 0.15),
    ("car", 0.30),
    ("motorcycle", 0.20),
    ("bus", 0.50),
    ("truck", 0.45),
    ("train", 0.50),
    ("traffic light", 0.05),
    ("stop sign", 0.05),
    ("bench", 0.20),
    ("fire hydrant", 0.08),
    ("chair", 0.15),
    ("couch", 0.30),
    ("stairs", 0.25),
];

const DEFAULT_PRIORITY_CLASSES: &[&str] = &[
    "person",
    "car",
    "bicycle",
    "motorcycle",
    "bus",
    "truck",
    "dog",
    "cat",
    "traffic light",
    "stop sign",
    "stairs",
    "fire hydrant",
];

#[derive(Debug, Deserialize, Default)]
struct AlertdConfigFile {
    addr: Option<String>,
    backend: Option<String>,
    rotate_portrait: Option<bool>,
    engine: Option<EngineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    confidence_threshold: Option<f64>,
    center_threshold: Option<f64>,
    cooldown_seconds: Option<f64>,
    max_detections: Option<usize>,
    class_thresholds: Option<HashMap<String, f64>>,
    default_threshold: Option<f64>,
    priority_classes: Option<Vec<String>>,
}

/// Immutable engine policy values.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Detections below this confidence are discarded.
    pub confidence_threshold: f64,
    /// Half-width of the "in front" band as a fraction of frame width.
    pub center_threshold: f64,
    /// Minimum interval between two alerts for the same class.
    pub cooldown: Duration,
    /// Upper bound on detections kept per frame.
    pub max_detections: usize,
    /// Per-class close limits for distance classification.
    pub class_thresholds: HashMap<String, f64>,
    /// Close limit for classes absent from `class_thresholds`.
    pub default_threshold: f64,
    /// Classes eligible for "Warning!" alerts.
    pub priority_classes: BTreeSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            center_threshold: DEFAULT_CENTER_THRESHOLD,
            cooldown: Duration::from_secs_f64(DEFAULT_COOLDOWN_SECS),
            max_detections: DEFAULT_MAX_DETECTIONS,
            class_thresholds: default_class_thresholds(),
            default_threshold: DEFAULT_DISTANCE_THRESHOLD,
            priority_classes: default_priority_classes(),
        }
    }
}

impl EngineConfig {
    fn from_file(file: EngineConfigFile) -> Result<Self> {
        let cooldown_seconds = file.cooldown_seconds.unwrap_or(DEFAULT_COOLDOWN_SECS);
        if !cooldown_seconds.is_finite() || cooldown_seconds < 0.0 {
            return Err(anyhow!("cooldown_seconds must be >= 0"));
        }
        let cfg = Self {
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            center_threshold: file.center_threshold.unwrap_or(DEFAULT_CENTER_THRESHOLD),
            cooldown: Duration::from_secs_f64(cooldown_seconds),
            max_detections: file.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
            class_thresholds: file
                .class_thresholds
                .unwrap_or_else(default_class_thresholds),
            default_threshold: file.default_threshold.unwrap_or(DEFAULT_DISTANCE_THRESHOLD),
            priority_classes: file
                .priority_classes
                .map(|classes| classes.into_iter().collect())
                .unwrap_or_else(default_priority_classes),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure_ratio("confidence_threshold", self.confidence_threshold)?;
        ensure_ratio("center_threshold", self.center_threshold)?;
        ensure_ratio("default_threshold", self.default_threshold)?;
        for (class, limit) in &self.class_thresholds {
            ensure_ratio(&format!("class_thresholds['{}']", class), *limit)?;
        }
        if self.max_detections == 0 {
            return Err(anyhow!("max_detections must be >= 1"));
        }
        Ok(())
    }
}

/// Server-shape configuration: transport settings plus engine policy.
#[derive(Debug, Clone)]
pub struct AlertdConfig {
    pub addr: String,
    pub backend: String,
    /// Rotate uploads 90 degrees clockwise. Phone clients send portrait
    /// frames sideways.
    pub rotate_portrait: bool,
    pub engine: EngineConfig,
}

impl AlertdConfig {
    /// Load from the JSON file named by `SIGHTGUARD_CONFIG` (when set),
    /// apply environment overrides, then validate. Any failure here is
    /// fatal at startup.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SIGHTGUARD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => AlertdConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.engine.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AlertdConfigFile) -> Result<Self> {
        Ok(Self {
            addr: file.addr.unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            backend: file.backend.unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            rotate_portrait: file.rotate_portrait.unwrap_or(true),
            engine: EngineConfig::from_file(file.engine.unwrap_or_default())?,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("SIGHTGUARD_ADDR") {
            if !addr.trim().is_empty() {
                self.addr = addr;
            }
        }
        if let Ok(backend) = std::env::var("SIGHTGUARD_BACKEND") {
            if !backend.trim().is_empty() {
                self.backend = backend;
            }
        }
        if let Ok(confidence) = std::env::var("SIGHTGUARD_CONFIDENCE") {
            let value: f64 = confidence
                .parse()
                .map_err(|_| anyhow!("SIGHTGUARD_CONFIDENCE must be a number in (0, 1]"))?;
            self.engine.confidence_threshold = value;
        }
        if let Ok(cooldown) = std::env::var("SIGHTGUARD_COOLDOWN_SECS") {
            let seconds: f64 = cooldown
                .parse()
                .map_err(|_| anyhow!("SIGHTGUARD_COOLDOWN_SECS must be a number of seconds"))?;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(anyhow!("SIGHTGUARD_COOLDOWN_SECS must be >= 0"));
            }
            self.engine.cooldown = Duration::from_secs_f64(seconds);
        }
        if let Ok(max) = std::env::var("SIGHTGUARD_MAX_DETECTIONS") {
            let value: usize = max
                .parse()
                .map_err(|_| anyhow!("SIGHTGUARD_MAX_DETECTIONS must be an integer >= 1"))?;
            self.engine.max_detections = value;
        }
        Ok(())
    }
}

fn default_class_thresholds() -> HashMap<String, f64> {
    DEFAULT_CLASS_THRESHOLDS
        .iter()
        .map(|(class, limit)| (class.to_string(), *limit))
        .collect()
}

fn default_priority_classes() -> BTreeSet<String> {
    DEFAULT_PRIORITY_CLASSES
        .iter()
        .map(|class| class.to_string())
        .collect()
}

fn ensure_ratio(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        return Err(anyhow!("{} must be in (0, 1], got {}", name, value));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<AlertdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_calibration() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.confidence_threshold, 0.5);
        assert_eq!(cfg.center_threshold, 0.2);
        assert_eq!(cfg.cooldown, Duration::from_secs(3));
        assert_eq!(cfg.max_detections, 8);
        assert_eq!(cfg.default_threshold, 0.15);
        assert_eq!(cfg.class_thresholds.get("person"), Some(&0.15));
        assert_eq!(cfg.class_thresholds.get("bus"), Some(&0.50));
        assert!(cfg.priority_classes.contains("person"));
        assert!(cfg.priority_classes.contains("stairs"));
        assert!(!cfg.priority_classes.contains("bottle"));
        cfg.validate().unwrap();
    }

    #[test]
    fn thresholds_serialize_without_float_noise() {
        // the introspection endpoints put these straight on the wire
        let cfg = EngineConfig::default();
        let json = serde_json::json!({
            "confidence_threshold": cfg.confidence_threshold,
            "class_thresholds": &cfg.class_thresholds,
        });
        assert_eq!(json["confidence_threshold"], 0.5);
        assert_eq!(json["class_thresholds"]["person"], 0.15);
        assert_eq!(json["class_thresholds"]["bottle"], 0.05);
        assert_eq!(json["class_thresholds"]["bus"], 0.5);
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let mut cfg = EngineConfig::default();
        cfg.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.default_threshold = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.class_thresholds.insert("car".to_string(), -0.3);
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.max_detections = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_cooldown_in_file_is_rejected() {
        let file = EngineConfigFile {
            cooldown_seconds: Some(-1.0),
            ..Default::default()
        };
        assert!(EngineConfig::from_file(file).is_err());
    }
}
