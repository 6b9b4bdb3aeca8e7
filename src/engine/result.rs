use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Fallback frame dimensions reported when a request never produced a
/// decodable image.
pub(crate) const FALLBACK_FRAME_WIDTH: u32 = 640;
pub(crate) const FALLBACK_FRAME_HEIGHT: u32 = 480;

/// Horizontal position bucket relative to the frame center.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
    Front,
}

impl Position {
    /// Spoken form used in alert strings.
    pub fn phrase(&self) -> &'static str {
        match self {
            Position::Left => "to the left",
            Position::Right => "to the right",
            Position::Front => "in front",
        }
    }
}

/// Distance bucket derived from the bounding-box area ratio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    Close,
    Medium,
    Far,
}

impl Distance {
    /// Spoken form used in alert strings.
    pub fn phrase(&self) -> &'static str {
        match self {
            Distance::Close => "close",
            Distance::Medium => "at medium distance",
            Distance::Far => "far away",
        }
    }
}

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn area(&self) -> i64 {
        (self.x2 - self.x1) as i64 * (self.y2 - self.y1) as i64
    }

    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) as f32 / 2.0
    }
}

/// One classified detection as exposed to transports.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    pub position: Position,
    pub distance: Distance,
    pub is_priority: bool,
    pub bbox: BoundingBox,
}

/// Structured result of processing one frame.
///
/// Serializes to the camelCase wire shape consumed by mobile clients:
/// `{alert, alerts, objects, detections, frameWidth, ...}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameResult {
    /// First alert of the frame, empty when nothing fired.
    pub alert: String,
    /// All alerts, in detection processing order.
    pub alerts: Vec<String>,
    /// Class names in processing order, duplicates included.
    pub objects: Vec<String>,
    pub detections: Vec<Detection>,
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_count: u64,
    /// Model inference time in milliseconds.
    pub inference_time: f64,
    pub timestamp: String,
    /// End-to-end request time in milliseconds, set by the transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FrameResult {
    /// Empty-shaped result returned when a request fails before the engine
    /// runs. Keeps the wire shape intact so clients hold their connection.
    pub fn empty(frame_count: u64, error: impl Into<String>) -> Self {
        Self {
            alert: String::new(),
            alerts: Vec::new(),
            objects: Vec::new(),
            detections: Vec::new(),
            frame_width: FALLBACK_FRAME_WIDTH,
            frame_height: FALLBACK_FRAME_HEIGHT,
            frame_count,
            inference_time: 0.0,
            timestamp: now_rfc3339(),
            processing_time: None,
            error: Some(error.into()),
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Round a millisecond measurement to two decimals for the wire.
pub(crate) fn round_ms(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_keys_are_camel_case() {
        let result = FrameResult::empty(7, "decode failed");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["frameWidth"], 640);
        assert_eq!(json["frameHeight"], 480);
        assert_eq!(json["frameCount"], 7);
        assert_eq!(json["error"], "decode failed");
        assert_eq!(json["alert"], "");
        assert!(json.get("processingTime").is_none());
    }

    #[test]
    fn detection_serializes_original_field_names() {
        let det = Detection {
            class_name: "person".to_string(),
            confidence: 0.9,
            position: Position::Left,
            distance: Distance::Medium,
            is_priority: true,
            bbox: BoundingBox {
                x1: 100,
                y1: 100,
                x2: 200,
                y2: 300,
            },
        };
        let json = serde_json::to_value(&det).unwrap();
        assert_eq!(json["class"], "person");
        assert_eq!(json["isPriority"], true);
        assert_eq!(json["position"], "left");
        assert_eq!(json["distance"], "medium");
        assert_eq!(json["bbox"]["x1"], 100);
    }

    #[test]
    fn bbox_area_and_center() {
        let bbox = BoundingBox {
            x1: 100,
            y1: 100,
            x2: 200,
            y2: 300,
        };
        assert_eq!(bbox.area(), 20_000);
        assert_eq!(bbox.center_x(), 150.0);
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        assert_eq!(round_ms(12.3456), 12.35);
        assert_eq!(round_ms(0.0), 0.0);
    }
}
