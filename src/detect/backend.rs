use anyhow::Result;
use std::time::Duration;

use crate::engine::BoundingBox;

/// One raw model detection in pixel coordinates, before any policy applies.
#[derive(Clone, Copy, Debug)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl RawDetection {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox {
            x1: self.x1 as i32,
            y1: self.y1 as i32,
            x2: self.x2 as i32,
            y2: self.y2 as i32,
        }
    }
}

/// Result of one inference call.
#[derive(Clone, Debug, Default)]
pub struct ModelOutput {
    pub detections: Vec<RawDetection>,
    /// Wall-clock inference duration, reported by the backend.
    pub inference_time: Duration,
}

/// Model-runner boundary.
///
/// The engine never inspects model internals; it consumes raw detections and
/// an inference-duration measurement through this trait. Implementations own
/// model loading and device placement.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Label table mapping `class_id` to a class name.
    fn class_names(&self) -> &[String];

    /// Run detection on an RGB24 frame.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<ModelOutput>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
