use anyhow::Result;
use sha2::{Digest, Sha256};
use std::time::Instant;

use crate::detect::backend::{DetectorBackend, ModelOutput, RawDetection};

const STUB_CLASSES: &[&str] = &["person", "car", "bicycle", "dog", "chair", "bottle"];

/// Stub backend for tests and demos. Uses pixel hashing to detect motion and
/// fabricates one "person" detection whose box grows with each consecutive
/// motion frame, so a demo loop walks far -> medium -> close without a model.
pub struct StubBackend {
    last_hash: Option<[u8; 32]>,
    motion_streak: u32,
    class_names: Vec<String>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            last_hash: None,
            motion_streak: 0,
            class_names: STUB_CLASSES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<ModelOutput> {
        let started = Instant::now();
        let current_hash: [u8; 32] = Sha256::digest(pixels).into();

        let motion = match self.last_hash {
            Some(prev) => prev != current_hash,
            None => false,
        };
        self.last_hash = Some(current_hash);
        if motion {
            self.motion_streak = self.motion_streak.saturating_add(1);
        } else {
            self.motion_streak = 0;
        }

        let mut detections = Vec::new();
        if motion {
            let grow = self.motion_streak.min(8) as f32 / 8.0;
            let box_w = width as f32 * (0.15 + 0.55 * grow);
            let box_h = height as f32 * (0.25 + 0.65 * grow);
            let center_x = width as f32 * 0.35;
            let center_y = height as f32 * 0.5;
            detections.push(RawDetection {
                x1: (center_x - box_w / 2.0).max(0.0),
                y1: (center_y - box_h / 2.0).max(0.0),
                x2: (center_x + box_w / 2.0).min(width as f32),
                y2: (center_y + box_h / 2.0).min(height as f32),
                confidence: 0.85,
                class_id: 0,
            });
        }

        Ok(ModelOutput {
            detections,
            inference_time: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_is_quiet() {
        let mut backend = StubBackend::new();
        let out = backend.detect(&[0u8; 300], 10, 10).unwrap();
        assert!(out.detections.is_empty());
    }

    #[test]
    fn changed_pixels_produce_a_person() {
        let mut backend = StubBackend::new();
        backend.detect(&vec![0u8; 640 * 480 * 3], 640, 480).unwrap();
        let out = backend.detect(&vec![9u8; 640 * 480 * 3], 640, 480).unwrap();
        assert_eq!(out.detections.len(), 1);
        let det = out.detections[0];
        assert_eq!(det.class_id, 0);
        assert!(det.confidence > 0.5);
        assert!(det.x2 > det.x1 && det.y2 > det.y1);
    }

    #[test]
    fn box_grows_with_consecutive_motion() {
        let mut backend = StubBackend::new();
        let mut last_area = 0.0f32;
        for fill in 0u8..6 {
            let out = backend
                .detect(&vec![fill; 640 * 480 * 3], 640, 480)
                .unwrap();
            if let Some(det) = out.detections.first() {
                let area = (det.x2 - det.x1) * (det.y2 - det.y1);
                assert!(area > last_area);
                last_area = area;
            }
        }
        assert!(last_area > 0.0);
    }
}
