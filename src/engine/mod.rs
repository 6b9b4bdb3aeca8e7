//! Frame aggregation: raw model detections in, classified detections and
//! temporally deduplicated safety alerts out.
//!
//! - `normalize`: confidence filter + top-K truncation
//! - `spatial` / `distance`: pure position and distance classifiers
//! - `cooldown`: per-class alert suppression window
//! - `result`: wire types (`Detection`, `FrameResult`)
//!
//! `Engine` owns all mutable state (cooldown map, frame counter) and is
//! shared across worker threads behind `Arc`. Inference never runs under an
//! engine lock; only the cooldown check-and-set and the counter increment
//! are serialized.

mod cooldown;
mod distance;
mod normalize;
mod result;
mod spatial;

pub use cooldown::CooldownTracker;
pub use distance::classify_distance;
pub use result::{BoundingBox, Detection, Distance, FrameResult, Position};
pub use spatial::classify_position;

pub(crate) use result::{now_rfc3339, round_ms};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::detect::RawDetection;

/// The detection alerting engine.
///
/// Stateless per frame apart from the cooldown map and the frame counter;
/// one instance serves both the HTTP server and the local loop.
pub struct Engine {
    config: EngineConfig,
    cooldowns: CooldownTracker,
    frame_count: AtomicU64,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let cooldowns = CooldownTracker::new(config.cooldown);
        Self {
            config,
            cooldowns,
            frame_count: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn frames_processed(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Clear all cooldown state. Safe to call while frames are in flight;
    /// frames whose cooldown check happens after this returns see every
    /// class as never-announced.
    pub fn reset_cooldowns(&self) {
        self.cooldowns.reset();
    }

    /// Number of classes with an active cooldown entry.
    pub fn cooldown_entries(&self) -> usize {
        self.cooldowns.tracked_classes()
    }

    /// Process one frame of raw detections end-to-end.
    ///
    /// Single-pass, best-effort: a detection that fails classification
    /// (degenerate frame area, unknown class id) is dropped with a warning
    /// and does not affect its siblings. The returned `FrameResult` always
    /// carries the incremented frame counter.
    pub fn process_frame(
        &self,
        raw: &[RawDetection],
        class_names: &[String],
        frame_width: u32,
        frame_height: u32,
        inference_time: Duration,
    ) -> FrameResult {
        let frame_count = self.frame_count.fetch_add(1, Ordering::Relaxed) + 1;
        let frame_area = frame_width as i64 * frame_height as i64;

        // model confidences are f32; the config ratio stays f64 for the wire
        let kept = normalize::filter_detections(
            raw,
            self.config.confidence_threshold as f32,
            self.config.max_detections,
        );

        let mut detections = Vec::with_capacity(kept.len());
        let mut alerts = Vec::new();
        let mut objects = Vec::new();

        for raw_det in &kept {
            let Some(class_name) = class_names.get(raw_det.class_id) else {
                log::warn!(
                    "frame {}: dropping detection with unknown class id {}",
                    frame_count,
                    raw_det.class_id
                );
                continue;
            };

            let bbox = raw_det.bbox();
            let distance = match classify_distance(
                class_name,
                bbox.area(),
                frame_area,
                &self.config.class_thresholds,
                self.config.default_threshold,
            ) {
                Ok(distance) => distance,
                Err(err) => {
                    log::warn!("frame {}: dropping '{}': {}", frame_count, class_name, err);
                    continue;
                }
            };
            let position = classify_position(
                bbox.x1,
                bbox.x2,
                frame_width,
                self.config.center_threshold,
            );
            let is_priority = self.config.priority_classes.contains(class_name.as_str());

            objects.push(class_name.clone());

            if is_priority && self.cooldowns.should_announce(class_name, Instant::now()) {
                alerts.push(format!(
                    "Warning! {} {} {}",
                    class_name,
                    distance.phrase(),
                    position.phrase()
                ));
            }

            detections.push(Detection {
                class_name: class_name.clone(),
                confidence: raw_det.confidence,
                position,
                distance,
                is_priority,
                bbox,
            });
        }

        let alert = alerts.first().cloned().unwrap_or_default();
        if !detections.is_empty() {
            log::debug!("frame {}: {} objects detected", frame_count, detections.len());
        }

        FrameResult {
            alert,
            alerts,
            objects,
            detections,
            frame_width,
            frame_height,
            frame_count,
            inference_time: round_ms(inference_time.as_secs_f64() * 1000.0),
            timestamp: now_rfc3339(),
            processing_time: None,
            error: None,
        }
    }
}
