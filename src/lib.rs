//! sightguard - detection alerting engine for visual-assistance clients.
//!
//! Converts per-frame object-detection output into spatial/distance
//! classifications and a temporally deduplicated stream of priority safety
//! alerts ("Warning! person at medium distance to the left").
//!
//! # Module Structure
//!
//! - `engine`: normalization, spatial/distance classification, cooldown
//!   gating, and per-frame aggregation
//! - `detect`: the model-runner boundary (`DetectorBackend`) plus the stub
//!   backend used by tests and demos
//! - `api`: HTTP transport for the concurrent-request shape
//! - `speech`: alert queue + worker for the single-loop shape
//! - `config`: policy configuration with file/env layering
//!
//! Two deployment shapes share the one engine: `alertd` serves frames over
//! HTTP, `webcam_alert` runs a local capture loop with spoken alerts.

pub mod api;
pub mod config;
pub mod detect;
pub mod engine;
pub mod speech;

pub use config::{AlertdConfig, EngineConfig};
pub use detect::{BackendRegistry, DetectorBackend, ModelOutput, RawDetection, StubBackend};
pub use engine::{
    classify_distance, classify_position, BoundingBox, CooldownTracker, Detection, Distance,
    Engine, FrameResult, Position,
};
pub use speech::{EspeakSink, LogSink, SpeechQueue, SpeechSink};
