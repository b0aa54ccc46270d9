//! People counter pipeline.
//!
//! Per-frame flow: capture -> preprocess -> inference -> decode -> track ->
//! publish -> render. The crate is organized along that flow:
//!
//! - `capture`: frame sources (synthetic `stub://` streams, ffmpeg files, CAM)
//! - `preprocess`: frame-to-tensor conversion for the model input
//! - `engine`: inference backends behind the `ModelBackend` trait
//! - `session`: the single in-flight request lifecycle (submit/poll/fetch)
//! - `decode`: detection tensor rows to pixel-space bounding boxes
//! - `track`: the occupancy state machine (debounced edges, totals, dwell)
//! - `telemetry`: event wire format and MQTT publishing
//! - `render`: frame annotation and raw byte forwarding
//! - `pipeline`: the driver that runs one frame at a time through all of it
//!
//! Counting is intentionally identity-free: only the number of detections
//! above threshold per frame feeds the tracker. There is no cross-frame
//! object identity and no non-max suppression.

pub mod capture;
pub mod decode;
pub mod engine;
pub mod frame;
pub mod pipeline;
pub mod preprocess;
pub mod render;
pub mod session;
pub mod telemetry;
pub mod track;

pub use capture::{CaptureConfig, CaptureSource, CaptureStats};
pub use decode::{decode, BoundingBox, DetectionRow, DetectionTensor};
pub use engine::{
    open_backend, EngineConfig, ModelBackend, PollStatus, StubBackend, StubDetection,
    UnsupportedLayerError,
};
pub use frame::Frame;
pub use pipeline::{PipelineConfig, PipelineDriver, RunSummary, StopReason};
pub use preprocess::{Preprocessor, ShapeError, TensorShape};
pub use render::{annotate, FrameWriter};
pub use session::{InferenceSession, RequestHandle, SessionError};
pub use telemetry::{
    MemorySink, MqttPublisher, PERSON_DURATION_TOPIC, PERSON_TOPIC, TelemetryConfig,
    TelemetryEvent, TelemetrySink,
};
pub use track::{DEFAULT_DEBOUNCE_WINDOW, OccupancyState, OccupancyTracker};
