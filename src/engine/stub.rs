//! Deterministic stub backend.
//!
//! `stub://` model URLs drive the whole pipeline without model files or an
//! inference runtime:
//!
//! - `stub://idle` never detects anyone
//! - `stub://person-flow` simulates people drifting through the scene: the
//!   visible count steps 0, 1, 2 in fixed blocks of requests
//! - `stub://unsupported-layer` fails to load, for exercising the fatal
//!   startup path
//!
//! Append `?latency_ms=N` to make every request take that long; poll
//! timeout handling is tested that way.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use ndarray::Array4;

use crate::decode::{DetectionTensor, FIELDS_PER_ROW};
use crate::engine::{ModelBackend, UnsupportedLayerError};

/// URL prefix that routes model loading to the stub.
pub const STUB_SCHEME: &str = "stub://";

/// Input shape the stub reports, sized like common SSD person detectors.
const DEFAULT_INPUT_DIMS: [usize; 4] = [1, 3, 320, 544];

/// Requests per step of the person-flow pattern. Slow enough that the
/// simulated count rides through debounce windows intact.
const FLOW_BLOCK: u64 = 25;

/// One synthetic detection in normalised coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StubDetection {
    pub confidence: f32,
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl StubDetection {
    /// A person-shaped box in the middle of the frame.
    pub fn person(confidence: f32) -> Self {
        Self::at(confidence, 0.4, 0.2, 0.6, 0.9)
    }

    pub fn at(confidence: f32, x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            confidence,
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    fn as_row(&self) -> [f32; FIELDS_PER_ROW] {
        [
            0.0,
            1.0,
            self.confidence,
            self.x_min,
            self.y_min,
            self.x_max,
            self.y_max,
        ]
    }
}

enum StubMode {
    Idle,
    PersonFlow { calls: u64 },
    Scripted { frames: VecDeque<Vec<StubDetection>> },
}

/// Backend that fabricates detections instead of running a model.
pub struct StubBackend {
    dims: Vec<usize>,
    mode: StubMode,
    latency_ms: Arc<AtomicU64>,
}

impl StubBackend {
    pub fn from_url(url: &str, device: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(STUB_SCHEME)
            .ok_or_else(|| anyhow!("not a stub URL: {}", url))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut latency = Duration::ZERO;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub option: {}", pair))?;
            match key {
                "latency_ms" => {
                    let ms: u64 = value.parse().context("invalid latency_ms")?;
                    latency = Duration::from_millis(ms);
                }
                other => bail!("unknown stub option: {}", other),
            }
        }

        let mode = match name {
            "idle" | "" => StubMode::Idle,
            "person-flow" => StubMode::PersonFlow { calls: 0 },
            "unsupported-layer" => {
                return Err(anyhow::Error::new(UnsupportedLayerError {
                    device: device.to_string(),
                    layers: vec!["StubOp".to_string()],
                }))
            }
            other => bail!("unknown stub model: {}", other),
        };

        Ok(Self {
            dims: DEFAULT_INPUT_DIMS.to_vec(),
            mode,
            latency_ms: Arc::new(AtomicU64::new(0)),
        }
        .with_latency(latency))
    }

    /// A backend that replays the given per-request detection lists in order,
    /// then reports empty results.
    pub fn scripted(dims: &[usize], frames: Vec<Vec<StubDetection>>) -> Self {
        Self {
            dims: dims.to_vec(),
            mode: StubMode::Scripted {
                frames: frames.into(),
            },
            latency_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
        self
    }

    /// Shared handle to the per-request latency, adjustable while the
    /// backend is running on its worker thread.
    pub fn latency_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.latency_ms)
    }

    fn flow_detections(calls: u64) -> Vec<StubDetection> {
        let visible = ((calls / FLOW_BLOCK) % 3) as usize;
        (0..visible)
            .map(|i| {
                let offset = 0.3 * i as f32;
                StubDetection::at(0.9, 0.05 + offset, 0.2, 0.25 + offset, 0.9)
            })
            .collect()
    }
}

impl ModelBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_dims(&self) -> Vec<usize> {
        self.dims.clone()
    }

    fn infer(&mut self, input: Array4<f32>) -> Result<DetectionTensor> {
        if input.shape() != self.dims.as_slice() {
            bail!(
                "input shape {:?} does not match model input {:?}",
                input.shape(),
                self.dims
            );
        }
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            thread::sleep(Duration::from_millis(latency));
        }

        let detections = match &mut self.mode {
            StubMode::Idle => Vec::new(),
            StubMode::PersonFlow { calls } => {
                let out = Self::flow_detections(*calls);
                *calls += 1;
                out
            }
            StubMode::Scripted { frames } => frames.pop_front().unwrap_or_default(),
        };
        let rows: Vec<[f32; FIELDS_PER_ROW]> =
            detections.iter().map(StubDetection::as_row).collect();
        Ok(DetectionTensor::from_rows(&rows))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn default_input() -> Array4<f32> {
        Array4::zeros((1, 3, 320, 544))
    }

    #[test]
    fn idle_stub_never_detects() {
        let mut backend = StubBackend::from_url("stub://idle", "CPU").unwrap();
        assert_eq!(backend.input_dims(), DEFAULT_INPUT_DIMS.to_vec());
        for _ in 0..3 {
            assert!(backend.infer(default_input()).unwrap().is_empty());
        }
    }

    #[test]
    fn person_flow_steps_through_counts() {
        let mut backend = StubBackend::from_url("stub://person-flow", "CPU").unwrap();
        let lens: Vec<usize> = (0..75)
            .map(|_| backend.infer(default_input()).unwrap().len())
            .collect();
        assert_eq!(lens[0], 0);
        assert_eq!(lens[24], 0);
        assert_eq!(lens[25], 1);
        assert_eq!(lens[49], 1);
        assert_eq!(lens[50], 2);
        assert_eq!(lens[74], 2);
    }

    #[test]
    fn scripted_frames_replay_in_order_then_empty() {
        let mut backend = StubBackend::scripted(
            &[1, 3, 4, 4],
            vec![vec![StubDetection::person(0.9)], vec![]],
        );
        let input = || Array4::zeros((1, 3, 4, 4));
        assert_eq!(backend.infer(input()).unwrap().len(), 1);
        assert_eq!(backend.infer(input()).unwrap().len(), 0);
        assert_eq!(backend.infer(input()).unwrap().len(), 0);
    }

    #[test]
    fn mismatched_input_shape_is_rejected() {
        let mut backend = StubBackend::scripted(&[1, 3, 4, 4], vec![]);
        let err = backend.infer(default_input()).unwrap_err();
        assert!(format!("{err}").contains("does not match"));
    }

    #[test]
    fn url_options_are_validated() {
        assert!(StubBackend::from_url("stub://idle?latency_ms=5", "CPU").is_ok());
        assert!(StubBackend::from_url("stub://idle?latency_ms=abc", "CPU").is_err());
        assert!(StubBackend::from_url("stub://idle?bogus=1", "CPU").is_err());
        assert!(StubBackend::from_url("stub://no-such-model", "CPU").is_err());
    }

    #[test]
    fn latency_handle_slows_requests_after_spawn() {
        let backend = StubBackend::scripted(&[1, 3, 4, 4], vec![]);
        let latency = backend.latency_handle();
        let mut backend = backend;
        latency.store(40, Ordering::Relaxed);
        let started = Instant::now();
        backend.infer(Array4::zeros((1, 3, 4, 4))).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
