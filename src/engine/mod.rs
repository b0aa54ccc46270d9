//! Inference backends.
//!
//! A backend loads a detection model once and then runs one input tensor at
//! a time. The pipeline talks to it through [`ModelBackend`] so the same
//! driver runs against the real model runtime or a deterministic stub:
//!
//! - `stub://` model URLs resolve to [`StubBackend`] (no model files needed)
//! - anything else loads through tract when built with `backend-tract`
//!
//! Backend selection happens once at startup and load failures are fatal.
//! A model whose operators the target device cannot execute surfaces as
//! [`UnsupportedLayerError`] so the caller can report the offending layers
//! and refuse to start.

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use ndarray::Array4;

use crate::decode::DetectionTensor;

pub(crate) mod runner;
mod stub;
#[cfg(feature = "backend-tract")]
mod tract;

pub use stub::{StubBackend, StubDetection, STUB_SCHEME};
#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// How a model is loaded: where from, for which device, with an optional
/// device extension library.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Model path, or a `stub://` URL.
    pub model: String,
    /// Target device name. Only `CPU` is meaningful to the bundled backends.
    pub device: String,
    /// Extension library for devices that need extra operator support.
    pub cpu_extension: Option<PathBuf>,
}

impl EngineConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            device: "CPU".to_string(),
            cpu_extension: None,
        }
    }
}

/// Completion state of an in-flight request after a bounded wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollStatus {
    Ready,
    TimedOut,
}

/// The target device cannot execute some of the model's operators and no
/// extension library was supplied to fill the gap.
#[derive(Clone, Debug)]
pub struct UnsupportedLayerError {
    pub device: String,
    pub layers: Vec<String>,
}

impl fmt::Display for UnsupportedLayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "layers not supported by device {}: {}",
            self.device,
            self.layers.join(", ")
        )
    }
}

impl std::error::Error for UnsupportedLayerError {}

/// A loaded detection model.
///
/// `infer` runs a single request to completion; the session layer owns the
/// thread it runs on and the submit/poll/fetch lifecycle around it.
pub trait ModelBackend: Send {
    fn name(&self) -> &'static str;

    /// Input tensor dimensions as the model reports them, batch first.
    fn input_dims(&self) -> Vec<usize>;

    /// Run one input through the model.
    fn infer(&mut self, input: Array4<f32>) -> Result<DetectionTensor>;
}

impl fmt::Debug for dyn ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBackend")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Resolve a config to a concrete backend.
pub fn open_backend(config: &EngineConfig) -> Result<Box<dyn ModelBackend>> {
    if config.model.starts_with(STUB_SCHEME) {
        let backend = StubBackend::from_url(&config.model, &config.device)?;
        return Ok(Box::new(backend));
    }

    #[cfg(feature = "backend-tract")]
    {
        tract::TractBackend::load(config).map(|b| Box::new(b) as Box<dyn ModelBackend>)
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        Err(anyhow::anyhow!(
            "no inference backend compiled in for model {}; rebuild with --features backend-tract or use a stub:// model",
            config.model
        ))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_cpu() {
        let config = EngineConfig::new("model.onnx");
        assert_eq!(config.device, "CPU");
        assert!(config.cpu_extension.is_none());
    }

    #[test]
    fn stub_urls_resolve_without_model_files() {
        let backend = open_backend(&EngineConfig::new("stub://idle")).unwrap();
        assert_eq!(backend.name(), "stub");
        assert_eq!(backend.input_dims().len(), 4);
    }

    #[test]
    fn unsupported_layer_stub_surfaces_the_typed_error() {
        let err = open_backend(&EngineConfig::new("stub://unsupported-layer")).unwrap_err();
        let layer_err = err
            .downcast_ref::<UnsupportedLayerError>()
            .expect("should carry UnsupportedLayerError");
        assert_eq!(layer_err.device, "CPU");
        assert!(!layer_err.layers.is_empty());
    }

    #[test]
    fn unsupported_layer_error_lists_layers() {
        let err = UnsupportedLayerError {
            device: "CPU".to_string(),
            layers: vec!["Mish".to_string(), "Swish".to_string()],
        };
        let text = format!("{err}");
        assert!(text.contains("CPU"));
        assert!(text.contains("Mish, Swish"));
    }
}
