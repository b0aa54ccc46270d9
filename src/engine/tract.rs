#![cfg(feature = "backend-tract")]

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array2, Array4};
use tract_onnx::prelude::*;

use crate::decode::{DetectionTensor, FIELDS_PER_ROW};
use crate::engine::{EngineConfig, ModelBackend, UnsupportedLayerError};

/// Tract-based backend for ONNX person detection models.
///
/// Loads a local model file and runs it on the CPU. The model must have a
/// fixed input shape and emit SSD-style detection rows.
pub struct TractBackend {
    plan: TypedSimplePlan<TypedModel>,
    dims: Vec<usize>,
}

impl TractBackend {
    pub fn load(config: &EngineConfig) -> Result<Self> {
        if config.device != "CPU" {
            log::warn!(
                "tract backend runs on CPU; requested device {} is ignored",
                config.device
            );
        }
        if let Some(extension) = &config.cpu_extension {
            log::warn!(
                "cpu extension {} is not loadable by the tract backend; continuing without it",
                extension.display()
            );
        }

        let typed = tract_onnx::onnx()
            .model_for_path(&config.model)
            .with_context(|| format!("failed to load ONNX model from {}", config.model))?
            .into_optimized()
            .map_err(|e| optimize_failure(config, e))?;
        let fact = typed.input_fact(0).context("model has no input")?;
        let dims = fact
            .shape
            .as_concrete()
            .map(|dims| dims.to_vec())
            .ok_or_else(|| {
                anyhow!("model input shape is not fixed; re-export the model with concrete dims")
            })?;
        let plan = typed
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!("Loaded {} (input {:?})", config.model, dims);
        Ok(Self { plan, dims })
    }
}

/// A model tract cannot optimize for the CPU is the moral equivalent of a
/// device missing operator support: surface it as such unless an extension
/// was supplied, in which case the failure is its own diagnosis.
fn optimize_failure(config: &EngineConfig, err: anyhow::Error) -> anyhow::Error {
    if config.cpu_extension.is_some() {
        return err.context("model optimization failed even with a cpu extension supplied");
    }
    anyhow::Error::new(UnsupportedLayerError {
        device: config.device.clone(),
        layers: vec![format!("{err:#}")],
    })
}

impl ModelBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_dims(&self) -> Vec<usize> {
        self.dims.clone()
    }

    fn infer(&mut self, input: Array4<f32>) -> Result<DetectionTensor> {
        let (b, c, h, w) = input.dim();
        let data = input
            .as_slice()
            .ok_or_else(|| anyhow!("input tensor is not contiguous"))?;
        let tensor = Tensor::from_shape(&[b, c, h, w], data)?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let values = output
            .as_slice::<f32>()
            .context("model output tensor was not f32")?;
        if values.len() % FIELDS_PER_ROW != 0 {
            bail!(
                "model output length {} is not a whole number of detection rows",
                values.len()
            );
        }
        let rows = Array2::from_shape_vec(
            (values.len() / FIELDS_PER_ROW, FIELDS_PER_ROW),
            values.to_vec(),
        )?;
        DetectionTensor::from_array(rows)
    }
}
