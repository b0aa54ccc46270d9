//! Model input preparation.
//!
//! Detection models here take a single-batch planar float tensor (NCHW).
//! Frames arrive as packed RGB24 at whatever resolution the source delivers,
//! so preparation is a bilinear resize to the model's spatial size followed by
//! a channel deinterleave. Pixel values pass through as raw 0..=255 floats;
//! the supported models carry their own normalisation in-graph.

use std::fmt;

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

use crate::frame::Frame;

/// Why a model's reported input shape cannot be fed from RGB24 frames.
///
/// The pipeline only drives models whose input is exactly
/// `(batch=1, channels=3, height, width)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShapeError {
    /// Input rank is not 4.
    Rank { dims: Vec<usize> },
    /// Batch dimension is not 1.
    Batch { batch: usize },
    /// Channel dimension is not 3.
    Channels { channels: usize },
    /// Height or width is 0.
    EmptySpatial { height: usize, width: usize },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::Rank { dims } => {
                write!(f, "model input must be rank 4 (1, C, H, W), got {:?}", dims)
            }
            ShapeError::Batch { batch } => {
                write!(f, "model input batch dimension must be 1, got {}", batch)
            }
            ShapeError::Channels { channels } => write!(
                f,
                "model input channel dimension must be 3 for RGB frames, got {}",
                channels
            ),
            ShapeError::EmptySpatial { height, width } => {
                write!(f, "model input spatial size {}x{} is empty", width, height)
            }
        }
    }
}

impl std::error::Error for ShapeError {}

/// Validated `(channels, height, width)` of a model input blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TensorShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

/// Turns frames into model input tensors for one fixed input shape.
#[derive(Clone, Debug)]
pub struct Preprocessor {
    shape: TensorShape,
}

impl Preprocessor {
    /// Validate a model's reported input dimensions and build a preprocessor
    /// for them. `dims` is the raw shape as the engine reports it, batch
    /// dimension first.
    pub fn for_model(dims: &[usize]) -> Result<Self, ShapeError> {
        if dims.len() != 4 {
            return Err(ShapeError::Rank {
                dims: dims.to_vec(),
            });
        }
        let (batch, channels, height, width) = (dims[0], dims[1], dims[2], dims[3]);
        if batch != 1 {
            return Err(ShapeError::Batch { batch });
        }
        if channels != 3 {
            return Err(ShapeError::Channels { channels });
        }
        if height == 0 || width == 0 {
            return Err(ShapeError::EmptySpatial { height, width });
        }
        Ok(Self {
            shape: TensorShape {
                channels,
                height,
                width,
            },
        })
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    /// Produce the `(1, 3, H, W)` input tensor for one frame.
    ///
    /// Frames already at the model's spatial size skip the resize. Everything
    /// else goes through bilinear interpolation, which downscales photographic
    /// content without ringing.
    pub fn prepare(&self, frame: &Frame) -> Result<Array4<f32>> {
        let (th, tw) = (self.shape.height, self.shape.width);
        let resized;
        let pixels: &[u8] = if frame.height as usize == th && frame.width as usize == tw {
            frame.data()
        } else {
            let img = RgbImage::from_raw(frame.width, frame.height, frame.data().to_vec())
                .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
            resized = imageops::resize(&img, tw as u32, th as u32, FilterType::Triangle);
            resized.as_raw()
        };

        // Deinterleave HWC bytes into a planar CHW tensor with a unit batch.
        Ok(Array4::from_shape_fn(
            (1, self.shape.channels, th, tw),
            |(_, channel, y, x)| pixels[(y * tw + x) * 3 + channel] as f32,
        ))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
