//! Detection output decoding.
//!
//! SSD-style person detectors emit a flat tensor of fixed-stride rows:
//! `[image_id, label, confidence, x_min, y_min, x_max, y_max]` with corner
//! coordinates normalised to `0.0..=1.0`. Decoding is a plain threshold
//! filter plus a scale to pixel space. Rows are kept in tensor order and
//! overlapping boxes all pass; there is no non-max suppression and no
//! per-class filtering. Occupancy counting downstream relies on that: the
//! per-frame person count is simply the number of boxes decoded.

use anyhow::{bail, Result};
use ndarray::Array2;

/// Fields per detection row in the model output.
pub const FIELDS_PER_ROW: usize = 7;

/// One raw output row, still in normalised coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionRow {
    pub image_id: f32,
    pub label: f32,
    pub confidence: f32,
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

/// A detection mapped to integer pixel corners of a specific frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

/// The raw model output: N rows of [`FIELDS_PER_ROW`] floats.
#[derive(Clone, Debug)]
pub struct DetectionTensor {
    rows: Array2<f32>,
}

impl DetectionTensor {
    /// Build a tensor from explicit rows. Mainly used by the stub backend
    /// and tests.
    pub fn from_rows(rows: &[[f32; FIELDS_PER_ROW]]) -> Self {
        let mut array = Array2::zeros((rows.len(), FIELDS_PER_ROW));
        for (i, row) in rows.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                array[[i, j]] = *value;
            }
        }
        Self { rows: array }
    }

    /// Wrap a backend's output array. The column count must match the
    /// detection row stride.
    pub fn from_array(rows: Array2<f32>) -> Result<Self> {
        if rows.ncols() != FIELDS_PER_ROW {
            bail!(
                "detection output has {} columns per row, expected {}",
                rows.ncols(),
                FIELDS_PER_ROW
            );
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.nrows() == 0
    }

    /// Rows in tensor order.
    pub fn rows(&self) -> impl Iterator<Item = DetectionRow> + '_ {
        self.rows.outer_iter().map(|row| DetectionRow {
            image_id: row[0],
            label: row[1],
            confidence: row[2],
            x_min: row[3],
            y_min: row[4],
            x_max: row[5],
            y_max: row[6],
        })
    }
}

/// Filter rows by confidence and scale the survivors to pixel corners.
///
/// The threshold comparison is inclusive: a row at exactly the threshold
/// passes. Scaling truncates toward zero, matching integer pixel indexing.
/// The returned iterator is lazy and preserves tensor order; calling `decode`
/// again on the same tensor restarts from the first row.
pub fn decode(
    tensor: &DetectionTensor,
    threshold: f32,
    frame_width: u32,
    frame_height: u32,
) -> impl Iterator<Item = BoundingBox> + '_ {
    let (w, h) = (frame_width as f32, frame_height as f32);
    tensor
        .rows()
        .filter(move |row| row.confidence >= threshold)
        .map(move |row| BoundingBox {
            x_min: (row.x_min * w) as i32,
            y_min: (row.y_min * h) as i32,
            x_max: (row.x_max * w) as i32,
            y_max: (row.y_max * h) as i32,
        })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
