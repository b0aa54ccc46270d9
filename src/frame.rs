//! Frame container shared by capture, preprocessing, and rendering.
//!
//! A `Frame` is a packed RGB24 pixel buffer with its dimensions. Capture
//! produces one per iteration, preprocessing reads it, rendering draws on it
//! and forwards the bytes downstream. Frames are transient: the driver holds
//! exactly one for the duration of a single pipeline iteration.

use anyhow::{anyhow, Result};

/// Bytes per pixel for packed RGB24.
pub const BYTES_PER_PIXEL: usize = 3;

/// A single video frame: packed RGB24 rows, top to bottom.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap a packed RGB24 buffer. The buffer length must be exactly
    /// `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(BYTES_PER_PIXEL))
            .ok_or_else(|| anyhow!("frame dimensions {}x{} overflow", width, height))?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} RGB24",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Packed RGB24 bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Read one pixel. Returns `None` outside the frame bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Write one pixel. Writes outside the frame bounds are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.data[idx..idx + BYTES_PER_PIXEL].copy_from_slice(&rgb);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_wrong_buffer_length() {
        let err = Frame::new(vec![0u8; 10], 4, 4).unwrap_err();
        assert!(format!("{err}").contains("expected 48"));
    }

    #[test]
    fn new_accepts_exact_buffer() {
        let frame = Frame::new(vec![0u8; 4 * 4 * 3], 4, 4).unwrap();
        assert_eq!(frame.width, 4);
        assert_eq!(frame.height, 4);
        assert_eq!(frame.byte_len(), 48);
    }

    #[test]
    fn pixel_round_trip() {
        let mut frame = Frame::new(vec![0u8; 8 * 4 * 3], 8, 4).unwrap();
        frame.set_pixel(7, 3, [1, 2, 3]);
        assert_eq!(frame.pixel(7, 3), Some([1, 2, 3]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
    }

    #[test]
    fn out_of_bounds_pixel_access_is_ignored() {
        let mut frame = Frame::new(vec![0u8; 2 * 2 * 3], 2, 2).unwrap();
        frame.set_pixel(5, 5, [9, 9, 9]);
        assert_eq!(frame.pixel(5, 5), None);
        assert!(frame.data().iter().all(|&b| b == 0));
    }
}
