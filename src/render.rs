//! Frame annotation and forwarding.
//!
//! Detections are drawn as one-pixel white outlines, then the whole frame is
//! forwarded to a byte sink as raw RGB24, one write plus flush per frame so a
//! downstream consumer sees complete frames promptly.

use std::io::Write;

use anyhow::{Context, Result};

use crate::decode::BoundingBox;
use crate::frame::Frame;

/// Outline color for detection boxes.
pub const BOX_COLOR: [u8; 3] = [255, 255, 255];

/// Draw every box onto the frame.
pub fn annotate(frame: &mut Frame, boxes: &[BoundingBox]) {
    for bbox in boxes {
        draw_outline(frame, bbox);
    }
}

fn draw_outline(frame: &mut Frame, bbox: &BoundingBox) {
    let max_x = frame.width.saturating_sub(1) as i32;
    let max_y = frame.height.saturating_sub(1) as i32;
    if bbox.x_max < 0 || bbox.y_max < 0 || bbox.x_min > max_x || bbox.y_min > max_y {
        return;
    }
    // Boxes can poke past the frame; clamp the outline to the border.
    let x0 = bbox.x_min.clamp(0, max_x) as u32;
    let x1 = bbox.x_max.clamp(0, max_x) as u32;
    let y0 = bbox.y_min.clamp(0, max_y) as u32;
    let y1 = bbox.y_max.clamp(0, max_y) as u32;

    for x in x0..=x1 {
        frame.set_pixel(x, y0, BOX_COLOR);
        frame.set_pixel(x, y1, BOX_COLOR);
    }
    for y in y0..=y1 {
        frame.set_pixel(x0, y, BOX_COLOR);
        frame.set_pixel(x1, y, BOX_COLOR);
    }
}

/// Forwards annotated frames to a byte sink.
pub struct FrameWriter<W: Write> {
    sink: W,
    frames_written: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            frames_written: 0,
        }
    }

    /// Write one frame's raw bytes and flush.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.sink
            .write_all(frame.data())
            .context("write frame bytes")?;
        self.sink.flush().context("flush frame sink")?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    fn black_frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![0u8; (width * height * 3) as usize], width, height).unwrap()
    }

    #[test]
    fn outline_touches_corners_and_leaves_interior() {
        let mut frame = black_frame(10, 10);
        annotate(
            &mut frame,
            &[BoundingBox {
                x_min: 2,
                y_min: 3,
                x_max: 7,
                y_max: 8,
            }],
        );
        assert_eq!(frame.pixel(2, 3), Some(BOX_COLOR));
        assert_eq!(frame.pixel(7, 3), Some(BOX_COLOR));
        assert_eq!(frame.pixel(2, 8), Some(BOX_COLOR));
        assert_eq!(frame.pixel(7, 8), Some(BOX_COLOR));
        assert_eq!(frame.pixel(5, 3), Some(BOX_COLOR));
        assert_eq!(frame.pixel(2, 5), Some(BOX_COLOR));
        // Interior stays untouched.
        assert_eq!(frame.pixel(5, 5), Some([0, 0, 0]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
    }

    #[test]
    fn oversized_box_is_clamped_to_the_border() {
        let mut frame = black_frame(6, 6);
        annotate(
            &mut frame,
            &[BoundingBox {
                x_min: -3,
                y_min: -3,
                x_max: 9,
                y_max: 9,
            }],
        );
        assert_eq!(frame.pixel(0, 0), Some(BOX_COLOR));
        assert_eq!(frame.pixel(5, 5), Some(BOX_COLOR));
        assert_eq!(frame.pixel(3, 0), Some(BOX_COLOR));
        assert_eq!(frame.pixel(3, 3), Some([0, 0, 0]));
    }

    #[test]
    fn box_entirely_outside_draws_nothing() {
        let mut frame = black_frame(4, 4);
        annotate(
            &mut frame,
            &[BoundingBox {
                x_min: -9,
                y_min: -9,
                x_max: -5,
                y_max: -5,
            }],
        );
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn writer_forwards_raw_bytes_per_frame() {
        let frame = black_frame(2, 2);
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(&frame).unwrap();
        writer.write_frame(&frame).unwrap();
        assert_eq!(writer.frames_written(), 2);
        assert_eq!(writer.sink.len(), 2 * frame.byte_len());
    }

    #[test]
    fn writer_flushes_through_to_a_file() {
        let mut frame = black_frame(3, 2);
        frame.set_pixel(0, 0, [9, 8, 7]);
        let file = tempfile::tempfile().expect("tempfile");
        let mut writer = FrameWriter::new(file);
        writer.write_frame(&frame).unwrap();

        let mut file = writer.sink;
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, frame.data());
    }
}
