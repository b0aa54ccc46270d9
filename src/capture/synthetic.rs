//! Synthetic frame source for `stub://` URLs.
//!
//! Generates a deterministic moving pattern, so the same URL always yields
//! the same stream. The scene shifts every 50 frames to give downstream
//! stages something that changes on a human-ish timescale.

use anyhow::{anyhow, bail, Context, Result};

use crate::capture::STUB_SCHEME;
use crate::frame::Frame;

/// Frames produced when the URL does not say otherwise. 250 frames is ten
/// seconds of video at 25 fps.
const DEFAULT_FRAME_LIMIT: u64 = 250;

pub(crate) struct SyntheticSource {
    width: u32,
    height: u32,
    frame_limit: u64,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    /// Parse `stub://<name>?frames=N&width=W&height=H`. The name itself is
    /// free-form; only the options matter.
    pub(crate) fn open(url: &str, default_width: u32, default_height: u32) -> Result<Self> {
        let rest = url
            .strip_prefix(STUB_SCHEME)
            .ok_or_else(|| anyhow!("not a stub URL: {}", url))?;
        let (_, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut width = default_width;
        let mut height = default_height;
        let mut frame_limit = DEFAULT_FRAME_LIMIT;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed capture option: {}", pair))?;
            match key {
                "frames" => frame_limit = value.parse().context("invalid frames")?,
                "width" => width = value.parse().context("invalid width")?,
                "height" => height = value.parse().context("invalid height")?,
                other => bail!("unknown capture option: {}", other),
            }
        }
        if width == 0 || height == 0 {
            bail!("synthetic frame size {}x{} is empty", width, height);
        }

        log::info!(
            "capture connected: {} (synthetic, {}x{}, {} frames)",
            url,
            width,
            height,
            frame_limit
        );
        Ok(Self {
            width,
            height,
            frame_limit,
            frame_count: 0,
            scene_state: 0,
        })
    }

    pub(crate) fn next(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.frame_limit {
            return Ok(None);
        }
        self.frame_count += 1;
        if self.frame_count.is_multiple_of(50) {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let pixel_count = (self.width as usize) * (self.height as usize) * 3;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            // Mix position, frame count, and scene state for variation.
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }

        Ok(Some(Frame::new(pixels, self.width, self.height)?))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_url_yields_the_same_stream() {
        let mut a = SyntheticSource::open("stub://people?frames=2&width=4&height=4", 0, 0).unwrap();
        let mut b = SyntheticSource::open("stub://people?frames=2&width=4&height=4", 0, 0).unwrap();
        let fa = a.next().unwrap().unwrap();
        let fb = b.next().unwrap().unwrap();
        assert_eq!(fa.data(), fb.data());
    }

    #[test]
    fn scene_shifts_after_fifty_frames() {
        let mut source =
            SyntheticSource::open("stub://people?frames=60&width=2&height=2", 0, 0).unwrap();
        let mut frames = Vec::new();
        for _ in 0..51 {
            frames.push(source.next().unwrap().unwrap());
        }
        // Frames 48 and 49 differ only by the +1 frame counter; frame 50
        // additionally carries the scene bump.
        let step_48_49 = frames[48].data()[0].wrapping_sub(frames[47].data()[0]);
        let step_49_50 = frames[49].data()[0].wrapping_sub(frames[48].data()[0]);
        assert_eq!(step_48_49, 1);
        assert_eq!(step_49_50, 2);
    }

    #[test]
    fn defaults_apply_when_the_url_has_no_options() {
        let mut source = SyntheticSource::open("stub://people", 6, 4).unwrap();
        let frame = source.next().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (6, 4));
    }
}
