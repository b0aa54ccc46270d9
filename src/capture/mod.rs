//! Frame sources.
//!
//! A [`CaptureSource`] produces RGB24 frames until the stream ends:
//!
//! - `stub://` URLs generate synthetic frames, with the frame count and
//!   dimensions controllable from the URL (`stub://people?frames=10`)
//! - file paths decode through FFmpeg when built with `ingest-file-ffmpeg`
//! - the literal `CAM` maps to the default camera device
//!
//! `read` returns `Ok(None)` at end of stream. `release` closes the source
//! early and is idempotent; reads after release also return `Ok(None)`.

use std::fmt;

use anyhow::Result;

use crate::frame::Frame;

#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
mod synthetic;

#[cfg(feature = "ingest-file-ffmpeg")]
use file_ffmpeg::FfmpegFileSource;
use synthetic::SyntheticSource;

/// URL prefix that routes capture to the synthetic source.
pub const STUB_SCHEME: &str = "stub://";

/// Input sentinel for the default camera.
pub const CAM_SENTINEL: &str = "CAM";

#[cfg(feature = "ingest-file-ffmpeg")]
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

/// Where frames come from and, for synthetic sources, their geometry.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// File path, `CAM`, or a `stub://` URL.
    pub source: String,
    /// Synthetic frame width. Real sources deliver their native size.
    pub width: u32,
    /// Synthetic frame height.
    pub height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: format!("{}people", STUB_SCHEME),
            width: 640,
            height: 360,
        }
    }
}

impl CaptureConfig {
    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }
}

/// Counters for shutdown reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_delivered: u64,
    pub source: String,
}

enum CaptureBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    File(FfmpegFileSource),
    Closed,
}

/// A stream of frames from one configured source.
pub struct CaptureSource {
    backend: CaptureBackend,
    source: String,
    frames_delivered: u64,
}

impl fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSource")
            .field("source", &self.source)
            .field("frames_delivered", &self.frames_delivered)
            .finish_non_exhaustive()
    }
}

impl CaptureSource {
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        if config.source.starts_with(STUB_SCHEME) {
            let synthetic = SyntheticSource::open(&config.source, config.width, config.height)?;
            return Ok(Self {
                backend: CaptureBackend::Synthetic(synthetic),
                source: config.source.clone(),
                frames_delivered: 0,
            });
        }

        let path = if config.source == CAM_SENTINEL {
            default_camera_path()
        } else {
            config.source.clone()
        };
        Self::open_path(&config.source, &path)
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    fn open_path(source: &str, path: &str) -> Result<Self> {
        let file = FfmpegFileSource::open(path)?;
        Ok(Self {
            backend: CaptureBackend::File(file),
            source: source.to_string(),
            frames_delivered: 0,
        })
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    fn open_path(source: &str, path: &str) -> Result<Self> {
        let _ = source;
        anyhow::bail!(
            "opening {} requires the ingest-file-ffmpeg feature; use a stub:// source instead",
            path
        )
    }

    /// Next frame, or `Ok(None)` once the stream is exhausted or released.
    pub fn read(&mut self) -> Result<Option<Frame>> {
        let frame = match &mut self.backend {
            CaptureBackend::Synthetic(source) => source.next()?,
            #[cfg(feature = "ingest-file-ffmpeg")]
            CaptureBackend::File(source) => source.next()?,
            CaptureBackend::Closed => None,
        };
        if frame.is_some() {
            self.frames_delivered += 1;
        }
        Ok(frame)
    }

    /// Close the source. Safe to call more than once.
    pub fn release(&mut self) -> Result<()> {
        if !matches!(self.backend, CaptureBackend::Closed) {
            self.backend = CaptureBackend::Closed;
            log::info!(
                "capture released: {} after {} frames",
                self.source,
                self.frames_delivered
            );
        }
        Ok(())
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_delivered: self.frames_delivered,
            source: self.source.clone(),
        }
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn default_camera_path() -> String {
    DEFAULT_CAMERA_DEVICE.to_string()
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn default_camera_path() -> String {
    CAM_SENTINEL.to_string()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
