//! The pipeline driver.
//!
//! One frame at a time: read, preprocess, submit, wait, decode, track,
//! publish, annotate, forward. The driver never has two frames in motion;
//! frame N's telemetry is published before frame N+1 is read.
//!
//! The wait on the in-flight request is a bounded poll loop. Between polls
//! the driver rechecks its cancel flag, so a Ctrl-C lands within one poll
//! interval even when the backend is slow. On every exit path, clean or
//! not, the capture source is released and the telemetry sink disconnected.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::capture::CaptureSource;
use crate::decode::{decode, BoundingBox, DetectionTensor};
use crate::engine::PollStatus;
use crate::preprocess::Preprocessor;
use crate::render::{annotate, FrameWriter};
use crate::session::{InferenceSession, RequestHandle};
use crate::telemetry::TelemetrySink;
use crate::track::OccupancyTracker;

/// Knobs the driver honours per run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Minimum confidence for a detection to count as a person.
    pub confidence_threshold: f32,
    /// Bound on each wait for the in-flight request; the cancel flag is
    /// rechecked whenever it elapses.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Why the loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndOfStream => write!(f, "end of stream"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What a completed run did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub stop: StopReason,
    pub frames: u64,
    pub total_entered: u64,
    pub last_count: u32,
}

/// Owns every pipeline stage and runs them strictly in sequence.
pub struct PipelineDriver {
    config: PipelineConfig,
    capture: CaptureSource,
    session: InferenceSession,
    preprocessor: Preprocessor,
    tracker: OccupancyTracker,
    telemetry: Box<dyn TelemetrySink>,
    writer: FrameWriter<Box<dyn Write>>,
    cancel: Arc<AtomicBool>,
}

impl fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineDriver {
    /// Wire the stages together. Fails up front if the model's input shape
    /// cannot be fed from RGB frames.
    pub fn new(
        config: PipelineConfig,
        capture: CaptureSource,
        session: InferenceSession,
        telemetry: Box<dyn TelemetrySink>,
        frame_sink: Box<dyn Write>,
    ) -> Result<Self> {
        let preprocessor = Preprocessor::for_model(session.input_dims())?;
        log::info!(
            "pipeline ready: backend {} expects {:?}",
            session.backend_name(),
            session.input_dims()
        );
        Ok(Self {
            config,
            capture,
            session,
            preprocessor,
            tracker: OccupancyTracker::new(),
            telemetry,
            writer: FrameWriter::new(frame_sink),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared flag that stops the loop at the next opportunity. Safe to set
    /// from a signal handler.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run until end of stream or cancellation. Capture and telemetry are
    /// torn down before this returns, whatever the outcome.
    pub fn run(&mut self) -> Result<RunSummary> {
        let outcome = self.process_stream();
        let cleanup = self.shutdown();
        let summary = outcome?;
        cleanup?;
        log::info!(
            "pipeline stopped ({}): {} frames, {} entered, last count {}",
            summary.stop,
            summary.frames,
            summary.total_entered,
            summary.last_count
        );
        Ok(summary)
    }

    fn process_stream(&mut self) -> Result<RunSummary> {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(self.summarize(StopReason::Cancelled));
            }
            let Some(mut frame) = self.capture.read()? else {
                return Ok(self.summarize(StopReason::EndOfStream));
            };

            let started = Instant::now();
            let input = self.preprocessor.prepare(&frame)?;
            let handle = self.session.submit(input)?;
            let Some(tensor) = self.wait_for_result(handle)? else {
                return Ok(self.summarize(StopReason::Cancelled));
            };

            let boxes: Vec<BoundingBox> = decode(
                &tensor,
                self.config.confidence_threshold,
                frame.width,
                frame.height,
            )
            .collect();
            log::debug!(
                "frame {}: {} detections in {} ms",
                self.tracker.state().frame_index,
                boxes.len(),
                started.elapsed().as_millis()
            );

            let events = self.tracker.observe(boxes.len() as u32, Instant::now());
            for event in &events {
                self.telemetry.publish(event)?;
            }

            annotate(&mut frame, &boxes);
            self.writer.write_frame(&frame)?;

            let frames = self.tracker.state().frame_index;
            if frames.is_multiple_of(100) {
                let state = self.tracker.state();
                log::info!(
                    "processed {} frames ({} visible, {} entered)",
                    frames,
                    state.last_count,
                    state.total_entered
                );
            }
        }
    }

    /// Poll in bounded slices so cancellation lands even while a request is
    /// in flight. Returns `None` when cancelled; the abandoned request's
    /// result is discarded by the session when it eventually completes.
    fn wait_for_result(&mut self, handle: RequestHandle) -> Result<Option<DetectionTensor>> {
        loop {
            match self
                .session
                .poll(&handle, Some(self.config.poll_interval))?
            {
                PollStatus::Ready => return self.session.fetch(handle).map(Some),
                PollStatus::TimedOut => {
                    if self.cancel.load(Ordering::SeqCst) {
                        self.session.abandon(handle);
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn summarize(&self, stop: StopReason) -> RunSummary {
        let state = self.tracker.state();
        RunSummary {
            stop,
            frames: state.frame_index,
            total_entered: state.total_entered,
            last_count: state.last_count,
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        let released = self.capture.release();
        let disconnected = self.telemetry.disconnect();
        released?;
        disconnected?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
