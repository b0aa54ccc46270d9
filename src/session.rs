//! The single in-flight request lifecycle.
//!
//! The pipeline deliberately serializes frames through exactly one inference
//! request: submit, wait, fetch, repeat. [`InferenceSession`] enforces that
//! slot discipline:
//!
//! - `submit` hands the backend one input and issues a [`RequestHandle`]
//! - `poll` waits on the handle, bounded or unbounded
//! - `fetch` consumes the handle and frees the slot for the next frame
//! - `abandon` consumes the handle without a result, after a timeout
//!
//! The handle cannot be cloned, and `fetch`/`abandon` take it by value, so
//! holding a handle across its own fetch does not compile. What is left for
//! runtime checking surfaces as [`SessionError`]: a second submit while a
//! request is in flight ([`SessionError::Busy`]) and a fetch before the
//! request completed ([`SessionError::NotReady`]). Both indicate a driver
//! bug, not a recoverable condition; only a poll timeout is recoverable.

use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Result};
use ndarray::Array4;

use crate::decode::DetectionTensor;
use crate::engine::runner::RequestRunner;
use crate::engine::{ModelBackend, PollStatus};

/// Contract violations in the submit/poll/fetch lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// A second submit while a request is in flight.
    Busy,
    /// Fetch before a poll returned `Ready`.
    NotReady,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Busy => {
                write!(f, "a request is already in flight; fetch or abandon it first")
            }
            SessionError::NotReady => {
                write!(f, "request is not ready; poll until Ready before fetching")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Proof of an in-flight request. Issued by `submit`, consumed by `fetch`
/// or `abandon`. Deliberately neither `Clone` nor `Copy`.
#[derive(Debug)]
pub struct RequestHandle {
    id: u64,
}

impl RequestHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

enum Slot {
    Idle,
    InFlight { ready: bool },
}

/// Owns the backend's worker and the one request slot in front of it.
pub struct InferenceSession {
    runner: RequestRunner,
    slot: Slot,
    issued_id: u64,
    input_dims: Vec<usize>,
    backend_name: &'static str,
}

impl InferenceSession {
    pub fn new(backend: Box<dyn ModelBackend>) -> Self {
        let input_dims = backend.input_dims();
        let backend_name = backend.name();
        Self {
            runner: RequestRunner::spawn(backend),
            slot: Slot::Idle,
            issued_id: 0,
            input_dims,
            backend_name,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Input dims the loaded model reported, batch first.
    pub fn input_dims(&self) -> &[usize] {
        &self.input_dims
    }

    /// Start one asynchronous request.
    pub fn submit(&mut self, input: Array4<f32>) -> Result<RequestHandle> {
        if !matches!(self.slot, Slot::Idle) {
            return Err(anyhow::Error::new(SessionError::Busy));
        }
        let id = self.runner.begin(input)?;
        self.slot = Slot::InFlight { ready: false };
        self.issued_id = id;
        Ok(RequestHandle { id })
    }

    /// Wait for the request to complete. `None` waits without bound;
    /// `TimedOut` leaves the request in flight for another poll or an
    /// abandon.
    pub fn poll(
        &mut self,
        handle: &RequestHandle,
        timeout: Option<Duration>,
    ) -> Result<PollStatus> {
        debug_assert_eq!(handle.id, self.issued_id, "foreign request handle");
        let status = self.runner.wait(timeout)?;
        if status == PollStatus::Ready {
            if let Slot::InFlight { ready } = &mut self.slot {
                *ready = true;
            }
        }
        Ok(status)
    }

    /// Consume the handle and return the request's output. Only valid after
    /// a poll returned `Ready`.
    pub fn fetch(&mut self, handle: RequestHandle) -> Result<DetectionTensor> {
        debug_assert_eq!(handle.id, self.issued_id, "foreign request handle");
        match self.slot {
            Slot::InFlight { ready: true } => {}
            _ => return Err(anyhow::Error::new(SessionError::NotReady)),
        }
        self.slot = Slot::Idle;
        self.runner
            .take()
            .ok_or_else(|| anyhow!("completed request produced no result"))?
    }

    /// Give up on the request. The slot frees immediately; whenever the
    /// worker finishes the abandoned request its result is discarded.
    pub fn abandon(&mut self, handle: RequestHandle) {
        debug_assert_eq!(handle.id, self.issued_id, "foreign request handle");
        self.slot = Slot::Idle;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
