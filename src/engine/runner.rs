//! Worker thread that runs backend requests off the pipeline thread.
//!
//! One job at a time flows through a channel pair. Jobs carry a sequence id
//! so that a request abandoned after a timeout cannot have its late result
//! mistaken for the result of the request submitted after it: `wait` drops
//! any result whose id is not the current one.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use ndarray::Array4;

use crate::decode::DetectionTensor;
use crate::engine::{ModelBackend, PollStatus};

pub(crate) struct RequestRunner {
    jobs: Option<mpsc::Sender<(u64, Array4<f32>)>>,
    results: mpsc::Receiver<(u64, Result<DetectionTensor>)>,
    worker: Option<thread::JoinHandle<()>>,
    current_id: u64,
    completed: Option<Result<DetectionTensor>>,
}

impl RequestRunner {
    /// Move the backend onto its own thread and start accepting jobs.
    pub fn spawn(mut backend: Box<dyn ModelBackend>) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<(u64, Array4<f32>)>();
        let (result_tx, result_rx) = mpsc::channel();
        let worker = thread::spawn(move || {
            for (id, input) in job_rx {
                if result_tx.send((id, backend.infer(input))).is_err() {
                    break;
                }
            }
        });
        Self {
            jobs: Some(job_tx),
            results: result_rx,
            worker: Some(worker),
            current_id: 0,
            completed: None,
        }
    }

    /// Hand one input to the worker. Any earlier request still in the pipe
    /// is implicitly abandoned.
    pub fn begin(&mut self, input: Array4<f32>) -> Result<u64> {
        self.current_id += 1;
        self.completed = None;
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("inference worker already shut down"))?;
        jobs.send((self.current_id, input))
            .map_err(|_| anyhow!("inference worker exited"))?;
        Ok(self.current_id)
    }

    /// Block until the current request completes or `timeout` elapses.
    /// `None` waits without bound. Only meaningful after `begin`.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<PollStatus> {
        if self.completed.is_some() {
            return Ok(PollStatus::Ready);
        }
        match timeout {
            None => loop {
                let (id, outcome) = self
                    .results
                    .recv()
                    .map_err(|_| anyhow!("inference worker exited"))?;
                if id == self.current_id {
                    self.completed = Some(outcome);
                    return Ok(PollStatus::Ready);
                }
            },
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match self.results.recv_timeout(remaining) {
                        Ok((id, outcome)) if id == self.current_id => {
                            self.completed = Some(outcome);
                            return Ok(PollStatus::Ready);
                        }
                        Ok(_) => {}
                        Err(RecvTimeoutError::Timeout) => return Ok(PollStatus::TimedOut),
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(anyhow!("inference worker exited"))
                        }
                    }
                }
            }
        }
    }

    /// Take the completed result after `wait` returned `Ready`.
    pub fn take(&mut self) -> Option<Result<DetectionTensor>> {
        self.completed.take()
    }
}

impl Drop for RequestRunner {
    fn drop(&mut self) {
        // Closing the job channel lets the worker run off its loop. Joining
        // waits out any request still executing.
        let _ = self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{StubBackend, StubDetection};

    const DIMS: [usize; 4] = [1, 3, 4, 4];

    fn input() -> Array4<f32> {
        Array4::zeros((1, 3, 4, 4))
    }

    #[test]
    fn begin_wait_take_round_trip() {
        let backend = StubBackend::scripted(&DIMS, vec![vec![StubDetection::person(0.9)]]);
        let mut runner = RequestRunner::spawn(Box::new(backend));
        runner.begin(input()).unwrap();
        assert_eq!(runner.wait(None).unwrap(), PollStatus::Ready);
        let tensor = runner.take().unwrap().unwrap();
        assert_eq!(tensor.len(), 1);
        assert!(runner.take().is_none());
    }

    #[test]
    fn short_wait_times_out_then_completes() {
        let backend = StubBackend::scripted(&DIMS, vec![vec![]])
            .with_latency(Duration::from_millis(100));
        let mut runner = RequestRunner::spawn(Box::new(backend));
        runner.begin(input()).unwrap();
        assert_eq!(
            runner.wait(Some(Duration::from_millis(1))).unwrap(),
            PollStatus::TimedOut
        );
        assert_eq!(runner.wait(None).unwrap(), PollStatus::Ready);
        assert!(runner.take().is_some());
    }

    #[test]
    fn ready_is_sticky_until_taken() {
        let backend = StubBackend::scripted(&DIMS, vec![vec![]]);
        let mut runner = RequestRunner::spawn(Box::new(backend));
        runner.begin(input()).unwrap();
        assert_eq!(runner.wait(None).unwrap(), PollStatus::Ready);
        assert_eq!(
            runner.wait(Some(Duration::from_millis(1))).unwrap(),
            PollStatus::Ready
        );
        assert!(runner.take().is_some());
    }

    #[test]
    fn abandoned_result_is_not_served_to_the_next_request() {
        let backend = StubBackend::scripted(
            &DIMS,
            vec![
                vec![StubDetection::person(0.9)],
                vec![StubDetection::person(0.9), StubDetection::person(0.8)],
            ],
        )
        .with_latency(Duration::from_millis(30));
        let mut runner = RequestRunner::spawn(Box::new(backend));

        runner.begin(input()).unwrap();
        assert_eq!(
            runner.wait(Some(Duration::from_millis(1))).unwrap(),
            PollStatus::TimedOut
        );

        // Abandon the first request and submit another. The first request's
        // one-row result must be discarded, not handed to us here.
        runner.begin(input()).unwrap();
        assert_eq!(runner.wait(None).unwrap(), PollStatus::Ready);
        let tensor = runner.take().unwrap().unwrap();
        assert_eq!(tensor.len(), 2);
    }
}
