//! Occupancy tracking.
//!
//! Per-frame detection counts flicker (a person reads as N boxes on one frame
//! and N-1 on the next), so entry/exit edges are only judged every
//! `debounce_window` frames. Between boundaries the tracker keeps comparing
//! against the count committed at the last boundary; an edge that appears
//! mid-window is therefore applied at the next boundary rather than lost.
//! The cost is timing resolution: an entry is reported up to
//! `debounce_window - 1` frames late.
//!
//! Counting is by detection count alone. There is no notion of which person
//! entered, only how many are in frame now versus at the last boundary.

use std::time::Instant;

use crate::telemetry::TelemetryEvent;

/// Frames between edge evaluations.
pub const DEFAULT_DEBOUNCE_WINDOW: u64 = 5;

/// Counters and the open dwell window, owned by the pipeline thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct OccupancyState {
    /// Count observed on the most recent frame.
    pub last_count: u32,
    /// Count committed at the last debounce boundary. Edge comparisons run
    /// against this, not against the previous frame.
    pub previous_count: u32,
    /// Sum of all entry deltas so far. Never decreases.
    pub total_entered: u64,
    /// Frames observed so far; also the index of the next frame.
    pub frame_index: u64,
    /// When the current dwell window opened, if one is open.
    pub window_start: Option<Instant>,
}

/// The debounced occupancy state machine.
pub struct OccupancyTracker {
    state: OccupancyState,
    debounce_window: u64,
}

impl OccupancyTracker {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_DEBOUNCE_WINDOW)
    }

    /// A window of 0 would make frame 0 the only boundary there ever is;
    /// clamp to 1, which evaluates edges on every frame instead.
    pub fn with_window(debounce_window: u64) -> Self {
        Self {
            state: OccupancyState::default(),
            debounce_window: debounce_window.max(1),
        }
    }

    pub fn state(&self) -> OccupancyState {
        self.state
    }

    pub fn debounce_window(&self) -> u64 {
        self.debounce_window
    }

    /// Feed one frame's detection count. Returns the telemetry events this
    /// frame produces, edge events first, then the unconditional count.
    pub fn observe(&mut self, count: u32, now: Instant) -> Vec<TelemetryEvent> {
        let mut events = Vec::with_capacity(2);
        let at_boundary = self.state.frame_index.is_multiple_of(self.debounce_window);

        if at_boundary {
            if count > self.state.previous_count {
                let delta = u64::from(count - self.state.previous_count);
                self.state.window_start = Some(now);
                self.state.total_entered += delta;
                events.push(TelemetryEvent::TotalUpdate {
                    total: self.state.total_entered,
                });
            } else if count < self.state.previous_count {
                if let Some(start) = self.state.window_start {
                    let duration = now.saturating_duration_since(start).as_secs();
                    events.push(TelemetryEvent::DurationUpdate { duration });
                }
            }
            // Commit only here. A flicker between boundaries cannot retire
            // a pending edge before it is evaluated.
            self.state.previous_count = count;
        }

        events.push(TelemetryEvent::CountUpdate { count });
        self.state.last_count = count;
        self.state.frame_index += 1;
        events
    }
}

impl Default for OccupancyTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn run_script(tracker: &mut OccupancyTracker, counts: &[u32]) -> Vec<Vec<TelemetryEvent>> {
        let t0 = Instant::now();
        counts
            .iter()
            .enumerate()
            .map(|(i, &c)| tracker.observe(c, t0 + Duration::from_secs(i as u64)))
            .collect()
    }

    fn totals(batches: &[Vec<TelemetryEvent>]) -> Vec<(usize, u64)> {
        batches
            .iter()
            .enumerate()
            .flat_map(|(i, batch)| {
                batch.iter().filter_map(move |e| match e {
                    TelemetryEvent::TotalUpdate { total } => Some((i, *total)),
                    _ => None,
                })
            })
            .collect()
    }

    #[test]
    fn mid_window_rise_is_applied_at_the_next_boundary() {
        let mut tracker = OccupancyTracker::new();
        let batches = run_script(&mut tracker, &[0, 0, 0, 2, 2, 2]);
        // The rise at frame 3 lands on frame 5, the next multiple of 5.
        assert_eq!(totals(&batches), vec![(5, 2)]);
        assert_eq!(tracker.state().total_entered, 2);
        // Every frame still reports its raw count.
        for (i, batch) in batches.iter().enumerate() {
            let expected = if i < 3 { 0 } else { 2 };
            assert!(batch.contains(&TelemetryEvent::CountUpdate { count: expected }));
        }
    }

    #[test]
    fn edge_event_precedes_count_event_on_boundary_frames() {
        let mut tracker = OccupancyTracker::with_window(1);
        let t0 = Instant::now();
        let batch = tracker.observe(3, t0);
        assert_eq!(
            batch,
            vec![
                TelemetryEvent::TotalUpdate { total: 3 },
                TelemetryEvent::CountUpdate { count: 3 },
            ]
        );
    }

    #[test]
    fn flicker_between_boundaries_does_not_commit() {
        let mut tracker = OccupancyTracker::new();
        let batches = run_script(&mut tracker, &[0, 2, 0, 2, 0]);
        // Frames 1..4 flicker but only frame 0 was a boundary.
        assert_eq!(tracker.state().previous_count, 0);
        assert!(totals(&batches).is_empty());
        assert_eq!(tracker.state().total_entered, 0);
    }

    #[test]
    fn total_accumulates_positive_boundary_deltas_only() {
        let mut tracker = OccupancyTracker::with_window(1);
        let batches = run_script(&mut tracker, &[1, 3, 2, 2, 5]);
        // Rises: 0->1, 1->3, 2->5. The 3->2 fall does not subtract.
        assert_eq!(totals(&batches), vec![(0, 1), (1, 3), (4, 6)]);
        let seen: Vec<u64> = totals(&batches).iter().map(|&(_, t)| t).collect();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn dwell_duration_truncates_to_whole_seconds() {
        let mut tracker = OccupancyTracker::with_window(1);
        let t0 = Instant::now();
        tracker.observe(2, t0);
        let batch = tracker.observe(0, t0 + Duration::from_millis(3900));
        assert_eq!(
            batch,
            vec![
                TelemetryEvent::DurationUpdate { duration: 3 },
                TelemetryEvent::CountUpdate { count: 0 },
            ]
        );
    }

    #[test]
    fn fall_without_open_window_emits_no_duration() {
        // A fall can only follow a rise, which opens the window; starting
        // from zero there is nothing to report.
        let mut tracker = OccupancyTracker::with_window(1);
        let batches = run_script(&mut tracker, &[0, 0]);
        for batch in &batches {
            assert!(batch
                .iter()
                .all(|e| matches!(e, TelemetryEvent::CountUpdate { .. })));
        }
    }

    #[test]
    fn zero_window_is_clamped_to_every_frame() {
        let mut tracker = OccupancyTracker::with_window(0);
        assert_eq!(tracker.debounce_window(), 1);
        let batches = run_script(&mut tracker, &[1, 0]);
        assert_eq!(totals(&batches), vec![(0, 1)]);
        assert!(batches[1]
            .iter()
            .any(|e| matches!(e, TelemetryEvent::DurationUpdate { .. })));
    }

    #[test]
    fn frame_index_advances_every_frame() {
        let mut tracker = OccupancyTracker::new();
        run_script(&mut tracker, &[0, 1, 1]);
        assert_eq!(tracker.state().frame_index, 3);
        assert_eq!(tracker.state().last_count, 1);
    }
}
