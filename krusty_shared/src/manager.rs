//! C6 — motion manager: the periodic tick that keeps the segment queue
//! full and the executor armed, plus the feed-hold/cycle-start/
//! emergency-stop state machine spec.md §5 describes.
//!
//! Grounded on `src/motion/mod.rs`'s `MotionController::update` for the
//! "own the planner and step generator, tick them together" shape, and on
//! `krusty_shared/src/motion/planner.rs`'s `MotionQueueState`
//! (Idle/Running/Paused/Cancelled) for the run-state enum.

use std::sync::Arc;

use crate::executor::SegmentExecutor;
use crate::planner::Planner;
use crate::segment::SegmentGenerator;
use crate::types::AXES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Idle,
    Running,
    /// Feed hold: no new segments are armed, but the segment already
    /// executing is allowed to finish rather than being torn down.
    Held,
    Alarm,
}

pub struct MotionManager {
    planner: Planner,
    generator: SegmentGenerator,
    executor: Arc<SegmentExecutor>,
    state: MotionState,
}

impl MotionManager {
    pub fn new(planner: Planner, segment_queue_capacity: usize) -> Self {
        Self {
            planner,
            generator: SegmentGenerator::new(segment_queue_capacity),
            executor: Arc::new(SegmentExecutor::new()),
            state: MotionState::Idle,
        }
    }

    pub fn executor(&self) -> Arc<SegmentExecutor> {
        Arc::clone(&self.executor)
    }

    pub fn planner_mut(&mut self) -> &mut Planner {
        &mut self.planner
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Admits a move and flips the manager to `Running` if it was idle.
    pub fn queue_move(
        &mut self,
        target_mm: crate::types::Position,
        feed_rate: f64,
        condition: crate::types::Condition,
    ) -> Result<(), crate::error::PlannerError> {
        self.planner.buffer_line(target_mm, feed_rate, condition)?;
        if self.state == MotionState::Idle {
            self.state = MotionState::Running;
        }
        Ok(())
    }

    /// Refills the segment queue and arms the executor if it has gone
    /// idle. Call this on a fixed period (spec.md §5's background-priority
    /// tick); safe to call from a non-realtime context since it never
    /// blocks on the executor's pulse path for more than one lock
    /// acquisition.
    pub fn tick(&mut self) {
        if self.state != MotionState::Running {
            return;
        }

        while !self.generator.is_full() {
            if !self.generator.prep_one_segment(&mut self.planner) {
                break;
            }
        }

        if self.executor.is_idle() {
            if let Some(segment) = self.generator.pop_segment() {
                self.executor.start_execution(&segment);
            } else if self.generator.queued() == 0 && self.planner.count() == 0 {
                self.state = MotionState::Idle;
            }
        }
    }

    /// Flips Idle->Running without touching the planner. Callers that feed
    /// the planner directly (arc expansion, which bypasses [`Self::queue_move`])
    /// use this to get the same admission-triggers-the-tick behavior.
    pub fn note_external_enqueue(&mut self) {
        if self.state == MotionState::Idle {
            self.state = MotionState::Running;
        }
    }

    /// Stops arming new segments; the in-flight segment finishes normally.
    pub fn feed_hold(&mut self) {
        if self.state == MotionState::Running {
            self.state = MotionState::Held;
        }
    }

    pub fn cycle_start(&mut self) {
        if self.state == MotionState::Held {
            self.state = MotionState::Running;
        }
    }

    /// Immediate stop: disarms the executor mid-pulse-train, drops every
    /// queued segment and planned block, and resyncs the planner's
    /// position to wherever the executor actually stopped.
    pub fn emergency_stop(&mut self) {
        self.executor.disarm();
        while self.generator.pop_segment().is_some() {}
        self.planner.clear();
        let steps = self.executor.position_steps();
        tracing::warn!(?steps, "emergency stop: motion aborted, resyncing planner position");
        self.planner.sync_position(steps);
        self.state = MotionState::Alarm;
    }

    /// Clears an alarm once the operator has acknowledged it (spec.md §7).
    pub fn reset_alarm(&mut self) {
        if self.state == MotionState::Alarm {
            self.state = MotionState::Idle;
        }
    }

    pub fn position_mm(&self) -> [f64; AXES] {
        let steps = self.executor.position_steps();
        std::array::from_fn(|a| self.planner.settings().steps_to_mm(steps[a], a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{PulseOutcome, StepOutput};
    use crate::settings::Settings;
    use crate::types::Condition;

    struct NullHal;
    impl StepOutput for NullHal {
        fn step(&mut self, _axis: usize, _reverse: bool) {}
    }

    fn drain(manager: &mut MotionManager, hal: &mut dyn StepOutput) {
        let mut guard = 0;
        loop {
            manager.tick();
            loop {
                match manager.executor().on_pulse(hal) {
                    PulseOutcome::Idle => break,
                    PulseOutcome::Continuing => {}
                    PulseOutcome::SegmentDone => break,
                }
            }
            guard += 1;
            if manager.state() == MotionState::Idle || guard > 100_000 {
                break;
            }
        }
    }

    #[test]
    fn cold_start_single_move_reaches_target() {
        let settings = Settings::new([250.0; AXES], [6000.0; AXES], [500.0; AXES]);
        let mut manager = MotionManager::new(Planner::new(16, settings), 32);
        manager
            .queue_move([10.0, 0.0, 0.0, 0.0], 3000.0, Condition::default())
            .unwrap();
        let mut hal = NullHal;
        drain(&mut manager, &mut hal);
        assert_eq!(manager.state(), MotionState::Idle);
        let pos = manager.position_mm();
        assert!((pos[0] - 10.0).abs() < 0.01);
    }

    #[test]
    fn emergency_stop_clears_queue_and_resyncs_position() {
        let settings = Settings::new([250.0; AXES], [6000.0; AXES], [500.0; AXES]);
        let mut manager = MotionManager::new(Planner::new(16, settings), 32);
        manager
            .queue_move([100.0, 0.0, 0.0, 0.0], 3000.0, Condition::default())
            .unwrap();
        manager.tick();
        let mut hal = NullHal;
        // Run a handful of pulses, then e-stop mid-move.
        for _ in 0..10 {
            manager.executor().on_pulse(&mut hal);
        }
        manager.emergency_stop();
        assert_eq!(manager.state(), MotionState::Alarm);
        assert_eq!(manager.planner_mut().count(), 0);
        let pos_before = manager.position_mm();
        manager.reset_alarm();
        assert_eq!(manager.state(), MotionState::Idle);
        // Queuing a new move from here should not jump: the planner was
        // resynced to the executor's actual stopped position.
        manager
            .queue_move([pos_before[0] + 1.0, 0.0, 0.0, 0.0], 1000.0, Condition::default())
            .unwrap();
    }

    #[test]
    fn feed_hold_then_cycle_start_resumes() {
        let settings = Settings::new([250.0; AXES], [6000.0; AXES], [500.0; AXES]);
        let mut manager = MotionManager::new(Planner::new(16, settings), 32);
        manager
            .queue_move([10.0, 0.0, 0.0, 0.0], 3000.0, Condition::default())
            .unwrap();
        manager.tick();
        manager.feed_hold();
        assert_eq!(manager.state(), MotionState::Held);
        manager.cycle_start();
        assert_eq!(manager.state(), MotionState::Running);
        let mut hal = NullHal;
        drain(&mut manager, &mut hal);
        assert_eq!(manager.state(), MotionState::Idle);
    }
}
