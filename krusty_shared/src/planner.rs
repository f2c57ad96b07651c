//! C3 — the look-ahead planner ring: accepts motion blocks, computes
//! junction velocities, and runs the reverse/forward optimizer pass so a
//! stream of short moves cruises through corners instead of stopping at
//! every block boundary.
//!
//! Grounded on `src/motion/planner.rs` for the queue-of-blocks shape and on
//! `other_examples/.../klipper_estimator__lib-src-planner.rs`'s
//! `apply_junction`/`MoveSequence::process` for the real trapezoidal
//! entry/exit-speed math, adapted to the ring-with-a-`planned`-pointer
//! algorithm spec.md §4.3 describes (GRBL's own, simpler scheme).

use crate::error::PlannerError;
use crate::junction::{self, UnitVector};
use crate::settings::Settings;
use crate::types::{AxisMask, Condition, Position, StepVector, AXES};

const OPTIMAL_EPSILON: f64 = 1e-9;

/// A single straight-line move in machine coordinates, as admitted to the
/// planner; the unit of look-ahead optimization.
#[derive(Debug, Clone)]
pub struct Block {
    pub steps: StepVector,
    pub step_event_count: u32,
    pub direction_bits: AxisMask,
    pub millimeters: f64,
    pub programmed_rate: f64,
    pub acceleration: f64,
    pub rapid_rate: f64,
    pub max_junction_speed_sqr: f64,
    pub max_entry_speed_sqr: f64,
    pub entry_speed_sqr: f64,
    pub unit_vector: UnitVector,
    pub condition: Condition,
}

impl Block {
    /// Square of the speed this block can reach by the time it has
    /// travelled its full length, given its entry speed and acceleration.
    pub fn max_exit_speed_sqr(&self) -> f64 {
        self.entry_speed_sqr + 2.0 * self.acceleration * self.millimeters
    }
}

pub struct Planner {
    settings: Settings,
    capacity: usize,
    blocks: std::collections::VecDeque<Block>,
    /// Count of blocks (from the front/tail) whose entry speed is proven
    /// optimal. `planned == 0` means even the tail block is still subject
    /// to re-optimization; see [`Planner::current_block`].
    planned: usize,
    planned_position_steps: [i32; AXES],
    planned_position_mm: Position,
    previous: Option<(UnitVector, f64)>,
}

impl Planner {
    pub fn new(capacity: usize, settings: Settings) -> Self {
        Self {
            settings,
            capacity,
            blocks: std::collections::VecDeque::with_capacity(capacity),
            planned: 0,
            planned_position_steps: [0; AXES],
            planned_position_mm: [0.0; AXES],
            previous: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn is_buffer_full(&self) -> bool {
        self.blocks.len() >= self.capacity
    }

    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.blocks.len())
    }

    pub fn count(&self) -> usize {
        self.blocks.len()
    }

    /// The exact-mm position the planner has committed moves up to,
    /// independent of how far the executor has actually stepped.
    pub fn planned_position_mm(&self) -> Position {
        self.planned_position_mm
    }

    /// Admits a linear move to `target_mm`, running the look-ahead
    /// optimizer afterward. See spec.md §4.3 for the step-by-step.
    pub fn buffer_line(
        &mut self,
        target_mm: Position,
        feed_rate: f64,
        condition: Condition,
    ) -> Result<(), PlannerError> {
        if self.is_buffer_full() {
            tracing::debug!(capacity = self.capacity, "planner buffer full, rejecting move");
            return Err(PlannerError::BufferFull);
        }

        // Step 1: step deltas from the planner's own planned position.
        let mut steps = [0u32; AXES];
        let mut direction_bits = AxisMask::EMPTY;
        for a in 0..AXES {
            let target_steps = self.settings.mm_to_steps(target_mm[a], a);
            let delta = target_steps - self.planned_position_steps[a];
            steps[a] = delta.unsigned_abs();
            if delta < 0 {
                direction_bits.set(a);
            }
        }

        // Step 2.
        let step_event_count = steps.iter().copied().max().unwrap_or(0);
        if step_event_count == 0 {
            tracing::trace!(?target_mm, "zero-length move rejected");
            return Err(PlannerError::EmptyBlock);
        }

        // Step 3: exact-mm delta, not steps round-tripped.
        let mut delta_mm = [0.0; AXES];
        for a in 0..AXES {
            delta_mm[a] = target_mm[a] - self.planned_position_mm[a];
        }
        let millimeters = delta_mm.iter().map(|d| d * d).sum::<f64>().sqrt();
        let unit_vector = junction::unit_vector(delta_mm, millimeters);

        // Step 4: axis-limit acceleration and rapid_rate along unit vector.
        let accel_limits: [f64; AXES] =
            std::array::from_fn(|a| self.settings.acceleration_mm_per_s2(a) * 3600.0);
        let velocity_limits: [f64; AXES] =
            std::array::from_fn(|a| self.settings.max_velocity_mm_per_min(a));
        let acceleration = axis_limited(&accel_limits, &unit_vector);
        let rapid_rate = axis_limited(&velocity_limits, &unit_vector);

        // Step 5.
        let programmed_rate = if condition.rapid {
            rapid_rate
        } else if condition.inverse_time {
            feed_rate * millimeters
        } else {
            feed_rate
        }
        .min(rapid_rate);

        // Step 6: junction velocity.
        let max_junction_speed_sqr = if self.previous.is_none() || condition.system_motion {
            0.0
        } else {
            let (prev_unit, _prev_rate) = self.previous.as_ref().unwrap();
            let bisector = bisector_unit_vector(prev_unit, &unit_vector);
            let a_junction = axis_limited(&accel_limits, &bisector);
            junction::max_junction_speed_sqr(
                prev_unit,
                &unit_vector,
                a_junction,
                self.settings.junction_deviation_mm(),
            )
        };

        // Step 7.
        let prev_nominal_sqr = self
            .previous
            .as_ref()
            .map(|(_, rate)| rate * rate)
            .unwrap_or(f64::INFINITY);
        let max_entry_speed_sqr = (programmed_rate * programmed_rate)
            .min(prev_nominal_sqr)
            .min(max_junction_speed_sqr);

        let block = Block {
            steps,
            step_event_count,
            direction_bits,
            millimeters,
            programmed_rate,
            acceleration,
            rapid_rate,
            max_junction_speed_sqr,
            max_entry_speed_sqr,
            entry_speed_sqr: max_entry_speed_sqr,
            unit_vector,
            condition,
        };

        // Step 8: commit.
        self.blocks.push_back(block);
        self.planned_position_steps = std::array::from_fn(|a| self.planned_position_steps[a]
            + if direction_bits.is_set(a) { -(steps[a] as i32) } else { steps[a] as i32 });
        self.planned_position_mm = target_mm;
        self.previous = Some((unit_vector, programmed_rate));

        tracing::trace!(step_event_count, millimeters, "block queued");
        self.optimize();
        Ok(())
    }

    /// Returns the tail block, but only once the optimizer has finalized
    /// its entry speed (spec.md §4.3's `current_block`).
    pub fn current_block(&self) -> Option<&Block> {
        if self.blocks.is_empty() {
            return None;
        }
        if self.planned > 0 || self.blocks.len() == 1 {
            self.blocks.front()
        } else {
            None
        }
    }

    /// Look-ahead to the block after the current one, for deceleration
    /// planning. `None` means the segment generator should ramp to zero.
    pub fn next_block(&self) -> Option<&Block> {
        self.blocks.get(1)
    }

    pub fn discard_current_block(&mut self) {
        self.blocks.pop_front();
        self.planned = self.planned.saturating_sub(1);
    }

    /// Force-resets the planned position, e.g. after homing or a reset.
    /// Also drops the stored previous-block direction so the next admitted
    /// block is treated as a cold start (no junction carried across the
    /// discontinuity).
    pub fn sync_position(&mut self, steps: [i32; AXES]) {
        self.planned_position_steps = steps;
        for a in 0..AXES {
            self.planned_position_mm[a] = self.settings.steps_to_mm(steps[a], a);
        }
        self.previous = None;
    }

    /// Discards every block in the ring (soft reset). The planned position
    /// is left untouched — callers resync it from the true machine
    /// position separately, per spec.md §5's cancellation contract.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.planned = 0;
        self.previous = None;
    }

    /// Two-pass look-ahead optimizer; idempotent, see spec.md §9.
    fn optimize(&mut self) {
        if self.blocks.is_empty() {
            return;
        }

        // Reverse pass: walk from the last block back to `planned`,
        // decelerating each block to the next one's (tentative) entry
        // speed. The last block's implicit "next" is a full stop.
        let mut next_entry_sqr = 0.0;
        for idx in (self.planned..self.blocks.len()).rev() {
            let block = &mut self.blocks[idx];
            let candidate = (next_entry_sqr + 2.0 * block.acceleration * block.millimeters)
                .min(block.max_entry_speed_sqr);
            block.entry_speed_sqr = candidate;
            next_entry_sqr = candidate;
        }

        // Forward pass: walk from `planned` forward; a block that is
        // fully acceleration-limited (can't reach the next block's entry
        // speed within its own length) is proven optimal and advances the
        // planned pointer.
        loop {
            let idx = self.planned;
            if idx >= self.blocks.len() {
                break;
            }
            let is_last = idx + 1 == self.blocks.len();
            let mut optimal =
                self.blocks[idx].entry_speed_sqr >= self.blocks[idx].max_entry_speed_sqr - OPTIMAL_EPSILON;
            if !is_last {
                let reachable = self.blocks[idx].max_exit_speed_sqr();
                if reachable < self.blocks[idx + 1].entry_speed_sqr {
                    self.blocks[idx + 1].entry_speed_sqr = reachable;
                    optimal = true;
                }
            }
            if optimal {
                self.planned += 1;
            } else {
                break;
            }
        }
    }
}

/// Axis-limited maximum of `limits` along `unit`: `min_a(limits[a] /
/// |unit[a]|)` over axes with a non-zero component. Axes the move doesn't
/// touch impose no constraint.
fn axis_limited(limits: &[f64; AXES], unit: &UnitVector) -> f64 {
    let mut limit = f64::INFINITY;
    for a in 0..AXES {
        if unit[a].abs() > f64::EPSILON {
            limit = limit.min(limits[a] / unit[a].abs());
        }
    }
    limit
}

fn bisector_unit_vector(a: &UnitVector, b: &UnitVector) -> UnitVector {
    let mut sum = [0.0; AXES];
    for i in 0..AXES {
        sum[i] = a[i] + b[i];
    }
    let len = sum.iter().map(|v| v * v).sum::<f64>().sqrt();
    if len <= f64::EPSILON {
        // Exact reversal; bisector is undefined, but callers of this path
        // already short-circuit on cos_theta <= -1+eps before using it.
        return *a;
    }
    junction::unit_vector(sum, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Condition;

    fn test_settings() -> Settings {
        Settings::new([250.0; AXES], [1000.0; AXES], [100.0; AXES])
    }

    #[test]
    fn single_linear_move_cold_start() {
        let mut p = Planner::new(16, test_settings());
        p.buffer_line([10.0, 0.0, 0.0, 0.0], 600.0, Condition::default())
            .unwrap();
        let b = p.current_block().expect("one block should be current");
        assert_eq!(b.steps[0], 2500);
        assert_eq!(b.step_event_count, 2500);
        assert!((b.millimeters - 10.0).abs() < 1e-9);
        assert!((b.programmed_rate - 600.0).abs() < 1e-9);
        assert_eq!(b.entry_speed_sqr, 0.0);
    }

    #[test]
    fn empty_block_is_rejected_without_mutation() {
        let mut p = Planner::new(16, test_settings());
        p.buffer_line([10.0, 0.0, 0.0, 0.0], 600.0, Condition::default())
            .unwrap();
        let count_before = p.count();
        let err = p
            .buffer_line([10.0, 0.0, 0.0, 0.0], 600.0, Condition::default())
            .unwrap_err();
        assert_eq!(err, PlannerError::EmptyBlock);
        assert_eq!(p.count(), count_before);
    }

    #[test]
    fn buffer_full_rejects_without_mutation() {
        let mut p = Planner::new(2, test_settings());
        p.buffer_line([1.0, 0.0, 0.0, 0.0], 600.0, Condition::default())
            .unwrap();
        p.buffer_line([2.0, 0.0, 0.0, 0.0], 600.0, Condition::default())
            .unwrap();
        let err = p
            .buffer_line([3.0, 0.0, 0.0, 0.0], 600.0, Condition::default())
            .unwrap_err();
        assert_eq!(err, PlannerError::BufferFull);
        assert_eq!(p.count(), 2);
    }

    #[test]
    fn corner_with_lookahead() {
        let mut p = Planner::new(16, test_settings());
        p.buffer_line([10.0, 0.0, 0.0, 0.0], 6000.0, Condition::default())
            .unwrap();
        p.buffer_line([10.0, 10.0, 0.0, 0.0], 6000.0, Condition::default())
            .unwrap();
        assert_eq!(p.count(), 2);
        // cold start: first block still decelerates fully (it's the
        // deepest block at admission time of block 2, forced by the
        // reverse pass racing from the tail backward).
        let first = &p.blocks[0];
        assert!((first.programmed_rate - 6000.0).abs() < 1e-6);
    }

    #[test]
    fn full_stop_sequence_preserves_step_total() {
        let mut p = Planner::new(16, test_settings());
        for i in 1..=10 {
            p.buffer_line([i as f64, 0.0, 0.0, 0.0], 300.0, Condition::default())
                .unwrap();
        }
        let mut total_steps = 0u32;
        while let Some(b) = p.current_block() {
            total_steps += b.steps[0];
            p.discard_current_block();
        }
        assert_eq!(total_steps, 2500);
    }

    #[test]
    fn sync_position_resets_cold_start_state() {
        let mut p = Planner::new(16, test_settings());
        p.buffer_line([10.0, 0.0, 0.0, 0.0], 6000.0, Condition::default())
            .unwrap();
        p.discard_current_block();
        p.sync_position([0; AXES]);
        p.buffer_line([5.0, 0.0, 0.0, 0.0], 6000.0, Condition::default())
            .unwrap();
        let b = p.current_block().unwrap();
        // Treated as a fresh cold start: junction speed forced to zero.
        assert_eq!(b.max_junction_speed_sqr, 0.0);
    }
}
