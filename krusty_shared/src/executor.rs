//! C5 — segment executor: the ISR-equivalent that turns one [`Segment`]
//! into individual step pulses, distributing subordinate-axis steps
//! against the dominant axis with a running Bresenham accumulator.
//!
//! Grounded on `src/motion/stepper.rs`'s `StepGenerator`/`StepCommand` for
//! the per-axis pulse-command shape and on `krusty_shared/src/hardware_traits.rs`
//! for the "trait at the hardware seam" pattern. The Bresenham distribution
//! and the atomic dominant-axis handover are this crate's own: no teacher
//! file carried a working version through. The handover uses
//! `parking_lot::Mutex` rather than `tokio::sync::Mutex` because this path
//! models a synchronous interrupt-mask critical section, not an async
//! await point — blocking briefly here is correct, yielding here would not
//! be.

use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::Mutex;

use crate::segment::Segment;
use crate::types::{AxisMask, StepVector, AXES};

/// Which part a given axis plays in the currently-armed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisRole {
    /// Pulses unconditionally once per tick; its count sets the segment's
    /// timer period.
    Dominant,
    /// Pulses when its Bresenham accumulator crosses the dominant axis's
    /// step count.
    Subordinate,
    /// Does not move during this block.
    Idle,
}

fn axis_role(axis: usize, dominant_axis: usize, segment_steps: &StepVector) -> AxisRole {
    if segment_steps[axis] == 0 {
        AxisRole::Idle
    } else if axis == dominant_axis {
        AxisRole::Dominant
    } else {
        AxisRole::Subordinate
    }
}

/// Per-axis hardware seam the executor drives one pulse at a time. A real
/// backend lives behind this in the MCU crate; the simulator can fake it
/// directly.
pub trait StepOutput: Send {
    fn step(&mut self, axis: usize, reverse: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseOutcome {
    /// No segment armed; nothing happened.
    Idle,
    /// A pulse fired; more remain in this segment.
    Continuing,
    /// This pulse was the segment's last; the executor needs re-arming.
    SegmentDone,
}

struct Inner {
    armed: bool,
    pulses_remaining: u32,
    direction_bits: AxisMask,
    /// Bresenham accumulator, reset from the segment's own
    /// `bresenham_initial` at every segment handover — never carried
    /// forward across segments, per spec.md's per-segment reset.
    accumulator: [i32; AXES],
    /// This segment's own per-axis step counts (not the owning block's
    /// totals): the Bresenham threshold against the dominant axis is the
    /// segment's `n_step`, since each segment distributes its own share of
    /// subordinate steps independently.
    segment_steps: StepVector,
    dominant_axis: usize,
    threshold: i32,
    roles: [AxisRole; AXES],
    period_us: f64,
}

impl Inner {
    fn idle() -> Self {
        Self {
            armed: false,
            pulses_remaining: 0,
            direction_bits: AxisMask::EMPTY,
            accumulator: [0; AXES],
            segment_steps: [0; AXES],
            dominant_axis: 0,
            threshold: 1,
            roles: [AxisRole::Idle; AXES],
            period_us: 0.0,
        }
    }
}

pub struct SegmentExecutor {
    inner: Mutex<Inner>,
    position_steps: [AtomicI32; AXES],
}

impl Default for SegmentExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentExecutor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::idle()),
            position_steps: std::array::from_fn(|_| AtomicI32::new(0)),
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.inner.lock().armed
    }

    pub fn roles(&self) -> [AxisRole; AXES] {
        self.inner.lock().roles
    }

    /// Dominant-axis pulse period for the currently-armed segment, in
    /// microseconds. A hardware timer (or, in the simulator, a sleeping
    /// thread) reads this to know how long to wait before calling
    /// [`Self::on_pulse`] again. `None` while idle.
    pub fn period_us(&self) -> Option<f64> {
        let inner = self.inner.lock();
        if inner.armed {
            Some(inner.period_us)
        } else {
            None
        }
    }

    /// Absolute machine position in steps. Safe to read concurrently with
    /// `on_pulse` — it is only ever written from inside the locked pulse
    /// path, one axis at a time, using a relaxed store since callers only
    /// need eventual consistency for status reporting.
    pub fn position_steps(&self) -> [i32; AXES] {
        std::array::from_fn(|a| self.position_steps[a].load(Ordering::Relaxed))
    }

    pub fn set_position_steps(&self, steps: [i32; AXES]) {
        for a in 0..AXES {
            self.position_steps[a].store(steps[a], Ordering::Relaxed);
        }
    }

    /// Arms the executor with a new segment. This is the atomic
    /// dominant-axis handover: the whole swap happens under one lock
    /// acquisition so a concurrent `on_pulse` never observes a mix of the
    /// old segment's roles and the new segment's accumulator.
    pub fn start_execution(&self, segment: &Segment) {
        let mut inner = self.inner.lock();
        inner.armed = true;
        inner.pulses_remaining = segment.n_step;
        inner.direction_bits = segment.direction_bits;
        inner.accumulator = segment.bresenham_initial;
        inner.segment_steps = segment.steps;
        inner.dominant_axis = segment.dominant_axis;
        inner.threshold = segment.n_step.max(1) as i32;
        inner.roles = std::array::from_fn(|a| axis_role(a, segment.dominant_axis, &segment.steps));
        inner.period_us = segment.period_us;
    }

    /// Fires one dominant-axis pulse, distributing any subordinate-axis
    /// pulses the Bresenham accumulator calls for this tick. Models the
    /// hardware timer ISR; `hal` is the pulse sink.
    pub fn on_pulse(&self, hal: &mut dyn StepOutput) -> PulseOutcome {
        let mut inner = self.inner.lock();
        if !inner.armed || inner.pulses_remaining == 0 {
            return PulseOutcome::Idle;
        }

        let dominant = inner.dominant_axis;
        let reverse = inner.direction_bits.is_set(dominant);
        hal.step(dominant, reverse);
        self.bump_position(dominant, reverse);

        let threshold = inner.threshold;
        for axis in 0..AXES {
            if inner.roles[axis] != AxisRole::Subordinate {
                continue;
            }
            inner.accumulator[axis] += inner.segment_steps[axis] as i32;
            if inner.accumulator[axis] >= threshold {
                inner.accumulator[axis] -= threshold;
                let reverse = inner.direction_bits.is_set(axis);
                hal.step(axis, reverse);
                self.bump_position(axis, reverse);
            }
        }

        inner.pulses_remaining -= 1;
        if inner.pulses_remaining == 0 {
            inner.armed = false;
            PulseOutcome::SegmentDone
        } else {
            PulseOutcome::Continuing
        }
    }

    /// Immediately disarms the executor, abandoning any remaining pulses
    /// in the current segment. Used only for emergency stop — normal
    /// completion clears `armed` on its own once `pulses_remaining` hits
    /// zero.
    pub fn disarm(&self) {
        let mut inner = self.inner.lock();
        inner.armed = false;
        inner.pulses_remaining = 0;
    }

    fn bump_position(&self, axis: usize, reverse: bool) {
        let delta = if reverse { -1 } else { 1 };
        self.position_steps[axis].fetch_add(delta, Ordering::Relaxed);
    }
}
