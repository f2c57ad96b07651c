//! Host-simulated MCU backend for a GRBL-compatible controller's pulse
//! output: per-axis direction/enable state and pulse counters, driven
//! directly through [`StepOutput`](grbl4_core::executor::StepOutput).
//! Real MCU targets (STM32, RP2040, AVR) implement `StepOutput` against
//! their own register access instead of this `fake` backend.
//!
//! Grounded on `krusty_shared/src/hardware_traits.rs`'s trait-at-the-seam
//! pattern: one small trait (`StepOutput`) at the hardware boundary rather
//! than a family of GPIO/timer traits, since `SegmentExecutor::on_pulse`
//! already resolves direction and pulse emission into the single
//! `step(axis, reverse)` call the executor needs.

use grbl4_core::executor::StepOutput;

pub mod fake {
    //! Per-axis GPIO state as plain fields, counted as the executor calls
    //! [`StepOutput::step`]. Used by the simulator crate and by
    //! integration tests that need a
    //! [`StepOutput`] to hand to a
    //! [`SegmentExecutor`](grbl4_core::executor::SegmentExecutor).

    use grbl4_core::types::AXES;

    use super::StepOutput;

    #[derive(Debug, Clone, Copy, Default)]
    pub struct FakeAxis {
        pub direction_negative: bool,
        pub enabled: bool,
        pub pulse_count: u64,
    }

    /// Bundles one [`FakeAxis`] per axis and implements
    /// [`StepOutput`](grbl4_core::executor::StepOutput) directly, so it
    /// can be handed straight to `SegmentExecutor::on_pulse`.
    #[derive(Default)]
    pub struct FakeMcu {
        pub axes: [FakeAxis; AXES],
    }

    impl FakeMcu {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn enable_all(&mut self) {
            tracing::debug!("enabling all fake axis drivers");
            for axis in &mut self.axes {
                axis.enabled = true;
            }
        }
    }

    impl StepOutput for FakeMcu {
        fn step(&mut self, axis: usize, reverse: bool) {
            let a = &mut self.axes[axis];
            a.direction_negative = reverse;
            a.pulse_count += 1;
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn fake_mcu_counts_pulses_per_axis() {
            let mut mcu = FakeMcu::new();
            mcu.step(0, false);
            mcu.step(0, false);
            mcu.step(1, true);
            assert_eq!(mcu.axes[0].pulse_count, 2);
            assert_eq!(mcu.axes[1].pulse_count, 1);
            assert!(mcu.axes[1].direction_negative);
        }
    }
}
