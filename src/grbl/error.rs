//! Maps `grbl4-core`'s typed errors onto the wire's `error:N` / `ALARM:N`
//! vocabulary, per spec.md §6. The numeric codes follow real GRBL's error
//! table where a clean mapping exists; codes with no GRBL precedent (the
//! planner ring buffer, which GRBL itself never surfaces as a line error)
//! get a controller-local number in the same style.
//!
//! Grounded on `src/hardware.rs`'s `thiserror`-derived `HardwareError`
//! enum for the "typed error with a stable wire code" shape.

use grbl4_core::{ArcError, PlannerError, SettingsError};
use thiserror::Error;

use crate::grbl::gcode::GCodeError;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GrblErrorCode {
    #[error("error:1 (expected command letter)")]
    ExpectedCommandLetter,
    #[error("error:2 (bad number format)")]
    BadNumberFormat,
    #[error("error:3 (invalid statement)")]
    InvalidStatement,
    #[error("error:11 (setting value out of range)")]
    SettingValueOutOfRange,
    #[error("error:20 (unsupported or invalid command)")]
    UnsupportedCommand,
    #[error("error:33 (motion produced no travel)")]
    EmptyBlock,
    #[error("error:34 (arc radius below minimum)")]
    ArcRadiusTooSmall,
    #[error("error:38 (only the XY plane is supported for arcs)")]
    ArcUnsupportedPlane,
    #[error("error:9 (command locked out, planner buffer full)")]
    PlannerBufferFull,
}

impl GrblErrorCode {
    pub fn code(self) -> u32 {
        match self {
            GrblErrorCode::ExpectedCommandLetter => 1,
            GrblErrorCode::BadNumberFormat => 2,
            GrblErrorCode::InvalidStatement => 3,
            GrblErrorCode::SettingValueOutOfRange => 11,
            GrblErrorCode::UnsupportedCommand => 20,
            GrblErrorCode::EmptyBlock => 33,
            GrblErrorCode::ArcRadiusTooSmall => 34,
            GrblErrorCode::ArcUnsupportedPlane => 38,
            GrblErrorCode::PlannerBufferFull => 9,
        }
    }

    /// Renders the wire line GRBL sends back for a rejected command.
    pub fn wire_line(self) -> String {
        format!("error:{}", self.code())
    }
}

impl From<PlannerError> for GrblErrorCode {
    fn from(e: PlannerError) -> Self {
        match e {
            PlannerError::BufferFull => GrblErrorCode::PlannerBufferFull,
            PlannerError::EmptyBlock => GrblErrorCode::EmptyBlock,
        }
    }
}

impl From<ArcError> for GrblErrorCode {
    fn from(e: ArcError) -> Self {
        match e {
            ArcError::RadiusTooSmall => GrblErrorCode::ArcRadiusTooSmall,
            ArcError::UnsupportedPlane => GrblErrorCode::ArcUnsupportedPlane,
            ArcError::Planner(inner) => inner.into(),
        }
    }
}

impl From<SettingsError> for GrblErrorCode {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::UnknownId(_) => GrblErrorCode::InvalidStatement,
            SettingsError::InvalidValue => GrblErrorCode::SettingValueOutOfRange,
        }
    }
}

impl From<GCodeError> for GrblErrorCode {
    fn from(e: GCodeError) -> Self {
        if e.message.starts_with("invalid numeric value") {
            GrblErrorCode::BadNumberFormat
        } else {
            GrblErrorCode::ExpectedCommandLetter
        }
    }
}

/// Alarm codes sent as `ALARM:N` when the controller enters
/// [`grbl4_core::manager::MotionState::Alarm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrblAlarmCode {
    /// Motion was aborted mid-cycle by an emergency stop.
    AbortDuringCycle,
}

impl GrblAlarmCode {
    pub fn code(self) -> u32 {
        match self {
            GrblAlarmCode::AbortDuringCycle => 3,
        }
    }

    pub fn wire_line(self) -> String {
        format!("ALARM:{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_buffer_full_maps_to_error_9() {
        let code: GrblErrorCode = PlannerError::BufferFull.into();
        assert_eq!(code.wire_line(), "error:9");
    }

    #[test]
    fn arc_errors_pass_through_nested_planner_errors() {
        let code: GrblErrorCode = ArcError::Planner(PlannerError::EmptyBlock).into();
        assert_eq!(code.wire_line(), "error:33");
    }

    #[test]
    fn emergency_stop_alarm_is_code_3() {
        assert_eq!(GrblAlarmCode::AbortDuringCycle.wire_line(), "ALARM:3");
    }
}
