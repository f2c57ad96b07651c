//! Status report formatting: `<State|MPos:x,y,z,a|WPos:x,y,z,a>`, the line
//! a `?` realtime query produces, per spec.md §6. Work position equals
//! machine position here since work-coordinate offsets are out of scope.
//!
//! Grounded on `src/web/api.rs`'s plain `format!`-based response building
//! for simple wire formats with no surrounding framework.

use grbl4_core::manager::MotionState;

fn state_name(state: MotionState) -> &'static str {
    match state {
        MotionState::Idle => "Idle",
        MotionState::Running => "Run",
        MotionState::Held => "Hold",
        MotionState::Alarm => "Alarm",
    }
}

pub fn format_status_report(state: MotionState, position_mm: [f64; 4]) -> String {
    let [x, y, z, a] = position_mm;
    format!(
        "<{}|MPos:{:.3},{:.3},{:.3},{:.3}|WPos:{:.3},{:.3},{:.3},{:.3}>\r\n",
        state_name(state),
        x, y, z, a,
        x, y, z, a,
    )
}
