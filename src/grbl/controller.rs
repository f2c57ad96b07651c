//! Top-level orchestrator: owns the motion pipeline and settings store,
//! turns a tokenized G-code line or a realtime byte into wire responses.
//! Replaces the teacher's `src/printer.rs` `Printer` — same "own the
//! subsystems, drive them from one entry point" shape, narrowed to a
//! synchronous call interface since the motion pipeline underneath has
//! none of the async I/O a 3D-printer `Printer` juggles.

use grbl4_core::manager::MotionState;
use grbl4_core::{expand_arc, Condition, MotionManager, Plane, Position, Settings, AXES};
use tracing::{info, warn};

use crate::grbl::error::{GrblAlarmCode, GrblErrorCode};
use crate::grbl::gcode::{ParsedLine, Tokenizer};
use crate::grbl::settings_io::SettingsStore;
use crate::grbl::status::format_status_report;
use crate::grbl::transport::RealtimeCommand;

pub struct Controller {
    motion: MotionManager,
    settings: SettingsStore,
    current_target: Position,
}

impl Controller {
    pub fn new(settings: SettingsStore) -> Self {
        let motion_settings = clone_settings(settings.settings());
        Self {
            motion: MotionManager::new(grbl4_core::Planner::new(16, motion_settings), 64),
            settings,
            current_target: [0.0; AXES],
        }
    }

    pub fn motion(&self) -> &MotionManager {
        &self.motion
    }

    pub fn motion_mut(&mut self) -> &mut MotionManager {
        &mut self.motion
    }

    /// Advances the background tick; call this on a fixed period from the
    /// serial-loop driver.
    pub fn tick(&mut self) {
        self.motion.tick();
    }

    /// Handles one already-framed G-code line, returning the response
    /// line(s) to write back to the wire (`ok`, or `error:N`).
    pub fn handle_line(&mut self, line: &str) -> Vec<String> {
        if line.trim().is_empty() {
            return vec!["ok".to_string()];
        }
        if let Some(rest) = line.strip_prefix('$') {
            return vec![self.handle_dollar_command(rest)];
        }

        let parsed = match Tokenizer::tokenize(line) {
            Ok(p) => p,
            Err(e) => {
                let code: GrblErrorCode = e.into();
                warn!(%line, error = %code.wire_line(), "rejected malformed line");
                return vec![code.wire_line()];
            }
        };
        if parsed.words.is_empty() {
            return vec!["ok".to_string()];
        }

        match self.dispatch_motion(&parsed) {
            Ok(()) => vec!["ok".to_string()],
            Err(code) => {
                warn!(%line, error = %code.wire_line(), "rejected command");
                vec![code.wire_line()]
            }
        }
    }

    /// Handles a realtime control byte; returns the immediate response
    /// line, if the control produces one (only `?` does).
    pub fn handle_realtime(&mut self, cmd: RealtimeCommand) -> Option<String> {
        match cmd {
            RealtimeCommand::StatusReportQuery => {
                Some(format_status_report(self.motion.state(), self.motion.position_mm()))
            }
            RealtimeCommand::FeedHold => {
                self.motion.feed_hold();
                None
            }
            RealtimeCommand::CycleStart => {
                self.motion.cycle_start();
                None
            }
            RealtimeCommand::SoftReset => {
                info!("soft reset: aborting in-flight motion");
                self.motion.emergency_stop();
                self.current_target = self.motion.position_mm();
                Some(GrblAlarmCode::AbortDuringCycle.wire_line() + "\r\n")
            }
        }
    }

    fn handle_dollar_command(&mut self, rest: &str) -> String {
        if rest.trim() == "$" {
            return self.settings.dump().join("\r\n") + "\r\nok";
        }
        if rest.trim() == "X" {
            self.motion.reset_alarm();
            return "ok".to_string();
        }
        match self.settings.apply_dollar_command(&format!("${rest}")) {
            Ok(_) => "ok".to_string(),
            Err(e) => {
                warn!(command = %rest, error = %e, "rejected settings command");
                GrblErrorCode::InvalidStatement.wire_line()
            }
        }
    }

    fn dispatch_motion(&mut self, line: &ParsedLine) -> Result<(), GrblErrorCode> {
        let Some(g) = line.get('G') else {
            return Ok(());
        };

        let mut target = self.current_target;
        for (letter, axis) in [('X', 0), ('Y', 1), ('Z', 2), ('A', 3)] {
            if let Some(v) = line.get(letter) {
                target[axis] = v;
            }
        }
        let feed_rate = line.get('F').unwrap_or(self.motion.planner_mut().settings().max_velocity_mm_per_min(0));

        match g as u32 {
            0 => {
                self.motion
                    .queue_move(target, feed_rate, Condition { rapid: true, ..Condition::default() })?;
                self.current_target = target;
                Ok(())
            }
            1 => {
                self.motion.queue_move(target, feed_rate, Condition::default())?;
                self.current_target = target;
                Ok(())
            }
            2 | 3 => {
                let offset = (line.get('I').unwrap_or(0.0), line.get('J').unwrap_or(0.0));
                let clockwise = g as u32 == 2;
                expand_arc(
                    self.motion.planner_mut(),
                    Plane::Xy,
                    self.current_target,
                    target,
                    offset,
                    clockwise,
                    feed_rate,
                    Condition::default(),
                )
                .map_err(GrblErrorCode::from)?;
                self.current_target = target;
                self.motion.note_external_enqueue();
                Ok(())
            }
            _ => Err(GrblErrorCode::UnsupportedCommand),
        }
    }
}

fn clone_settings(settings: &Settings) -> Settings {
    let mut cloned = Settings::new(
        std::array::from_fn(|a| settings.steps_per_mm(a)),
        std::array::from_fn(|a| settings.max_velocity_mm_per_min(a)),
        std::array::from_fn(|a| settings.acceleration_mm_per_s2(a)),
    );
    for axis in 0..AXES {
        let _ = cloned.set_setting(130 + axis as u32, settings.max_travel_mm(axis));
    }
    let _ = cloned.set_setting(11, settings.junction_deviation_mm());
    let _ = cloned.set_setting(12, settings.arc_tolerance_mm());
    cloned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> Controller {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.toml")).unwrap();
        std::mem::forget(dir);
        Controller::new(store)
    }

    #[test]
    fn accepts_a_linear_move_and_returns_ok() {
        let mut c = controller();
        let response = c.handle_line("G1 X10 F600");
        assert_eq!(response, vec!["ok".to_string()]);
        assert_eq!(c.motion().state(), MotionState::Running);
    }

    #[test]
    fn rejects_unsupported_g_command() {
        let mut c = controller();
        let response = c.handle_line("G99 X1");
        assert_eq!(response, vec!["error:20".to_string()]);
    }

    #[test]
    fn status_query_reports_idle_at_start() {
        let mut c = controller();
        let response = c.handle_realtime(RealtimeCommand::StatusReportQuery).unwrap();
        assert!(response.starts_with("<Idle|"));
    }

    #[test]
    fn dollar_x_clears_an_alarm() {
        let mut c = controller();
        c.handle_line("G1 X100 F3000");
        c.tick();
        c.handle_realtime(RealtimeCommand::SoftReset);
        assert_eq!(c.motion().state(), MotionState::Alarm);
        let response = c.handle_line("$X");
        assert_eq!(response, vec!["ok".to_string()]);
        assert_eq!(c.motion().state(), MotionState::Idle);
    }

    #[test]
    fn dollar_dollar_dumps_settings() {
        let mut c = controller();
        let response = c.handle_line("$$");
        assert_eq!(response.len(), 1);
        assert!(response[0].contains("$100="));
        assert!(response[0].ends_with("ok"));
    }
}
