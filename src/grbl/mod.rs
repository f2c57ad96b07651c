//! Host-side GRBL surface: G-code line tokenizing, serial framing,
//! settings persistence, status reports, and the `error:`/`ALARM:` wire
//! vocabulary. Everything below the parsed-move boundary lives in
//! `grbl4-core`; this module is the thin layer that turns bytes on a wire
//! into calls against that crate and back again.

pub mod controller;
pub mod error;
pub mod gcode;
pub mod settings_io;
pub mod status;
pub mod transport;

pub use controller::Controller;
pub use error::GrblErrorCode;
pub use gcode::{GCodeError, ParsedLine, Tokenizer};
pub use settings_io::SettingsStore;
pub use status::format_status_report;
pub use transport::{FrameEvent, LineFramer, RealtimeCommand};
