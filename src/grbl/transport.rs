//! Serial line framing: splits an incoming byte stream into complete
//! G-code lines while pulling the single-byte realtime controls
//! (`?`, `!`, `~`, `0x18`) out of the stream the instant they arrive,
//! ahead of whatever line is still being buffered — mirroring the one
//! property that actually matters about GRBL's wire protocol: realtime
//! commands bypass the line-oriented command channel entirely.
//!
//! Grounded on `src/hardware.rs`'s `tokio_serial::SerialStream` use for
//! the underlying transport; the byte-level framing state machine here is
//! new, there being no teacher file that modeled GRBL's specific
//! realtime-vs-line split.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeCommand {
    StatusReportQuery,
    CycleStart,
    FeedHold,
    SoftReset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    Realtime(RealtimeCommand),
    Line(String),
}

#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte and returns the event it produced, if any. A
    /// realtime-control byte never touches the line buffer, even if one
    /// is in progress.
    pub fn push_byte(&mut self, byte: u8) -> Option<FrameEvent> {
        match byte {
            b'?' => Some(FrameEvent::Realtime(RealtimeCommand::StatusReportQuery)),
            b'~' => Some(FrameEvent::Realtime(RealtimeCommand::CycleStart)),
            b'!' => Some(FrameEvent::Realtime(RealtimeCommand::FeedHold)),
            0x18 => Some(FrameEvent::Realtime(RealtimeCommand::SoftReset)),
            b'\n' => {
                let line = std::mem::take(&mut self.buffer);
                Some(FrameEvent::Line(line.trim_end_matches('\r').to_string()))
            }
            other => {
                self.buffer.push(other as char);
                None
            }
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<FrameEvent> {
        bytes.iter().filter_map(|&b| self.push_byte(b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_a_complete_line() {
        let mut framer = LineFramer::new();
        let events = framer.push_bytes(b"G1 X10\n");
        assert_eq!(events, vec![FrameEvent::Line("G1 X10".to_string())]);
    }

    #[test]
    fn realtime_byte_bypasses_an_in_progress_line() {
        let mut framer = LineFramer::new();
        let events = framer.push_bytes(b"G1 X1?0 Y2\n");
        assert_eq!(
            events,
            vec![
                FrameEvent::Realtime(RealtimeCommand::StatusReportQuery),
                FrameEvent::Line("G1 X10 Y2".to_string()),
            ]
        );
    }

    #[test]
    fn soft_reset_byte_is_recognized() {
        let mut framer = LineFramer::new();
        let events = framer.push_bytes(&[0x18]);
        assert_eq!(events, vec![FrameEvent::Realtime(RealtimeCommand::SoftReset)]);
    }
}
