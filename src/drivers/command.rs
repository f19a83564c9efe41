//! Host text command protocol.
//!
//! One command per `\n`-terminated line:
//! - `DRIVE:<left>,<right>` signed wheel requests in percent
//! - any other non-empty line: stop (what remains of the one-letter protocol)

use crate::config::MAX_LINE_LEN;
use crate::state::MotionMode;

pub type CommandLine = heapless::String<MAX_LINE_LEN>;

const DRIVE_PREFIX: &str = "DRIVE:";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostCommand {
    Drive { left: i32, right: i32 },
    Stop,
}

impl HostCommand {
    /// Parse one line. `None` means the line carries nothing to act on
    /// (blank, or a DRIVE with no `,` separator) and must be ignored.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some(values) = line.strip_prefix(DRIVE_PREFIX) else {
            return Some(Self::Stop);
        };
        let (left, right) = values.split_once(',')?;
        match (left.trim().parse::<i32>(), right.trim().parse::<i32>()) {
            (Ok(left), Ok(right)) => Some(Self::Drive { left, right }),
            // Unreadable wheel values resolve to the safe state
            _ => Some(Self::Stop),
        }
    }

    /// Motion mode and speed percentage (not yet clamped) for this command.
    pub fn resolve(self) -> (MotionMode, i32) {
        match self {
            Self::Drive { left, right } => {
                let speed = left.unsigned_abs().max(right.unsigned_abs()).min(100) as i32;
                (MotionMode::from_wheels(left, right), speed)
            }
            Self::Stop => (MotionMode::Stop, 0),
        }
    }
}

/// Splits a received byte stream into command lines.
///
/// `\r` is dropped, lines longer than `MAX_LINE_LEN` are discarded up to the
/// next newline, and lines that are not valid UTF-8 are discarded.
pub struct LineBuffer {
    buffer: heapless::Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buffer: heapless::Vec::new(),
            overflowed: false,
        }
    }

    pub fn push_byte(&mut self, b: u8) -> Option<CommandLine> {
        match b {
            b'\n' => {
                let overflowed = core::mem::replace(&mut self.overflowed, false);
                let line = if overflowed {
                    crate::log_warn!("host line longer than {} bytes dropped", MAX_LINE_LEN);
                    None
                } else {
                    core::str::from_utf8(&self.buffer)
                        .ok()
                        .and_then(|s| CommandLine::try_from(s).ok())
                };
                self.buffer.clear();
                line
            }
            b'\r' => None,
            _ => {
                if self.buffer.push(b).is_err() {
                    self.overflowed = true;
                }
                None
            }
        }
    }

    /// Feed a chunk, calling `on_line` for every completed line.
    pub fn push_bytes(&mut self, data: &[u8], mut on_line: impl FnMut(CommandLine)) {
        for &b in data {
            if let Some(line) = self.push_byte(b) {
                on_line(line);
            }
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode_of(line: &str) -> Option<MotionMode> {
        HostCommand::parse(line).map(|c| c.resolve().0)
    }

    #[test]
    fn drive_sign_table() {
        assert_eq!(mode_of("DRIVE:30,30"), Some(MotionMode::Forward));
        assert_eq!(mode_of("DRIVE:-30,-30"), Some(MotionMode::Backward));
        assert_eq!(mode_of("DRIVE:-30,30"), Some(MotionMode::TurnLeft));
        assert_eq!(mode_of("DRIVE:30,-30"), Some(MotionMode::TurnRight));
        assert_eq!(mode_of("DRIVE:0,30"), Some(MotionMode::Stop));
        assert_eq!(mode_of("DRIVE:0,0"), Some(MotionMode::Stop));
    }

    #[test]
    fn drive_speed_is_max_magnitude_clamped() {
        assert_eq!(HostCommand::parse("DRIVE:80,80").map(|c| c.resolve()), Some((MotionMode::Forward, 80)));
        assert_eq!(HostCommand::parse("DRIVE:-50,50").map(|c| c.resolve()), Some((MotionMode::TurnLeft, 50)));
        assert_eq!(HostCommand::parse("DRIVE:20,-70").map(|c| c.resolve().1), Some(70));
        assert_eq!(HostCommand::parse("DRIVE:150,150").map(|c| c.resolve().1), Some(100));
        assert_eq!(
            HostCommand::parse("DRIVE:-2147483648,5").map(|c| c.resolve()),
            Some((MotionMode::TurnLeft, 100))
        );
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(
            HostCommand::parse("  DRIVE:40,40 \r\n"),
            Some(HostCommand::Drive { left: 40, right: 40 })
        );
        assert_eq!(
            HostCommand::parse("DRIVE: 40 , -40"),
            Some(HostCommand::Drive { left: 40, right: -40 })
        );
    }

    #[test]
    fn malformed_lines_never_move_the_robot() {
        assert_eq!(HostCommand::parse(""), None);
        assert_eq!(HostCommand::parse("   "), None);
        assert_eq!(HostCommand::parse("DRIVE:50"), None);
        assert_eq!(HostCommand::parse("DRIVE:abc"), None);
        assert_eq!(HostCommand::parse("DRIVE:abc,def"), Some(HostCommand::Stop));
        assert_eq!(HostCommand::parse("DRIVE:,"), Some(HostCommand::Stop));
    }

    #[test]
    fn legacy_letters_force_stop() {
        for line in ["F", "B", "L", "R", "S", "x", "drive:10,10"] {
            assert_eq!(HostCommand::parse(line), Some(HostCommand::Stop), "{line}");
        }
    }

    #[test]
    fn line_buffer_splits_and_strips_cr() {
        let mut lines = LineBuffer::new();
        let mut got: Vec<CommandLine> = Vec::new();
        lines.push_bytes(b"DRIVE:10,10\r\nDRI", |l| got.push(l));
        lines.push_bytes(b"VE:-5,5\n\n", |l| got.push(l));

        assert_eq!(got.len(), 3);
        assert_eq!(got[0].as_str(), "DRIVE:10,10");
        assert_eq!(got[1].as_str(), "DRIVE:-5,5");
        assert_eq!(got[2].as_str(), "");
    }

    #[test]
    fn line_buffer_drops_overlong_line_then_recovers() {
        let mut lines = LineBuffer::new();
        let mut got: Vec<CommandLine> = Vec::new();
        let long = [b'A'; MAX_LINE_LEN + 10];
        lines.push_bytes(&long, |l| got.push(l));
        lines.push_bytes(b"\nDRIVE:1,1\n", |l| got.push(l));

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].as_str(), "DRIVE:1,1");
    }

    #[test]
    fn line_buffer_drops_invalid_utf8() {
        let mut lines = LineBuffer::new();
        let mut got: Vec<CommandLine> = Vec::new();
        lines.push_bytes(&[0xFF, 0xFE, b'\n'], |l| got.push(l));
        lines.push_bytes(b"S\n", |l| got.push(l));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].as_str(), "S");
    }
}
