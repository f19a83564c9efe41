use core::fmt::{self, Write};

/// Start-of-packet marker prefixing every binary frame
pub const SOP: [u8; 2] = [0xAA, 0x55];
/// Serialized record length, checksum included
pub const RECORD_LEN: usize = 29;
/// Marker + record
pub const FRAME_LEN: usize = SOP.len() + RECORD_LEN;

pub type VerboseLine = heapless::String<96>;

/// How telemetry leaves the firmware. Fixed at build time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TelemetryFormat {
    /// `Pitch: .., Roll: .., EncL: .., EncR: .., Batt: ..mV` lines
    Verbose,
    /// `0xAA 0x55` + 29-byte little-endian record
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    Checksum { expected: u8, found: u8 },
    Length(usize),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checksum { expected, found } => {
                write!(f, "checksum mismatch: expected {:#04x}, found {:#04x}", expected, found)
            }
            Self::Length(len) => write!(f, "record must be {} bytes, got {}", RECORD_LEN, len),
        }
    }
}

/// Values captured in one control cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TelemetrySample {
    pub timestamp_us: i64,
    /// Degrees, NaN while the inertial sensor is unavailable
    pub pitch: f32,
    /// Degrees, NaN while the inertial sensor is unavailable
    pub roll: f32,
    pub gyro_z_raw: i16,
    pub left_encoder: i32,
    pub right_encoder: i32,
    pub battery_mv: u16,
}

impl TelemetrySample {
    /// Field layout on the wire:
    ///
    /// | off | type | field         |
    /// |-----|------|---------------|
    /// | 0   | i64  | timestamp_us  |
    /// | 8   | f32  | pitch         |
    /// | 12  | f32  | roll          |
    /// | 16  | i16  | gyro_z_raw    |
    /// | 18  | i32  | left_encoder  |
    /// | 22  | i32  | right_encoder |
    /// | 26  | u16  | battery_mv    |
    /// | 28  | u8   | checksum      |
    fn write_fields(&self, buf: &mut [u8; RECORD_LEN]) {
        buf[0..8].copy_from_slice(&self.timestamp_us.to_le_bytes());
        buf[8..12].copy_from_slice(&self.pitch.to_le_bytes());
        buf[12..16].copy_from_slice(&self.roll.to_le_bytes());
        buf[16..18].copy_from_slice(&self.gyro_z_raw.to_le_bytes());
        buf[18..22].copy_from_slice(&self.left_encoder.to_le_bytes());
        buf[22..26].copy_from_slice(&self.right_encoder.to_le_bytes());
        buf[26..28].copy_from_slice(&self.battery_mv.to_le_bytes());
    }

    fn read_fields(buf: &[u8; RECORD_LEN]) -> Self {
        let mut i64_buf = [0u8; 8];
        i64_buf.copy_from_slice(&buf[0..8]);
        Self {
            timestamp_us: i64::from_le_bytes(i64_buf),
            pitch: f32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            roll: f32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
            gyro_z_raw: i16::from_le_bytes([buf[16], buf[17]]),
            left_encoder: i32::from_le_bytes([buf[18], buf[19], buf[20], buf[21]]),
            right_encoder: i32::from_le_bytes([buf[22], buf[23], buf[24], buf[25]]),
            battery_mv: u16::from_le_bytes([buf[26], buf[27]]),
        }
    }
}

/// XOR of every byte
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// A sample with its checksum computed over the serialized bytes.
/// Read-only once sealed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TelemetryRecord {
    sample: TelemetrySample,
    checksum: u8,
}

impl TelemetryRecord {
    pub fn seal(sample: TelemetrySample) -> Self {
        let mut buf = [0u8; RECORD_LEN];
        sample.write_fields(&mut buf);
        let checksum = xor_checksum(&buf[..RECORD_LEN - 1]);
        Self { sample, checksum }
    }

    pub fn sample(&self) -> &TelemetrySample {
        &self.sample
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        self.sample.write_fields(&mut buf);
        buf[RECORD_LEN - 1] = self.checksum;
        buf
    }

    /// `[SOP] [record]`
    pub fn to_frame(&self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[..SOP.len()].copy_from_slice(&SOP);
        frame[SOP.len()..].copy_from_slice(&self.to_bytes());
        frame
    }

    /// Decode a record (without marker) and verify its checksum.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TelemetryError> {
        let buf: &[u8; RECORD_LEN] = bytes
            .try_into()
            .map_err(|_| TelemetryError::Length(bytes.len()))?;
        let expected = xor_checksum(&buf[..RECORD_LEN - 1]);
        let found = buf[RECORD_LEN - 1];
        if expected != found {
            return Err(TelemetryError::Checksum { expected, found });
        }
        Ok(Self {
            sample: TelemetrySample::read_fields(buf),
            checksum: found,
        })
    }

    pub fn write_verbose(&self, out: &mut VerboseLine) -> fmt::Result {
        let s = &self.sample;
        writeln!(
            out,
            "Pitch: {:.2}, Roll: {:.2}, EncL: {}, EncR: {}, Batt: {}mV",
            s.pitch, s.roll, s.left_encoder, s.right_encoder, s.battery_mv
        )
    }
}

// ── Receiver side ─────────────────────────────────────────────────────────────

/// Byte-at-a-time frame decoder for the binary stream.
///
/// Locks onto `0xAA 0x55`, collects one record and checks it. A record that
/// fails the checksum is dropped and the search for the next marker restarts
/// inside the rejected bytes, so a marker hidden in a corrupt record is not lost.
pub struct FrameDecoder {
    buffer: heapless::Vec<u8, FRAME_LEN>,
    frames: u32,
    checksum_errors: u32,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: heapless::Vec::new(),
            frames: 0,
            checksum_errors: 0,
        }
    }

    pub fn push_byte(&mut self, b: u8) -> Option<TelemetryRecord> {
        let _ = self.buffer.push(b);
        self.realign();

        if self.buffer.len() < FRAME_LEN {
            return None;
        }

        match TelemetryRecord::from_bytes(&self.buffer[SOP.len()..]) {
            Ok(record) => {
                self.buffer.clear();
                self.frames = self.frames.wrapping_add(1);
                Some(record)
            }
            Err(_) => {
                self.checksum_errors = self.checksum_errors.wrapping_add(1);
                // Drop the first marker byte and rescan what is left
                self.discard(1);
                self.realign();
                None
            }
        }
    }

    pub fn push_bytes(&mut self, data: &[u8], mut on_record: impl FnMut(TelemetryRecord)) {
        for &b in data {
            if let Some(record) = self.push_byte(b) {
                on_record(record);
            }
        }
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn checksum_errors(&self) -> u32 {
        self.checksum_errors
    }

    /// Shift the buffer until it starts with a (possibly partial) marker.
    fn realign(&mut self) {
        loop {
            match self.buffer.as_slice() {
                [] => return,
                [first] if *first == SOP[0] => return,
                [first, second, ..] if *first == SOP[0] && *second == SOP[1] => return,
                _ => self.discard(1),
            }
        }
    }

    fn discard(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        let len = self.buffer.len();
        self.buffer.copy_within(n..len, 0);
        self.buffer.truncate(len - n);
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
