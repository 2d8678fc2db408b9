/*!
Builders and parsers for the radar's wire frames

Byte-level helpers for tests: data frames with the sensor's sign/bias
encoding, acknowledgement frames, and an incremental parser for the command
frames a host writes.
*/

pub const DATA_HEADER: [u8; 4] = [0xAA, 0xFF, 0x03, 0x00];
pub const DATA_FOOTER: [u8; 2] = [0x55, 0xCC];
pub const DATA_FRAME_LEN: usize = 30;
pub const CMD_HEADER: [u8; 4] = [0xFD, 0xFC, 0xFB, 0xFA];
pub const CMD_FOOTER: [u8; 4] = [0x04, 0x03, 0x02, 0x01];

pub const ENTER_CONFIG: u8 = 0xFF;
pub const EXIT_CONFIG: u8 = 0xFE;

/// A target as the simulated sensor reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimTarget {
    pub x_mm: i16,
    pub y_mm: i16,
    pub speed: i16,
}

impl SimTarget {
    pub fn at(x_mm: i16, y_mm: i16) -> Self {
        Self { x_mm, y_mm, speed: 0 }
    }
}

/// Sign bit plus 15-bit magnitude (X and speed fields).
pub fn encode_signed(v: i16) -> [u8; 2] {
    let raw = if v < 0 { 0x8000 | v.unsigned_abs() } else { v as u16 };
    raw.to_le_bytes()
}

/// Y field: biased by 0x8000. Note that a result of 0 means "no target".
pub fn encode_y(v: i16) -> [u8; 2] {
    (v as u16).wrapping_add(0x8000).to_le_bytes()
}

/// Data frame with up to three targets; remaining slots are empty.
pub fn data_frame(targets: &[SimTarget]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(DATA_FRAME_LEN);
    frame.extend_from_slice(&DATA_HEADER);
    for slot in 0..3 {
        match targets.get(slot) {
            Some(t) => {
                frame.extend_from_slice(&encode_signed(t.x_mm));
                frame.extend_from_slice(&encode_y(t.y_mm));
                frame.extend_from_slice(&encode_signed(t.speed));
                frame.extend_from_slice(&[0x68, 0x01]);
            }
            None => frame.extend_from_slice(&[0; 8]),
        }
    }
    frame.extend_from_slice(&DATA_FOOTER);
    frame
}

/// Same frame with its footer overwritten.
pub fn corrupt_footer(mut frame: Vec<u8>) -> Vec<u8> {
    let n = frame.len();
    if n >= 2 {
        frame[n - 2] = 0x00;
        frame[n - 1] = 0x00;
    }
    frame
}

/// Acknowledgement for command `id`.
pub fn ack_frame(id: u8, status: u16, extra: &[u8]) -> Vec<u8> {
    let body_len = (4 + extra.len()) as u16;
    let mut frame = CMD_HEADER.to_vec();
    frame.extend_from_slice(&body_len.to_le_bytes());
    frame.extend_from_slice(&[id, 0x01]);
    frame.extend_from_slice(&status.to_le_bytes());
    frame.extend_from_slice(extra);
    frame.extend_from_slice(&CMD_FOOTER);
    frame
}

/// Command frame as a host would send it.
pub fn command_frame(id: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = CMD_HEADER.to_vec();
    frame.extend_from_slice(&((2 + payload.len()) as u16).to_le_bytes());
    frame.extend_from_slice(&[id, 0x00]);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&CMD_FOOTER);
    frame
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub id: u8,
    pub payload: Vec<u8>,
}

/// Pulls complete command frames out of a byte stream.
#[derive(Debug, Default)]
pub struct CommandParser {
    buf: Vec<u8>,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) -> Vec<ParsedCommand> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();
        loop {
            let Some(start) = self.buf.windows(4).position(|w| w == CMD_HEADER) else {
                let keep = self.buf.len().min(3);
                self.buf.drain(..self.buf.len() - keep);
                break;
            };
            self.buf.drain(..start);
            if self.buf.len() < 6 {
                break;
            }
            let intra = u16::from_le_bytes([self.buf[4], self.buf[5]]) as usize;
            let total = 6 + intra + 4;
            if intra < 2 {
                self.buf.drain(..1);
                continue;
            }
            if self.buf.len() < total {
                break;
            }
            if self.buf[total - 4..total] != CMD_FOOTER || self.buf[7] != 0x00 {
                log::warn!("[mock-sensor] dropping malformed command frame");
                self.buf.drain(..1);
                continue;
            }
            out.push(ParsedCommand {
                id: self.buf[6],
                payload: self.buf[8..6 + intra].to_vec(),
            });
            self.buf.drain(..total);
        }
        out
    }
}
