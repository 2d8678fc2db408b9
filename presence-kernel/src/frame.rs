//! Data frame decoder.
//!
//! Frame layout: header `AA FF 03 00`, 3 target records of 8 bytes
//! (x, y, speed, resolution; each little-endian u16), footer `55 CC`.
//! Bytes arrive in arbitrary chunks; partial frames are held until complete.

use crate::buffer::FrameBuffer;
use crate::codec::{decode_signed, decode_y};
use crate::models::{Report, Target, TARGET_SLOTS};

pub const DATA_HEADER: [u8; 4] = [0xAA, 0xFF, 0x03, 0x00];
pub const DATA_FOOTER: [u8; 2] = [0x55, 0xCC];
pub const TARGET_RECORD_LEN: usize = 8;
pub const DATA_PAYLOAD_LEN: usize = TARGET_SLOTS * TARGET_RECORD_LEN;
pub const DATA_FRAME_LEN: usize = DATA_HEADER.len() + DATA_PAYLOAD_LEN + DATA_FOOTER.len();

/// Headerless runs longer than this are logged when dropped.
const NOISE_LOG_THRESHOLD: usize = 8192;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    /// Bytes discarded while looking for a valid frame.
    pub bytes_discarded: u64,
    /// Header matches rejected by a bad footer.
    pub bad_footers: u64,
}

#[derive(Debug)]
pub struct FrameDecoder {
    buffer: FrameBuffer,
    report: Report,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: FrameBuffer::with_capacity(1024),
            report: Report::default(),
            stats: DecoderStats::default(),
        }
    }

    /// Appends `data` and decodes every complete frame now available.
    /// Returns true if at least one frame was decoded by this call.
    pub fn feed(&mut self, data: &[u8]) -> bool {
        if data.is_empty() {
            return false;
        }
        self.buffer.extend(data);

        // Frames are drained before anything is compacted, so the buffer
        // only ever holds a partial frame or a possible split header.
        let mut decoded = false;
        loop {
            let Some(pos) = self.buffer.find(&DATA_HEADER) else {
                // A header may be split across feeds.
                let dropped = self.buffer.retain_tail(DATA_HEADER.len() - 1);
                self.stats.bytes_discarded += dropped as u64;
                if dropped > NOISE_LOG_THRESHOLD {
                    tracing::debug!(dropped, "long run without a frame header discarded");
                }
                break;
            };
            if pos > 0 {
                self.buffer.consume(pos);
                self.stats.bytes_discarded += pos as u64;
            }
            if self.buffer.len() < DATA_FRAME_LEN {
                break;
            }

            let bytes = self.buffer.as_slice();
            let footer_at = DATA_HEADER.len() + DATA_PAYLOAD_LEN;
            if bytes[footer_at..footer_at + DATA_FOOTER.len()] != DATA_FOOTER {
                // Misaligned or corrupted: slide by one byte and rescan.
                self.buffer.consume(1);
                self.stats.bad_footers += 1;
                self.stats.bytes_discarded += 1;
                continue;
            }

            let mut payload = [0u8; DATA_PAYLOAD_LEN];
            payload.copy_from_slice(&bytes[DATA_HEADER.len()..footer_at]);
            self.report = decode_payload(&payload);
            self.buffer.consume(DATA_FRAME_LEN);
            self.stats.frames_decoded += 1;
            decoded = true;
        }
        decoded
    }

    /// Most recent decoded report (all-zero before the first frame).
    pub fn latest_report(&self) -> &Report {
        &self.report
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes currently held waiting for the rest of a frame.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drops buffered bytes, e.g. after the link was used for commands.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Decodes the 24-byte payload of a data frame.
pub fn decode_payload(payload: &[u8; DATA_PAYLOAD_LEN]) -> Report {
    let mut report = Report::default();
    for (slot, record) in payload.chunks_exact(TARGET_RECORD_LEN).enumerate() {
        report.targets[slot] = decode_target(record);
    }
    report.target_count = report.present_targets().count() as u8;
    report.occupied = report.target_count > 0;
    report
}

fn decode_target(record: &[u8]) -> Target {
    // Resolution (record[6..8]) is not used.
    match decode_y(record[2], record[3]) {
        Some(y_mm) => Target {
            present: true,
            x_mm: decode_signed(record[0], record[1]),
            y_mm,
            speed: decode_signed(record[4], record[5]),
        },
        None => Target::default(),
    }
}
