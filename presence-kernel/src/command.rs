/**
 * COMMAND CHANNEL - Request/acknowledgement exchange with the sensor
 *
 * ROLE:
 * Sends configuration commands over the same link the ingestion loop reads
 * data frames from, and waits for the matching acknowledgement.
 *
 * SEQUENCE (one caller at a time):
 * - ask the ingestion loop to pause and wait for it (bounded)
 * - enter configuration mode (0xFF), command, exit configuration mode (0xFE)
 * - resume the ingestion loop, on every path
 *
 * WIRE:
 *   request: FD FC FB FA | len u16 LE | id 00 | payload | 04 03 02 01
 *   ack:     FD FC FB FA | len u16 LE | id 01 | status u16 LE | extra | 04 03 02 01
 * `len` counts the bytes between the length field and the footer.
 */

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, timeout_at, Instant};

use crate::buffer::FrameBuffer;
use crate::handoff::{Handoff, PauseTimeout};
use crate::health::HealthTracker;
use crate::link::SharedLink;

pub const CMD_HEADER: [u8; 4] = [0xFD, 0xFC, 0xFB, 0xFA];
pub const CMD_FOOTER: [u8; 4] = [0x04, 0x03, 0x02, 0x01];
pub const MAX_FRAME_LEN: usize = 64;
/// Header, length, command word and footer.
const FRAME_OVERHEAD: usize = 4 + 2 + 2 + 4;
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - FRAME_OVERHEAD;
/// Ack body (command word, status, extra bytes) of a frame at the size limit.
const MAX_ACK_BODY_LEN: usize = MAX_FRAME_LEN - CMD_HEADER.len() - 2 - CMD_FOOTER.len();
/// Command word and status.
const MIN_ACK_BODY_LEN: usize = 4;

pub const ENTER_CONFIG: u8 = 0xFF;
pub const EXIT_CONFIG: u8 = 0xFE;
const ENTER_CONFIG_PAYLOAD: [u8; 2] = [0x01, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimings {
    pub ack_timeout: Duration,
    pub step_delay: Duration,
    pub pause_timeout: Duration,
}

impl Default for CommandTimings {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(200),
            step_delay: Duration::from_millis(50),
            pause_timeout: Duration::from_millis(500),
        }
    }
}

/// A successful acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub command: u8,
    /// Bytes after the status word (firmware version, buffer size...).
    pub extra: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error(transparent)]
    PauseTimeout(#[from] PauseTimeout),
    #[error("no acknowledgement for command {command:#04x} within {timeout:?}")]
    Timeout { command: u8, timeout: Duration },
    #[error("acknowledgement for command {got:#04x}, expected {expected:#04x}")]
    IdMismatch { expected: u8, got: u8 },
    #[error("command {command:#04x} rejected with status {status:#06x}")]
    Status { command: u8, status: u16 },
    #[error("malformed acknowledgement: {0}")]
    MalformedAck(&'static str),
    #[error("link i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds a command frame. Fails without side effects on oversized payloads.
pub fn build_frame(id: u8, payload: &[u8]) -> Result<Vec<u8>, CommandError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(CommandError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    let intra_len = (2 + payload.len()) as u16;
    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    frame.extend_from_slice(&CMD_HEADER);
    frame.extend_from_slice(&intra_len.to_le_bytes());
    frame.extend_from_slice(&[id, 0x00]);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&CMD_FOOTER);
    Ok(frame)
}

/// Incremental acknowledgement parser. Bytes before the ack header (data
/// frames still in flight) are skipped.
#[derive(Debug)]
pub struct AckScanner {
    expected: u8,
    buffer: FrameBuffer,
}

impl AckScanner {
    pub fn new(expected: u8) -> Self {
        Self {
            expected,
            buffer: FrameBuffer::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Returns `None` until a complete ack frame has been seen.
    pub fn push(&mut self, data: &[u8]) -> Option<Result<Ack, CommandError>> {
        self.buffer.extend(data);

        let Some(pos) = self.buffer.find(&CMD_HEADER) else {
            self.buffer.retain_tail(CMD_HEADER.len() - 1);
            return None;
        };
        self.buffer.consume(pos);

        let bytes = self.buffer.as_slice();
        if bytes.len() < CMD_HEADER.len() + 2 {
            return None;
        }
        let body_len = usize::from(u16::from_le_bytes([bytes[4], bytes[5]]));
        if !(MIN_ACK_BODY_LEN..=MAX_ACK_BODY_LEN).contains(&body_len) {
            return Some(Err(CommandError::MalformedAck("length out of range")));
        }
        let total = CMD_HEADER.len() + 2 + body_len + CMD_FOOTER.len();
        if bytes.len() < total {
            return None;
        }
        if bytes[total - CMD_FOOTER.len()..total] != CMD_FOOTER {
            return Some(Err(CommandError::MalformedAck("bad footer")));
        }

        let body = &bytes[6..6 + body_len];
        let outcome = self.parse_body(body);
        self.buffer.consume(total);
        Some(outcome)
    }

    fn parse_body(&self, body: &[u8]) -> Result<Ack, CommandError> {
        if body[1] != 0x01 {
            return Err(CommandError::MalformedAck("not an acknowledgement word"));
        }
        if body[0] != self.expected {
            return Err(CommandError::IdMismatch {
                expected: self.expected,
                got: body[0],
            });
        }
        let status = u16::from_le_bytes([body[2], body[3]]);
        if status != 0 {
            return Err(CommandError::Status {
                command: self.expected,
                status,
            });
        }
        Ok(Ack {
            command: self.expected,
            extra: body[4..].to_vec(),
        })
    }
}

/// Writes one frame and waits for the acknowledgement of `id`.
async fn transact<L>(link: &mut L, id: u8, frame: &[u8], ack_timeout: Duration) -> Result<Ack, CommandError>
where
    L: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    link.write_all(frame).await?;
    link.flush().await?;

    let deadline = Instant::now() + ack_timeout;
    let mut scanner = AckScanner::new(id);
    let mut chunk = [0u8; MAX_FRAME_LEN];
    loop {
        let n = match timeout_at(deadline, link.read(&mut chunk)).await {
            Err(_) => {
                return Err(CommandError::Timeout {
                    command: id,
                    timeout: ack_timeout,
                })
            }
            Ok(read) => read?,
        };
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        if let Some(outcome) = scanner.push(&chunk[..n]) {
            return outcome;
        }
    }
}

pub struct CommandChannel {
    link: SharedLink,
    handoff: Handoff,
    timings: CommandTimings,
    health: HealthTracker,
    serial: tokio::sync::Mutex<()>,
}

impl CommandChannel {
    pub fn new(link: SharedLink, handoff: Handoff, timings: CommandTimings, health: HealthTracker) -> Self {
        Self {
            link,
            handoff,
            timings,
            health,
            serial: tokio::sync::Mutex::new(()),
        }
    }

    pub fn timings(&self) -> CommandTimings {
        self.timings
    }

    /// Runs the full enter/command/exit sequence for `id`.
    ///
    /// Concurrent callers are served one after the other. The ingestion loop
    /// is always resumed before this returns.
    pub async fn send_command(&self, id: u8, payload: &[u8]) -> Result<Ack, CommandError> {
        let frame = build_frame(id, payload)?;
        let _serial = self.serial.lock().await;

        self.handoff.request_pause();
        let result = match self.handoff.wait_paused(self.timings.pause_timeout).await {
            Ok(()) => {
                let mut link = self.link.lock().await;
                self.configure(&mut **link, id, &frame).await
            }
            Err(e) => Err(e.into()),
        };
        self.handoff.resume();

        match &result {
            Ok(_) => tracing::debug!(command = format_args!("{id:#04x}"), "command acknowledged"),
            Err(e) => tracing::warn!(command = format_args!("{id:#04x}"), error = %e, "command failed"),
        }
        self.health.record_command(result.is_ok());
        result
    }

    async fn configure<L>(&self, link: &mut L, id: u8, frame: &[u8]) -> Result<Ack, CommandError>
    where
        L: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        let t = self.timings;
        let enter = build_frame(ENTER_CONFIG, &ENTER_CONFIG_PAYLOAD)?;
        let exit = build_frame(EXIT_CONFIG, &[])?;

        if let Err(e) = transact(link, ENTER_CONFIG, &enter, t.ack_timeout).await {
            // The sensor may have switched modes even if its ack was lost.
            if let Err(exit_err) = transact(link, EXIT_CONFIG, &exit, t.ack_timeout).await {
                tracing::debug!(error = %exit_err, "exit after failed enter also failed");
            }
            return Err(e);
        }
        sleep(t.step_delay).await;

        let outcome = transact(link, id, frame, t.ack_timeout).await;
        if outcome.is_ok() {
            sleep(t.step_delay).await;
        }

        let exited = transact(link, EXIT_CONFIG, &exit, t.ack_timeout).await;
        match (outcome, exited) {
            (Ok(ack), Ok(_)) => Ok(ack),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), exited) => {
                if let Err(exit_err) = exited {
                    tracing::debug!(error = %exit_err, "exit after failed command also failed");
                }
                Err(e)
            }
        }
    }
}
