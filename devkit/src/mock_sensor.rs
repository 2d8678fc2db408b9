/*!
Simulated radar sensor for tests without hardware

Sits on the far end of an in-memory duplex stream. It parses the command
frames the host writes, answers each one with an acknowledgement (or a
scripted failure), tracks configuration mode, and streams whatever data
frames the test queues.
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::frames::{ack_frame, data_frame, CommandParser, ParsedCommand, SimTarget, ENTER_CONFIG, EXIT_CONFIG};

/// Extra bytes of a real enter-config ack: protocol version, buffer size.
const ENTER_ACK_EXTRA: [u8; 4] = [0x01, 0x00, 0x40, 0x00];

/// How the simulated sensor answers a given command id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Success acknowledgement.
    Ack,
    /// Acknowledgement with a non-zero status.
    Status(u16),
    /// Acknowledgement echoing another command id.
    WrongId(u8),
    /// No answer at all.
    Silent,
}

#[derive(Debug, Default)]
struct Inner {
    received: Vec<ParsedCommand>,
    replies: HashMap<u8, Reply>,
    config_mode: bool,
    /// Bytes written right before each ack, as if a data frame was in flight.
    noise_before_ack: Vec<u8>,
}

/// Handle on the simulated sensor task.
#[derive(Clone)]
pub struct MockSensor {
    inner: Arc<Mutex<Inner>>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    task: Arc<JoinHandle<()>>,
}

impl MockSensor {
    /// Spawns the sensor on `stream`, the end the host does not use.
    pub fn spawn(stream: DuplexStream) -> Self {
        let inner = Arc::new(Mutex::new(Inner::default()));
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(stream, inner.clone(), outgoing_rx));
        Self {
            inner,
            outgoing,
            task: Arc::new(task),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Scripts the answer for one command id (default: `Reply::Ack`).
    pub fn set_reply(&self, id: u8, reply: Reply) {
        log::info!("[mock-sensor] reply for {id:#04x} set to {reply:?}");
        self.lock().replies.insert(id, reply);
    }

    /// Bytes to emit before every ack, e.g. a data frame.
    pub fn set_noise_before_ack(&self, bytes: Vec<u8>) {
        self.lock().noise_before_ack = bytes;
    }

    /// Queues raw bytes for the host.
    pub fn stream_bytes(&self, bytes: Vec<u8>) {
        if self.outgoing.send(bytes).is_err() {
            log::warn!("[mock-sensor] link closed, bytes dropped");
        }
    }

    /// Queues one data frame reporting `targets`.
    pub fn send_targets(&self, targets: &[SimTarget]) {
        self.stream_bytes(data_frame(targets));
    }

    /// Every command received so far, in order.
    pub fn commands(&self) -> Vec<ParsedCommand> {
        self.lock().received.clone()
    }

    pub fn command_ids(&self) -> Vec<u8> {
        self.lock().received.iter().map(|c| c.id).collect()
    }

    pub fn in_config_mode(&self) -> bool {
        self.lock().config_mode
    }

    pub fn clear(&self) {
        self.lock().received.clear();
    }

    /// Stops the simulated sensor; the host then sees end of stream.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

async fn run(stream: DuplexStream, inner: Arc<Mutex<Inner>>, mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>) {
    let (mut rd, mut wr) = tokio::io::split(stream);
    let mut parser = CommandParser::new();
    let mut buf = [0u8; 256];

    loop {
        tokio::select! {
            read = rd.read(&mut buf) => {
                let n = match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                for cmd in parser.push(&buf[..n]) {
                    let answer = respond(&inner, cmd);
                    if !answer.is_empty() && wr.write_all(&answer).await.is_err() {
                        return;
                    }
                }
            }
            bytes = outgoing.recv() => {
                let Some(bytes) = bytes else { break };
                if wr.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        }
    }
    log::info!("[mock-sensor] stopped");
}

/// Records `cmd`, updates the mode, and builds the bytes to send back.
fn respond(inner: &Arc<Mutex<Inner>>, cmd: ParsedCommand) -> Vec<u8> {
    let mut state = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let reply = state.replies.get(&cmd.id).cloned().unwrap_or(Reply::Ack);
    log::info!("[mock-sensor] command {:#04x} ({} bytes) -> {:?}", cmd.id, cmd.payload.len(), reply);

    let accepted_in_mode = cmd.id == ENTER_CONFIG || cmd.id == EXIT_CONFIG || state.config_mode;
    let id = cmd.id;
    state.received.push(cmd);

    let ack = match reply {
        Reply::Silent => return Vec::new(),
        Reply::Ack if !accepted_in_mode => ack_frame(id, 1, &[]),
        Reply::Ack => {
            match id {
                ENTER_CONFIG => state.config_mode = true,
                EXIT_CONFIG => state.config_mode = false,
                _ => {}
            }
            let extra: &[u8] = if id == ENTER_CONFIG { &ENTER_ACK_EXTRA } else { &[] };
            ack_frame(id, 0, extra)
        }
        Reply::Status(status) => ack_frame(id, status, &[]),
        Reply::WrongId(other) => ack_frame(other, 0, &[]),
    };

    let mut out = state.noise_before_ack.clone();
    out.extend(ack);
    out
}
