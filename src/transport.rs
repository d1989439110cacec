//! Process channel transports
//!
//! The script talks to the app over its own stdio: envelopes go out as JSONL
//! on stdout, UI events come back as JSONL on stdin. Reading happens on a
//! dedicated thread that feeds an `async_channel`, so the prompt machinery can
//! await events without polling.
//!
//! `MemoryTransport` gives the same shape without a process, for tests and
//! for embedding the bridge inside another program.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{KitError, Result};
use crate::protocol::{serialize_message, AppMessage, AppState, Channel, JsonlReader};

/// What the inbound side of a transport can deliver
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message(AppMessage),
    /// The channel failed; pending prompts reject
    Error(String),
    /// The other side went away
    Closed,
}

/// Outbound half of a process channel
pub trait Transport: Send + Sync {
    fn send(&self, msg: &AppMessage) -> Result<()>;
}

/// Writes envelopes to stdout, one JSON object per line
#[derive(Default)]
pub struct StdioTransport {
    // Serializes whole lines so concurrent senders never interleave bytes
    write_lock: Mutex<()>,
}

impl StdioTransport {
    pub fn new() -> Self {
        StdioTransport::default()
    }
}

impl Transport for StdioTransport {
    fn send(&self, msg: &AppMessage) -> Result<()> {
        let line = serialize_message(msg)?;
        let _guard = self.write_lock.lock();
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{}", line)
            .and_then(|_| out.flush())
            .map_err(|e| KitError::Transport(format!("stdout write failed: {}", e)))
    }
}

/// Start a thread that reads JSONL envelopes from stdin.
///
/// Uses a bounded channel so a flood of host events can't grow memory without
/// limit. The thread exits when stdin closes or the receiver is dropped.
pub fn start_stdin_reader(capacity: usize) -> async_channel::Receiver<InboundEvent> {
    let (tx, rx) = async_channel::bounded(capacity.max(1));

    std::thread::spawn(move || {
        info!("stdin reader started");
        let stdin = std::io::stdin();
        let mut reader = JsonlReader::new(stdin.lock());

        loop {
            let event = match reader.next_message_graceful() {
                Ok(Some(msg)) => {
                    debug!(channel = %msg.channel, "Received envelope");
                    InboundEvent::Message(msg)
                }
                Ok(None) => {
                    info!("stdin closed");
                    let _ = tx.send_blocking(InboundEvent::Closed);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    let _ = tx.send_blocking(InboundEvent::Error(e.to_string()));
                    break;
                }
            };
            // send_blocking since we're on a plain thread
            if tx.send_blocking(event).is_err() {
                debug!("Inbound channel dropped, stopping stdin reader");
                break;
            }
        }
    });

    rx
}

/// In-process transport: outbound envelopes are recorded, inbound ones are
/// injected through the paired [`MemoryHost`]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<AppMessage>>>,
    outbound_tx: async_channel::Sender<AppMessage>,
}

impl Transport for MemoryTransport {
    fn send(&self, msg: &AppMessage) -> Result<()> {
        self.sent.lock().push(msg.clone());
        // Unbounded, so this only fails once the host half is gone
        let _ = self.outbound_tx.try_send(msg.clone());
        Ok(())
    }
}

/// The "app" side of a [`MemoryTransport`]
#[derive(Clone)]
pub struct MemoryHost {
    inbound_tx: async_channel::Sender<InboundEvent>,
    outbound_rx: async_channel::Receiver<AppMessage>,
    sent: Arc<Mutex<Vec<AppMessage>>>,
}

/// Create a connected transport / host pair plus the inbound receiver to pump
/// into a [`MessageBus`](crate::bus::MessageBus)
pub fn memory_pair(
    capacity: usize,
) -> (
    MemoryTransport,
    MemoryHost,
    async_channel::Receiver<InboundEvent>,
) {
    let (inbound_tx, inbound_rx) = async_channel::bounded(capacity.max(1));
    let (outbound_tx, outbound_rx) = async_channel::unbounded();
    let sent = Arc::new(Mutex::new(Vec::new()));
    (
        MemoryTransport {
            sent: sent.clone(),
            outbound_tx,
        },
        MemoryHost {
            inbound_tx,
            outbound_rx,
            sent,
        },
        inbound_rx,
    )
}

impl MemoryHost {
    /// Deliver an envelope to the script
    pub async fn emit(&self, msg: AppMessage) {
        let _ = self.inbound_tx.send(InboundEvent::Message(msg)).await;
    }

    /// Deliver a UI event with a state snapshot
    pub async fn emit_state(&self, channel: Channel, state: AppState) {
        self.emit(AppMessage::with_state(channel, state)).await;
    }

    /// Simulate a channel failure
    pub async fn fail(&self, error: impl Into<String>) {
        let _ = self.inbound_tx.send(InboundEvent::Error(error.into())).await;
    }

    pub async fn close(&self) {
        let _ = self.inbound_tx.send(InboundEvent::Closed).await;
    }

    /// Next envelope the script sent, in order
    pub async fn next_outbound(&self) -> Option<AppMessage> {
        self.outbound_rx.recv().await.ok()
    }

    /// Skip outbound envelopes until one on `channel` arrives
    pub async fn wait_for(&self, channel: Channel) -> Option<AppMessage> {
        while let Some(msg) = self.next_outbound().await {
            if msg.channel == channel {
                return Some(msg);
            }
        }
        None
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<AppMessage> {
        self.sent.lock().clone()
    }

    /// Everything sent so far on one channel
    pub fn sent_on(&self, channel: &Channel) -> Vec<AppMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| &m.channel == channel)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_pair_records_and_streams_outbound() {
        let (transport, host, _inbound) = memory_pair(8);
        transport
            .send(&AppMessage::with_value(Channel::SetHint, json!("a")))
            .unwrap();
        transport
            .send(&AppMessage::with_value(Channel::SetPanel, json!("<b>")))
            .unwrap();

        assert_eq!(host.sent().len(), 2);
        assert_eq!(host.sent_on(&Channel::SetPanel).len(), 1);

        let panel = host.wait_for(Channel::SetPanel).await.unwrap();
        assert_eq!(panel.value, Some(json!("<b>")));
    }

    #[tokio::test]
    async fn test_memory_host_delivers_inbound_in_order() {
        let (_transport, host, inbound) = memory_pair(8);
        host.emit_state(Channel::Input, AppState::with_input("a")).await;
        host.fail("boom").await;
        host.close().await;

        match inbound.recv().await.unwrap() {
            InboundEvent::Message(msg) => assert_eq!(msg.channel, Channel::Input),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(inbound.recv().await.unwrap(), InboundEvent::Error(e) if e == "boom"));
        assert!(matches!(inbound.recv().await.unwrap(), InboundEvent::Closed));
    }
}
