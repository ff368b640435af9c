use crate::metrics::{BRIDGE_CONNECTED, BRIDGE_REJECTED};
use crate::protocol::{HelloMsg, IncomingMessage, StateMsg};
use cancoder_core::{AxisCommand, Clock, StateExchange, TimeBase};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Longest inbound line the bridge will hold while waiting for its `\n`.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

pub struct BridgeConfig {
    pub bind_addr: String,
    pub publish_interval: Duration,
    pub require_handshake: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7000".to_string(),
            publish_interval: Duration::from_millis(100),
            require_handshake: false,
        }
    }
}

#[derive(Debug, Default)]
struct InboundState {
    handshake_seen: bool,
    client_id: Option<String>,
}

impl InboundState {
    fn reset(&mut self) {
        self.handshake_seen = false;
        self.client_id = None;
    }

    fn note_handshake(&mut self, hello: &HelloMsg) {
        self.handshake_seen = true;
        self.client_id = hello.client_id.clone();
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("inbound line exceeds {limit} bytes without a newline")]
struct LineTooLong {
    limit: usize,
}

/// Splits the inbound byte stream into lines, bounded by `limit`.
#[derive(Debug)]
struct LineBuffer {
    buf: Vec<u8>,
    limit: usize,
}

impl LineBuffer {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            limit,
        }
    }

    /// Append received bytes. If the unterminated tail grows past the limit
    /// everything buffered is discarded.
    fn extend(&mut self, bytes: &[u8]) -> Result<(), LineTooLong> {
        self.buf.extend_from_slice(bytes);
        let complete = self
            .buf
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |pos| pos + 1);
        if self.buf.len() - complete > self.limit {
            self.buf.clear();
            return Err(LineTooLong { limit: self.limit });
        }
        Ok(())
    }

    fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        Some(self.buf.drain(..=pos).collect())
    }

    fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Serve one dashboard client at a time over newline-delimited JSON.
///
/// Returns when `stop` is raised, or with the bind error if the listener
/// cannot be set up.
pub fn run_bridge(
    exchange: Arc<StateExchange>,
    timebase: TimeBase,
    config: BridgeConfig,
    stop: Arc<AtomicBool>,
) -> io::Result<()> {
    let listener = TcpListener::bind(&config.bind_addr)?;
    listener.set_nonblocking(true)?;

    info!(addr = %config.bind_addr, "Bridge listening");

    let mut client: Option<TcpStream> = None;
    let mut recv_buf = LineBuffer::new(MAX_LINE_BYTES);
    let mut send_buf: Vec<u8> = Vec::new();
    let mut send_offset: usize = 0;
    let mut last_publish = Instant::now();
    let mut state_sequence: u64 = 0;
    let mut inbound_state = InboundState::default();

    while !stop.load(Ordering::Relaxed) {
        if client.is_none() {
            match listener.accept() {
                Ok((stream, addr)) => match stream.set_nonblocking(true) {
                    Ok(()) => {
                        info!(client_addr = %addr, "Bridge client connected");
                        client = Some(stream);
                        BRIDGE_CONNECTED.set(1.0);
                    }
                    Err(err) => warn!(error = %err, "Failed to set client nonblocking"),
                },
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    warn!("Bridge accept error: {}", err);
                }
            }
        }

        let mut drop_client = false;
        if let Some(stream) = client.as_mut() {
            let mut temp = [0u8; 1024];
            match stream.read(&mut temp) {
                Ok(0) => {
                    info!("Bridge client disconnected");
                    drop_client = true;
                }
                Ok(n) => {
                    if let Err(err) = recv_buf.extend(&temp[..n]) {
                        warn!(error = %err, "Dropping bridge client");
                        BRIDGE_REJECTED.inc();
                        drop_client = true;
                    }
                    while let Some(line) = recv_buf.next_line() {
                        let Ok(text) = std::str::from_utf8(&line) else {
                            BRIDGE_REJECTED.inc();
                            continue;
                        };
                        let trimmed = text.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match IncomingMessage::parse(trimmed) {
                            Ok(msg) => handle_incoming(
                                msg,
                                &exchange,
                                &timebase,
                                config.require_handshake,
                                &mut inbound_state,
                            ),
                            Err(err) => {
                                BRIDGE_REJECTED.inc();
                                debug!(error = %err, "Dropping bridge message");
                            }
                        }
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    warn!(error = %err, "Bridge read error");
                    drop_client = true;
                }
            }

            if !drop_client
                && send_buf.is_empty()
                && last_publish.elapsed() >= config.publish_interval
            {
                state_sequence = state_sequence.wrapping_add(1);
                let snapshot = exchange.read_state();
                let msg = StateMsg::from_snapshot(&snapshot, state_sequence, timebase.unix_us());
                match serde_json::to_string(&msg) {
                    Ok(line) => {
                        send_buf = line.into_bytes();
                        send_buf.push(b'\n');
                        send_offset = 0;
                    }
                    Err(err) => warn!(error = %err, "Failed to encode state message"),
                }
                last_publish = Instant::now();
            }

            if !drop_client && !send_buf.is_empty() {
                match stream.write(&send_buf[send_offset..]) {
                    Ok(0) => {
                        info!("Bridge client disconnected");
                        drop_client = true;
                    }
                    Ok(n) => {
                        send_offset += n;
                        if send_offset >= send_buf.len() {
                            send_buf.clear();
                            send_offset = 0;
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(err) => {
                        warn!(error = %err, "Bridge write error");
                        drop_client = true;
                    }
                }
            }
        }

        if drop_client {
            client = None;
            recv_buf.clear();
            send_buf.clear();
            send_offset = 0;
            inbound_state.reset();
            BRIDGE_CONNECTED.set(0.0);
        }

        std::thread::sleep(Duration::from_millis(5));
    }

    BRIDGE_CONNECTED.set(0.0);
    Ok(())
}

#[instrument(skip(exchange, timebase, inbound_state))]
fn handle_incoming(
    msg: IncomingMessage,
    exchange: &StateExchange,
    timebase: &TimeBase,
    require_handshake: bool,
    inbound_state: &mut InboundState,
) {
    let version = msg.protocol_version();
    if !version.is_supported() {
        warn!(
            major = version.major,
            minor = version.minor,
            "Unsupported protocol version"
        );
        BRIDGE_REJECTED.inc();
        return;
    }

    match msg {
        IncomingMessage::Hello(hello) => {
            inbound_state.note_handshake(&hello);
            info!(
                client_id = ?hello.client_id,
                capabilities = ?hello.capabilities,
                "Bridge handshake received"
            );
        }
        IncomingMessage::Axis(axis) => {
            if require_handshake && !inbound_state.handshake_seen {
                warn!("Axis received before handshake");
                BRIDGE_REJECTED.inc();
                return;
            }
            if !axis.left_y.is_finite() {
                warn!(value = %axis.left_y, "Ignoring non-finite axis value");
                BRIDGE_REJECTED.inc();
                return;
            }
            exchange.submit_axis(AxisCommand {
                timestamp_us: timebase.now_us(),
                left_y: axis.left_y.clamp(-1.0, 1.0),
            });
        }
        IncomingMessage::Mode(mode) => {
            if require_handshake && !inbound_state.handshake_seen {
                warn!("Mode request received before handshake");
                BRIDGE_REJECTED.inc();
                return;
            }
            info!(
                client_id = ?inbound_state.client_id,
                mode = ?mode.mode,
                "Mode override requested"
            );
            exchange.request_mode(mode.mode);
        }
    }
}
