// P2P host. A listener thread accepts streams and hands each one to its
// own handler thread; outbound sends open a fresh stream per message and
// close it after delivery. The peer table and the handler registry sit
// behind separate locks, and neither lock is held across network I/O.

use crate::error::{ChainError, Result};
use crate::network::message::{Message, PROTOCOL_ID};
use crate::utils::Shutdown;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

/// Dial, read and write timeouts for a single stream
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Peers silent for longer than this are evicted from the live table
const PEER_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

const PEER_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub type MessageHandler = Arc<dyn Fn(&Message, &str) -> Result<()> + Send + Sync>;

/// A live peer: its advertised listening endpoint and when we last heard
/// from it
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub addr: String,
    pub last_seen: Instant,
}

pub struct Network {
    node_id: String,
    listen_port: u16,
    advertised_addr: String,
    peers: RwLock<HashMap<String, PeerInfo>>,
    handlers: RwLock<HashMap<String, MessageHandler>>,
    shutdown: Shutdown,
}

impl Network {
    pub fn new(node_id: String, listen_port: u16, shutdown: Shutdown) -> Network {
        let advertised_addr = format!("127.0.0.1:{listen_port}");
        Network {
            node_id,
            listen_port,
            advertised_addr,
            peers: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The host:port this node tells peers to reach it at
    pub fn advertised_addr(&self) -> &str {
        &self.advertised_addr
    }

    /// Bind the listener and start the accept and peer-sweep threads
    pub fn start(self: Arc<Self>) -> Result<()> {
        let bind_addr = format!("0.0.0.0:{}", self.listen_port);
        let listener = TcpListener::bind(&bind_addr)
            .map_err(|e| ChainError::Network(format!("Failed to bind to {bind_addr}: {e}")))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| ChainError::Network(format!("Failed to configure listener: {e}")))?;

        info!("P2P host listening on {bind_addr}");

        let network = Arc::clone(&self);
        thread::spawn(move || network.accept_loop(listener));

        let network = Arc::clone(&self);
        thread::spawn(move || network.sweep_loop());

        Ok(())
    }

    fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            if self.shutdown.is_triggered() {
                debug!("P2P listener shutting down");
                return;
            }
            match listener.accept() {
                Ok((stream, peer_addr)) => {
                    let network = Arc::clone(&self);
                    thread::spawn(move || {
                        if let Err(e) = network.handle_stream(stream, peer_addr) {
                            debug!("Error handling stream from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
    }

    /// One inbound stream carries exactly one message: the protocol line,
    /// then the JSON envelope, then EOF.
    fn handle_stream(&self, stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        stream
            .set_read_timeout(Some(STREAM_TIMEOUT))
            .map_err(|e| ChainError::StreamError(format!("Failed to set read timeout: {e}")))?;

        let mut reader = BufReader::new(stream);
        let mut protocol_line = String::new();
        reader
            .read_line(&mut protocol_line)
            .map_err(|e| ChainError::StreamError(format!("Failed to read protocol line: {e}")))?;

        if protocol_line.trim_end() != PROTOCOL_ID {
            debug!("Dropping stream from {peer_addr} with unknown protocol");
            return Ok(());
        }

        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| ChainError::StreamError(format!("Failed to read message: {e}")))?;

        let message: Message = serde_json::from_slice(&body)
            .map_err(|e| ChainError::Decoding(format!("Malformed message from {peer_addr}: {e}")))?;

        self.dispatch(message);
        Ok(())
    }

    /// Record the sender in the peer table, then invoke the registered
    /// handler. Handler errors are logged, never propagated.
    fn dispatch(&self, message: Message) {
        if message.from == self.node_id {
            return;
        }

        if message.addr_from.parse::<SocketAddr>().is_ok() {
            let mut peers = self.peers_write();
            let previously_known = peers.contains_key(&message.from);
            peers.insert(
                message.from.clone(),
                PeerInfo {
                    addr: message.addr_from.clone(),
                    last_seen: Instant::now(),
                },
            );
            if !previously_known {
                info!(
                    "New peer {} at {} ({} connected)",
                    message.from,
                    message.addr_from,
                    peers.len()
                );
            }
        }

        let handler = {
            let handlers = self
                .handlers
                .read()
                .expect("Handler registry lock poisoned - this should never happen");
            handlers.get(&message.msg_type).cloned()
        };

        match handler {
            Some(handler) => {
                if let Err(e) = handler(&message, &message.from) {
                    warn!("Handler error for {} message: {e}", message.msg_type);
                }
            }
            None => {
                debug!("No handler for message type: {}", message.msg_type);
            }
        }
    }

    /// Install the callback invoked once per inbound message of `msg_type`
    pub fn register_handler<F>(&self, msg_type: &str, handler: F)
    where
        F: Fn(&Message, &str) -> Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .expect("Handler registry lock poisoned - this should never happen");
        handlers.insert(msg_type.to_string(), Arc::new(handler));
    }

    /// Fan a typed message out to every connected peer. Each send runs on
    /// its own thread; individual failures are logged, not propagated.
    pub fn broadcast(&self, msg_type: &str, data: serde_json::Value) {
        let targets: Vec<(String, String)> = {
            let peers = self.peers_read();
            peers
                .iter()
                .map(|(id, info)| (id.clone(), info.addr.clone()))
                .collect()
        };

        let message = match Message::new(msg_type, data, &self.node_id, &self.advertised_addr) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to build {msg_type} message: {e}");
                return;
            }
        };

        debug!("Broadcasting {msg_type} to {} peers", targets.len());
        for (peer_id, addr) in targets {
            let message = message.clone();
            thread::spawn(move || {
                if let Err(e) = send_message(&addr, &message) {
                    debug!("Failed to send {} to peer {peer_id}: {e}", message.msg_type);
                }
            });
        }
    }

    /// Directed send to a connected peer
    pub fn send_to_peer(&self, peer_id: &str, msg_type: &str, data: serde_json::Value) -> Result<()> {
        let addr = {
            let peers = self.peers_read();
            peers
                .get(peer_id)
                .map(|info| info.addr.clone())
                .ok_or_else(|| ChainError::PeerNotFound(peer_id.to_string()))?
        };

        let message = Message::new(msg_type, data, &self.node_id, &self.advertised_addr)?;
        send_message(&addr, &message)
    }

    /// Send to a raw endpoint that may not be in the peer table yet; used
    /// by discovery dials and boot node contact
    pub fn send_to_addr(&self, addr: &str, msg_type: &str, data: serde_json::Value) -> Result<()> {
        let message = Message::new(msg_type, data, &self.node_id, &self.advertised_addr)?;
        send_message(addr, &message)
    }

    pub fn peer_count(&self) -> usize {
        self.peers_read().len()
    }

    pub fn peer_ids(&self) -> Vec<String> {
        self.peers_read().keys().cloned().collect()
    }

    /// True when the endpoint belongs to a connected peer or to this node
    pub fn is_connected_addr(&self, addr: &str) -> bool {
        if addr == self.advertised_addr {
            return true;
        }
        self.peers_read().values().any(|info| info.addr == addr)
    }

    fn sweep_loop(self: Arc<Self>) {
        while self.shutdown.sleep(PEER_SWEEP_INTERVAL) {
            let mut peers = self.peers_write();
            let before = peers.len();
            peers.retain(|peer_id, info| {
                let stale = info.last_seen.elapsed() > PEER_STALE_AFTER;
                if stale {
                    info!("Evicting stale peer {peer_id} at {}", info.addr);
                }
                !stale
            });
            let evicted = before - peers.len();
            if evicted > 0 {
                debug!("Evicted {evicted} stale peers");
            }
        }
    }

    fn peers_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, PeerInfo>> {
        self.peers
            .read()
            .expect("Peer table lock poisoned - this should never happen")
    }

    fn peers_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, PeerInfo>> {
        self.peers
            .write()
            .expect("Peer table lock poisoned - this should never happen")
    }
}

/// Open a stream to `addr`, write the protocol line and one JSON message,
/// then close.
fn send_message(addr: &str, message: &Message) -> Result<()> {
    let socket_addr = addr
        .parse::<SocketAddr>()
        .map_err(|e| ChainError::Network(format!("Invalid address {addr}: {e}")))?;

    let mut stream = TcpStream::connect_timeout(&socket_addr, STREAM_TIMEOUT)
        .map_err(|e| ChainError::StreamError(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_write_timeout(Some(STREAM_TIMEOUT))
        .map_err(|e| ChainError::StreamError(format!("Failed to set write timeout: {e}")))?;

    stream
        .write_all(PROTOCOL_ID.as_bytes())
        .and_then(|_| stream.write_all(b"\n"))
        .map_err(|e| ChainError::StreamError(format!("Failed to write protocol line: {e}")))?;

    serde_json::to_writer(&mut stream, message)
        .map_err(|e| ChainError::StreamError(format!("Failed to send message: {e}")))?;
    stream
        .flush()
        .map_err(|e| ChainError::StreamError(format!("Failed to flush stream: {e}")))?;

    Ok(())
}
