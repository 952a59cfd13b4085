// Minimal HTTP/1.1 surface for the wallet and status tooling: a JSON
// method dispatch on POST / plus GET /health. One thread per request,
// same accept-loop shape as the P2P host.

use crate::consensus::Engine;
use crate::core::types::Address;
use crate::core::{Chain, Transaction};
use crate::error::{ChainError, Result};
use crate::network::Network;
use crate::utils::{current_timestamp, Shutdown};
use log::{debug, error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    method: String,
    #[serde(default)]
    params: Value,
}

/// A parsed HTTP request: method, path and body
#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

pub struct RpcServer {
    chain: Chain,
    engine: Arc<Engine>,
    network: Arc<Network>,
    port: u16,
    shutdown: Shutdown,
    active: AtomicUsize,
}

/// Decrements the in-flight request counter when a handler finishes
struct ConnectionGuard<'a>(&'a AtomicUsize);

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RpcServer {
    pub fn new(
        chain: Chain,
        engine: Arc<Engine>,
        network: Arc<Network>,
        port: u16,
        shutdown: Shutdown,
    ) -> Arc<RpcServer> {
        Arc::new(RpcServer {
            chain,
            engine,
            network,
            port,
            shutdown,
            active: AtomicUsize::new(0),
        })
    }

    /// In-flight request count; shutdown drains this within its grace
    /// period
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Bind the RPC listener and start serving requests
    pub fn start(self: Arc<Self>) -> Result<()> {
        let bind_addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&bind_addr)
            .map_err(|e| ChainError::Network(format!("Failed to bind RPC to {bind_addr}: {e}")))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| ChainError::Network(format!("Failed to configure RPC listener: {e}")))?;

        info!("RPC server listening on {bind_addr}");

        let server = Arc::clone(&self);
        thread::spawn(move || server.accept_loop(listener));
        Ok(())
    }

    fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            if self.shutdown.is_triggered() {
                debug!("RPC listener shutting down");
                return;
            }
            match listener.accept() {
                Ok((stream, _)) => {
                    let server = Arc::clone(&self);
                    thread::spawn(move || server.handle_connection(stream));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    error!("Error accepting RPC connection: {e}");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
    }

    fn handle_connection(&self, stream: TcpStream) {
        self.active.fetch_add(1, Ordering::SeqCst);
        let _guard = ConnectionGuard(&self.active);

        if stream.set_read_timeout(Some(REQUEST_TIMEOUT)).is_err()
            || stream.set_write_timeout(Some(REQUEST_TIMEOUT)).is_err()
        {
            return;
        }

        let mut reader = BufReader::new(stream);
        let request = match parse_request(&mut reader) {
            Ok(request) => request,
            Err(e) => {
                debug!("Malformed RPC request: {e}");
                let _ = write_response(
                    reader.get_mut(),
                    400,
                    &json!({ "error": e.to_string() }),
                );
                return;
            }
        };

        let (status, body) = self.route(&request);
        if let Err(e) = write_response(reader.get_mut(), status, &body) {
            debug!("Failed to write RPC response: {e}");
        }
    }

    fn route(&self, request: &HttpRequest) -> (u16, Value) {
        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/health") => (200, self.health()),
            ("POST", "/") => self.dispatch_rpc(&request.body),
            _ => (404, json!({ "error": "not found" })),
        }
    }

    fn health(&self) -> Value {
        json!({
            "status": "ok",
            "height": self.chain.height(),
            "peers": self.network.peer_count(),
            "node_id": self.network.node_id(),
            "timestamp": current_timestamp().unwrap_or(0),
        })
    }

    fn dispatch_rpc(&self, body: &[u8]) -> (u16, Value) {
        let request: RpcRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                return (400, json!({ "error": format!("Invalid JSON request: {e}") }));
            }
        };

        let result = match request.method.as_str() {
            "get_height" => Ok(json!({ "height": self.chain.height() })),
            "get_balance" => self.get_balance(&request.params),
            "submit_transaction" => self.submit_transaction(&request.params),
            other => Err(ChainError::Decoding(format!("Unknown method: {other}"))),
        };

        match result {
            Ok(value) => (200, value),
            Err(e) => {
                let status = if e.is_caller_error() { 400 } else { 500 };
                (status, json!({ "error": e.to_string() }))
            }
        }
    }

    fn get_balance(&self, params: &Value) -> Result<Value> {
        let address_str = params
            .get("address")
            .and_then(Value::as_str)
            .ok_or_else(|| ChainError::InvalidAddress("missing address".to_string()))?;
        let address = Address::parse(address_str)?;

        let account = self.chain.get_account(&address);
        Ok(json!({
            "balance": account.balance,
            "nonce": account.nonce,
        }))
    }

    fn submit_transaction(&self, params: &Value) -> Result<Value> {
        let raw = params
            .get("transaction")
            .ok_or_else(|| ChainError::Decoding("missing transaction".to_string()))?;
        let tx: Transaction = serde_json::from_value(raw.clone())
            .map_err(|e| ChainError::Decoding(format!("Invalid transaction: {e}")))?;

        let hash = self.engine.submit_transaction(&tx)?;
        Ok(json!({ "tx_hash": hash.to_string() }))
    }
}

fn parse_request<R: BufRead>(reader: &mut R) -> Result<HttpRequest> {
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .map_err(|e| ChainError::Decoding(format!("Failed to read request line: {e}")))?;

    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| ChainError::Decoding("Empty request line".to_string()))?
        .to_string();
    let path = parts
        .next()
        .ok_or_else(|| ChainError::Decoding("Missing request path".to_string()))?
        .to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| ChainError::Decoding(format!("Failed to read header: {e}")))?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| ChainError::Decoding("Bad Content-Length".to_string()))?;
            }
        }
    }

    if content_length > MAX_BODY_SIZE {
        return Err(ChainError::Decoding("Request body too large".to_string()));
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader
            .read_exact(&mut body)
            .map_err(|e| ChainError::Decoding(format!("Failed to read body: {e}")))?;
    }

    Ok(HttpRequest { method, path, body })
}

fn write_response<W: Write>(writer: &mut W, status: u16, body: &Value) -> Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let payload = serde_json::to_vec(body)?;

    write!(
        writer,
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    )
    .map_err(|e| ChainError::StreamError(format!("Failed to write response: {e}")))?;
    writer
        .write_all(&payload)
        .map_err(|e| ChainError::StreamError(format!("Failed to write response body: {e}")))?;
    writer
        .flush()
        .map_err(|e| ChainError::StreamError(format!("Failed to flush response: {e}")))?;
    Ok(())
}
