//! RPC surface integration tests
//!
//! Starts the HTTP server against a live chain engine and drives it with
//! raw requests the way the wallet does.

use agent_chain::config::ChainConfig;
use agent_chain::consensus::Engine;
use agent_chain::core::types::Account;
use agent_chain::core::{Address, Chain, Transaction};
use agent_chain::network::Network;
use agent_chain::rpc::RpcServer;
use agent_chain::utils::{NodeKeyPair, Shutdown};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use tempfile::tempdir;

struct TestNode {
    chain: Chain,
    key_pair: NodeKeyPair,
    rpc_port: u16,
    _dir: tempfile::TempDir,
}

fn start_test_node(balance: i64) -> TestNode {
    let key_pair = NodeKeyPair::generate().unwrap();
    let dir = tempdir().unwrap();
    let config = ChainConfig {
        genesis_time: Some(1_700_000_000),
        genesis_accounts: vec![Account {
            address: key_pair.address(),
            balance,
            nonce: 0,
        }],
        ..ChainConfig::default()
    };
    let chain = Chain::open(config, dir.path()).unwrap();

    let shutdown = Shutdown::new();
    let network = Arc::new(Network::new(
        key_pair.address().to_string(),
        0,
        shutdown.clone(),
    ));
    let engine = Engine::new(
        chain.clone(),
        Arc::clone(&network),
        key_pair.address(),
        true,
        shutdown.clone(),
    );

    let rpc_port = {
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let rpc = RpcServer::new(chain.clone(), engine, network, rpc_port, shutdown);
    rpc.start().unwrap();

    TestNode {
        chain,
        key_pair,
        rpc_port,
        _dir: dir,
    }
}

/// Issue one raw HTTP request and return (status, JSON body)
fn http_request(port: u16, raw: &str) -> (u16, Value) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();

    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .expect("status code in response")
        .parse()
        .unwrap();
    let body = response
        .split("\r\n\r\n")
        .nth(1)
        .expect("body after headers");
    (status, serde_json::from_str(body).unwrap())
}

fn rpc_call(port: u16, method: &str, params: Value) -> (u16, Value) {
    let payload = json!({ "method": method, "params": params }).to_string();
    let raw = format!(
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{payload}",
        payload.len()
    );
    http_request(port, &raw)
}

#[test]
fn test_health_reports_node_state() {
    let node = start_test_node(1000);

    let (status, body) = http_request(
        node.rpc_port,
        "GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["height"], 0);
    assert_eq!(body["peers"], 0);
    assert_eq!(body["node_id"], node.key_pair.address().to_string());
    assert!(body["timestamp"].as_i64().unwrap() > 0);
}

#[test]
fn test_get_height_and_balance() {
    let node = start_test_node(1000);

    let (status, body) = rpc_call(node.rpc_port, "get_height", json!({}));
    assert_eq!(status, 200);
    assert_eq!(body["height"], 0);

    let (status, body) = rpc_call(
        node.rpc_port,
        "get_balance",
        json!({ "address": node.key_pair.address().to_string() }),
    );
    assert_eq!(status, 200);
    assert_eq!(body["balance"], 1000);
    assert_eq!(body["nonce"], 0);

    // Unknown accounts read as zero
    let unknown = Address::from_public_key(&[0xDD; 64]);
    let (status, body) = rpc_call(
        node.rpc_port,
        "get_balance",
        json!({ "address": unknown.to_string() }),
    );
    assert_eq!(status, 200);
    assert_eq!(body["balance"], 0);
}

#[test]
fn test_get_balance_rejects_bad_address() {
    let node = start_test_node(1000);

    let (status, body) = rpc_call(
        node.rpc_port,
        "get_balance",
        json!({ "address": "not-an-address" }),
    );
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("Invalid address"));
}

#[test]
fn test_submit_transaction_admits_to_mempool() {
    let node = start_test_node(1000);
    let recipient = Address::from_public_key(&[0xDE; 64]);

    let mut tx =
        Transaction::new_transfer(node.key_pair.address(), recipient, 100, 0).unwrap();
    tx.sign(&node.key_pair).unwrap();

    let (status, body) = rpc_call(
        node.rpc_port,
        "submit_transaction",
        json!({ "transaction": serde_json::to_value(&tx).unwrap() }),
    );
    assert_eq!(status, 200);
    assert_eq!(body["tx_hash"], tx.hash.to_string());
    assert_eq!(node.chain.mempool_len(), 1);
}

#[test]
fn test_submit_overdraw_returns_server_error() {
    let node = start_test_node(1000);
    let recipient = Address::from_public_key(&[0xDF; 64]);

    let mut tx =
        Transaction::new_transfer(node.key_pair.address(), recipient, 10_000, 0).unwrap();
    tx.sign(&node.key_pair).unwrap();

    let (status, body) = rpc_call(
        node.rpc_port,
        "submit_transaction",
        json!({ "transaction": serde_json::to_value(&tx).unwrap() }),
    );
    assert_eq!(status, 500);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Insufficient balance"));
    assert_eq!(node.chain.mempool_len(), 0);
}

#[test]
fn test_submit_malformed_transaction_is_caller_error() {
    let node = start_test_node(1000);

    let (status, _body) = rpc_call(
        node.rpc_port,
        "submit_transaction",
        json!({ "transaction": { "type": "transfer" } }),
    );
    assert_eq!(status, 400);

    let (status, _body) = rpc_call(node.rpc_port, "submit_transaction", json!({}));
    assert_eq!(status, 400);
}

#[test]
fn test_unknown_method_is_caller_error() {
    let node = start_test_node(1000);
    let (status, body) = rpc_call(node.rpc_port, "mint_tokens", json!({}));
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("Unknown method"));
}
