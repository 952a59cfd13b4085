// Peer discovery. A known-address table scores candidate endpoints,
// seeded once from configured addresses and DNS lookups, then kept fresh
// by three periodic loops: discovery (dial candidates while below the
// peer minimum), address exchange (getaddr/addr gossip) and maintenance
// (top-up plus eviction of aged low-quality entries).

use crate::error::Result;
use crate::network::message::{msg_type, AddrData, Message};
use crate::network::server::Network;
use crate::utils::{current_timestamp, Shutdown};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

pub const MAX_PEERS: usize = 50;
pub const MIN_PEERS: usize = 8;

const DISCOVERY_INTERVAL: Duration = Duration::from_secs(30);
const ADDRESS_EXCHANGE_INTERVAL: Duration = Duration::from_secs(60);
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);
const MAX_ADDRESS_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const ADDRESS_EXCHANGE_COUNT: usize = 100;

const INITIAL_QUALITY: i32 = 50;
const MIN_DIAL_QUALITY: i32 = 10;
const MIN_SHARE_QUALITY: i32 = 30;
const EVICT_QUALITY: i32 = 20;

/// Book-keeping for one known endpoint
#[derive(Debug, Clone)]
pub struct AddressInfo {
    pub last_seen: Instant,
    pub quality: i32,
    pub attempts: u32,
    pub successes: u32,
}

/// Operator-facing snapshot of the discovery state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub known_addresses: usize,
    pub connected_peers: usize,
    pub is_bootstrap: bool,
}

impl AddressInfo {
    fn fresh() -> AddressInfo {
        AddressInfo {
            last_seen: Instant::now(),
            quality: INITIAL_QUALITY,
            attempts: 0,
            successes: 0,
        }
    }
}

pub struct Discovery {
    network: Arc<Network>,
    known: RwLock<HashMap<String, AddressInfo>>,
    seed_addrs: Vec<String>,
    dns_seeds: Vec<String>,
    default_port: u16,
    is_bootstrap: bool,
    shutdown: Shutdown,
}

impl Discovery {
    pub fn new(
        network: Arc<Network>,
        seed_addrs: Vec<String>,
        dns_seeds: Vec<String>,
        default_port: u16,
        is_bootstrap: bool,
        shutdown: Shutdown,
    ) -> Arc<Discovery> {
        Arc::new(Discovery {
            network,
            known: RwLock::new(HashMap::new()),
            seed_addrs,
            dns_seeds,
            default_port,
            is_bootstrap,
            shutdown,
        })
    }

    /// Register the gossip handlers, seed the address table and spawn the
    /// three periodic loops
    pub fn start(self: Arc<Self>) {
        info!(
            "Starting peer discovery{}",
            if self.is_bootstrap {
                " (bootstrap node)"
            } else {
                ""
            }
        );

        let discovery = Arc::clone(&self);
        self.network
            .register_handler(msg_type::GETADDR, move |msg, from| {
                discovery.handle_getaddr(msg, from)
            });

        let discovery = Arc::clone(&self);
        self.network
            .register_handler(msg_type::ADDR, move |msg, from| {
                discovery.handle_addr(msg, from)
            });

        self.seed_known_addresses();

        let discovery = Arc::clone(&self);
        thread::spawn(move || {
            while discovery.shutdown.sleep(DISCOVERY_INTERVAL) {
                discovery.discover_and_connect();
            }
        });

        let discovery = Arc::clone(&self);
        thread::spawn(move || {
            while discovery.shutdown.sleep(ADDRESS_EXCHANGE_INTERVAL) {
                discovery.exchange_addresses();
            }
        });

        let discovery = Arc::clone(&self);
        thread::spawn(move || {
            while discovery.shutdown.sleep(MAINTENANCE_INTERVAL) {
                discovery.maintain();
            }
        });
    }

    /// Populate the known-address table from configured seed endpoints and
    /// DNS hostname lookups
    fn seed_known_addresses(&self) {
        for addr in self.resolve_dns_seeds() {
            self.add_known_address(&addr);
        }
        let seeds = self.seed_addrs.clone();
        for addr in seeds {
            self.add_known_address(&addr);
        }
        info!(
            "Initialized known-address table with {} seed addresses",
            self.known_count()
        );
    }

    fn resolve_dns_seeds(&self) -> Vec<String> {
        let mut addresses = Vec::new();
        for seed in &self.dns_seeds {
            // Port 0 only drives the lookup; discovered IPs are paired
            // with the default P2P port
            match (seed.as_str(), 0u16).to_socket_addrs() {
                Ok(resolved) => {
                    for addr in resolved {
                        addresses.push(format!("{}:{}", addr.ip(), self.default_port));
                    }
                }
                Err(e) => {
                    debug!("Failed to resolve DNS seed {seed}: {e}");
                }
            }
        }
        if !addresses.is_empty() {
            info!("Discovered {} addresses from DNS seeds", addresses.len());
        }
        addresses
    }

    pub fn add_known_address(&self, addr: &str) {
        if !is_valid_address(addr) {
            return;
        }
        let mut known = self.known_write();
        known
            .entry(addr.to_string())
            .or_insert_with(AddressInfo::fresh);
    }

    pub fn known_count(&self) -> usize {
        self.known_read().len()
    }

    pub fn stats(&self) -> DiscoveryStats {
        DiscoveryStats {
            known_addresses: self.known_count(),
            connected_peers: self.network.peer_count(),
            is_bootstrap: self.is_bootstrap,
        }
    }

    /// Dial candidates until the peer count reaches the minimum, capped by
    /// the maximum
    fn discover_and_connect(&self) {
        let mut current = self.network.peer_count();
        if current >= MAX_PEERS {
            return;
        }

        let needed = MIN_PEERS.saturating_sub(current);
        if needed == 0 {
            return;
        }

        let candidates = self.candidate_addresses(needed * 2);
        debug!(
            "Discovery tick: {current} peers connected, trying {} candidates",
            candidates.len()
        );

        for addr in candidates {
            if current >= MAX_PEERS {
                break;
            }
            if self.attempt_connection(&addr) {
                current += 1;
            }
        }
    }

    /// Shuffled known addresses worth dialing: not connected, not
    /// ourselves, quality above the dial floor
    fn candidate_addresses(&self, count: usize) -> Vec<String> {
        let mut candidates: Vec<String> = {
            let known = self.known_read();
            known
                .iter()
                .filter(|(addr, info)| {
                    info.quality >= MIN_DIAL_QUALITY && !self.network.is_connected_addr(addr)
                })
                .map(|(addr, _)| addr.clone())
                .collect()
        };

        candidates.shuffle(&mut thread_rng());
        candidates.truncate(count);
        candidates
    }

    /// A connection attempt is a dialed `getaddr`: delivery proves the
    /// endpoint is alive and invites the peer to learn us from the
    /// envelope
    fn attempt_connection(&self, addr: &str) -> bool {
        {
            let mut known = self.known_write();
            if let Some(info) = known.get_mut(addr) {
                info.attempts += 1;
            }
        }

        match self.network.send_to_addr(addr, msg_type::GETADDR, json!(null)) {
            Ok(()) => {
                debug!("Reached {addr}");
                self.update_quality(addr, true);
                true
            }
            Err(e) => {
                debug!("Failed to reach {addr}: {e}");
                self.update_quality(addr, false);
                false
            }
        }
    }

    fn update_quality(&self, addr: &str, success: bool) {
        let mut known = self.known_write();
        let Some(info) = known.get_mut(addr) else {
            return;
        };

        if success {
            info.successes += 1;
            info.quality = (info.quality + 10).min(100);
        } else {
            info.quality = (info.quality - 5).max(0);
        }
        info.last_seen = Instant::now();
    }

    /// Ask every connected peer for its address list
    fn exchange_addresses(&self) {
        for peer_id in self.network.peer_ids() {
            if let Err(e) = self
                .network
                .send_to_peer(&peer_id, msg_type::GETADDR, json!(null))
            {
                debug!("Address exchange with {peer_id} failed: {e}");
            }
        }
    }

    fn handle_getaddr(&self, _msg: &Message, from: &str) -> Result<()> {
        let addresses = self.shared_addresses(ADDRESS_EXCHANGE_COUNT);
        let data = AddrData {
            addresses,
            timestamp: current_timestamp()?,
        };
        self.network
            .send_to_peer(from, msg_type::ADDR, serde_json::to_value(data)?)
    }

    fn handle_addr(&self, msg: &Message, from: &str) -> Result<()> {
        let data: AddrData = msg.decode_data()?;
        let mut accepted = 0;
        for addr in &data.addresses {
            if is_valid_address(addr) {
                self.add_known_address(addr);
                accepted += 1;
            }
        }
        debug!(
            "Received {} addresses from {from}, accepted {accepted}",
            data.addresses.len()
        );
        Ok(())
    }

    /// Up to `count` shuffled addresses good enough to gossip
    fn shared_addresses(&self, count: usize) -> Vec<String> {
        let mut addresses: Vec<String> = {
            let known = self.known_read();
            known
                .iter()
                .filter(|(_, info)| info.quality > MIN_SHARE_QUALITY)
                .map(|(addr, _)| addr.clone())
                .collect()
        };

        addresses.shuffle(&mut thread_rng());
        addresses.truncate(count);
        addresses
    }

    /// Top up connections when below the minimum and drop aged
    /// low-quality addresses
    fn maintain(&self) {
        if self.network.peer_count() < MIN_PEERS {
            self.discover_and_connect();
        }

        let mut known = self.known_write();
        let before = known.len();
        known.retain(|_, info| {
            !(info.last_seen.elapsed() > MAX_ADDRESS_AGE && info.quality < EVICT_QUALITY)
        });
        let dropped = before - known.len();
        drop(known);
        if dropped > 0 {
            debug!("Dropped {dropped} stale known addresses");
        }
        debug!("Discovery state: {:?}", self.stats());
    }

    fn known_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, AddressInfo>> {
        self.known
            .read()
            .expect("Known-address lock poisoned - this should never happen")
    }

    fn known_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, AddressInfo>> {
        self.known
            .write()
            .expect("Known-address lock poisoned - this should never happen")
    }
}

/// Gossiped endpoints must carry an IP literal host and a non-empty
/// numeric port
pub fn is_valid_address(addr: &str) -> bool {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return false;
    };
    if host.parse::<IpAddr>().is_err() {
        return false;
    }
    !port.is_empty() && port.parse::<u16>().is_ok()
}
