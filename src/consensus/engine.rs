// Timer-driven block production plus inbound reconciliation. Every tick a
// validator snapshots the mempool, seals a block and hands it to the chain
// engine before broadcasting it. Inbound blocks and transactions flow
// through the same engine entry points, so local production and remote
// application serialize on the engine's lock.

use crate::core::{Block, Chain, Hash, Transaction};
use crate::core::types::Address;
use crate::error::Result;
use crate::network::{msg_type, GetBlocksData, HeightData, Message, Network};
use crate::utils::Shutdown;
use log::{debug, error, info, warn};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SYNC_INTERVAL: Duration = Duration::from_secs(30);

pub struct Engine {
    chain: Chain,
    network: Arc<Network>,
    validator: Address,
    is_validator: bool,
    shutdown: Shutdown,
}

impl Engine {
    pub fn new(
        chain: Chain,
        network: Arc<Network>,
        validator: Address,
        is_validator: bool,
        shutdown: Shutdown,
    ) -> Arc<Engine> {
        Arc::new(Engine {
            chain,
            network,
            validator,
            is_validator,
            shutdown,
        })
    }

    /// Register the inbound handlers, then spawn the production and sync
    /// loops
    pub fn start(self: Arc<Self>) {
        Arc::clone(&self).register_handlers();

        if self.is_validator {
            let engine = Arc::clone(&self);
            let block_time = Duration::from_secs(self.chain.config().block_time_secs);
            thread::spawn(move || {
                while engine.shutdown.sleep(block_time) {
                    if let Err(e) = engine.produce_block() {
                        error!("Failed to produce block: {e}");
                    }
                }
            });
        }

        let engine = Arc::clone(&self);
        thread::spawn(move || {
            while engine.shutdown.sleep(SYNC_INTERVAL) {
                engine.sync_with_peers();
            }
        });

        info!(
            "Consensus engine started (validator: {})",
            self.is_validator
        );
    }

    /// Install the overlay handlers for blocks, transactions and the
    /// height/block request pairs
    pub fn register_handlers(self: Arc<Self>) {
        let engine = Arc::clone(&self);
        self.network
            .register_handler(msg_type::BLOCK, move |msg, from| {
                engine.handle_block(msg, from)
            });

        let engine = Arc::clone(&self);
        self.network
            .register_handler(msg_type::TRANSACTION, move |msg, from| {
                engine.handle_transaction(msg, from)
            });

        let engine = Arc::clone(&self);
        self.network
            .register_handler(msg_type::GET_HEIGHT, move |msg, from| {
                engine.handle_get_height(msg, from)
            });

        let engine = Arc::clone(&self);
        self.network
            .register_handler(msg_type::HEIGHT, move |msg, from| {
                engine.handle_height(msg, from)
            });

        let engine = Arc::clone(&self);
        self.network
            .register_handler(msg_type::GET_BLOCKS, move |msg, from| {
                engine.handle_get_blocks(msg, from)
            });
    }

    /// Assemble, apply and broadcast the next block
    pub fn produce_block(&self) -> Result<()> {
        let config = self.chain.config();
        let pending = self.chain.pending_transactions(config.max_tx_per_block);
        let selected = cap_by_size(pending, config.max_block_size);

        let last = self.chain.last_block();
        let block = Block::new(
            last.header.height + 1,
            last.header.hash,
            selected,
            self.validator,
        )?;

        self.chain.add_block(&block)?;
        self.network
            .broadcast(msg_type::BLOCK, serde_json::to_value(&block)?);

        info!(
            "Produced block #{} with {} transactions",
            block.header.height,
            block.transactions.len()
        );
        Ok(())
    }

    /// Poll an arbitrary peer for its height
    fn sync_with_peers(&self) {
        let peers = self.network.peer_ids();
        let Some(peer_id) = peers.first() else {
            return;
        };

        if let Err(e) = self
            .network
            .send_to_peer(peer_id, msg_type::GET_HEIGHT, json!(null))
        {
            debug!("Failed to request height from {peer_id}: {e}");
        }
    }

    /// Validate and submit a wallet transaction, then gossip it
    pub fn submit_transaction(&self, tx: &Transaction) -> Result<Hash> {
        let hash = self.chain.add_transaction(tx)?;
        self.network
            .broadcast(msg_type::TRANSACTION, serde_json::to_value(tx)?);
        Ok(hash)
    }

    fn handle_block(&self, msg: &Message, from: &str) -> Result<()> {
        let block: Block = msg.decode_data()?;
        let height = block.header.height;
        match self.chain.add_block(&block) {
            Ok(()) => {
                info!("Applied block #{height} from peer {from}");
            }
            Err(e) => {
                warn!("Rejected block #{height} from peer {from}: {e}");
            }
        }
        Ok(())
    }

    fn handle_transaction(&self, msg: &Message, from: &str) -> Result<()> {
        let tx: Transaction = msg.decode_data()?;
        match self.chain.add_transaction(&tx) {
            Ok(hash) => {
                debug!("Admitted transaction {hash} from peer {from}");
            }
            Err(e) => {
                warn!("Rejected transaction from peer {from}: {e}");
            }
        }
        Ok(())
    }

    fn handle_get_height(&self, _msg: &Message, from: &str) -> Result<()> {
        let data = HeightData {
            height: self.chain.height(),
        };
        self.network
            .send_to_peer(from, msg_type::HEIGHT, serde_json::to_value(data)?)
    }

    /// A taller peer triggers a catch-up request for everything above our
    /// height
    fn handle_height(&self, msg: &Message, from: &str) -> Result<()> {
        let data: HeightData = msg.decode_data()?;
        let local = self.chain.height();
        debug!("Peer {from} reports height {}, local {local}", data.height);

        if data.height > local {
            info!(
                "Requesting blocks above {local} from {from} (peer at {})",
                data.height
            );
            let request = GetBlocksData { from_height: local };
            self.network
                .send_to_peer(from, msg_type::GET_BLOCKS, serde_json::to_value(request)?)?;
        }
        Ok(())
    }

    /// Stream every block above the requested height back in order, one
    /// directed message per block
    fn handle_get_blocks(&self, msg: &Message, from: &str) -> Result<()> {
        let data: GetBlocksData = msg.decode_data()?;
        let blocks = self.chain.blocks_after(data.from_height);
        debug!(
            "Sending {} blocks above height {} to {from}",
            blocks.len(),
            data.from_height
        );

        for block in blocks {
            self.network
                .send_to_peer(from, msg_type::BLOCK, serde_json::to_value(&block)?)?;
        }
        Ok(())
    }
}

/// Keep the leading transactions whose canonical size fits the block cap
fn cap_by_size(pending: Vec<Transaction>, max_block_size: usize) -> Vec<Transaction> {
    let mut selected = Vec::with_capacity(pending.len());
    let mut used = 0usize;
    for tx in pending {
        let size = match tx.canonical_bytes() {
            Ok(bytes) => bytes.len(),
            Err(_) => continue,
        };
        if used + size > max_block_size {
            break;
        }
        used += size;
        selected.push(tx);
    }
    selected
}
