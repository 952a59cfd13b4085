use crate::error::{ChainError, Result};
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};

/// Stream protocol identifier written as the first line of every
/// connection. Peers speaking anything else are dropped.
pub const PROTOCOL_ID: &str = "/agent-chain/1.0.0";

/// Known message type tags
pub mod msg_type {
    pub const BLOCK: &str = "block";
    pub const TRANSACTION: &str = "transaction";
    pub const GET_BLOCKS: &str = "get_blocks";
    pub const GET_HEIGHT: &str = "get_height";
    pub const HEIGHT: &str = "height";
    pub const ADDR: &str = "addr";
    pub const GETADDR: &str = "getaddr";
}

/// Typed envelope exchanged between peers. `data` is an opaque JSON payload
/// interpreted per type by the registered handler. Because the overlay
/// opens one stream per message, the sender's listening endpoint rides
/// along in `addr_from` so replies and peer-table entries can be directed
/// at it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: i64,
    pub from: String,
    pub addr_from: String,
}

impl Message {
    pub fn new(
        msg_type: &str,
        data: serde_json::Value,
        from: &str,
        addr_from: &str,
    ) -> Result<Message> {
        Ok(Message {
            msg_type: msg_type.to_string(),
            data,
            timestamp: current_timestamp()?,
            from: from.to_string(),
            addr_from: addr_from.to_string(),
        })
    }

    /// Decode the payload into the type the handler expects
    pub fn decode_data<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| ChainError::Decoding(format!("Bad {} payload: {e}", self.msg_type)))
    }
}

/// Payload of an `addr` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddrData {
    pub addresses: Vec<String>,
    pub timestamp: i64,
}

/// Payload of a `get_blocks` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBlocksData {
    pub from_height: i64,
}

/// Payload of a `height` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightData {
    pub height: i64,
}
