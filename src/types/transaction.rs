//! Transaction and receipt types.

use super::{keccak256, Address, Hash, U256};
use serde::{Deserialize, Serialize};

/// A transaction submitted to the node.
///
/// Byte-for-byte value object: the hash is a pure function of the remaining
/// fields, so identical submissions collapse to one mempool entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Content-addressed identity: keccak over all value fields.
    pub hash: Hash,

    /// Sender address.
    pub from: Address,

    /// Recipient address (None = contract deployment).
    pub to: Option<Address>,

    /// Value in wei.
    pub value: U256,

    /// Calldata, or deployment bytecode when `to` is None.
    #[serde(with = "super::hex_bytes")]
    pub data: Vec<u8>,

    /// Sender nonce.
    #[serde(with = "super::hex_u64")]
    pub nonce: u64,

    /// Gas limit.
    #[serde(with = "super::hex_u64")]
    pub gas_limit: u64,

    /// Gas price in wei.
    pub gas_price: U256,
}

impl Transaction {
    /// Build a transaction, deriving its content hash.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        from: Address,
        to: Option<Address>,
        value: U256,
        data: Vec<u8>,
        nonce: u64,
        gas_limit: u64,
        gas_price: U256,
    ) -> Self {
        let hash = Self::compute_hash(&from, to.as_ref(), &value, &data, nonce, gas_limit, &gas_price);
        Self {
            hash,
            from,
            to,
            value,
            data,
            nonce,
            gas_limit,
            gas_price,
        }
    }

    /// Compute the canonical transaction hash from contents.
    pub fn compute_hash(
        from: &Address,
        to: Option<&Address>,
        value: &U256,
        data: &[u8],
        nonce: u64,
        gas_limit: u64,
        gas_price: &U256,
    ) -> Hash {
        let mut input = Vec::with_capacity(128 + data.len());
        input.extend_from_slice(from.as_bytes());
        match to {
            Some(to) => {
                input.push(1u8);
                input.extend_from_slice(to.as_bytes());
            }
            None => input.push(0u8),
        }
        input.extend_from_slice(&value.to_be_bytes());
        input.extend_from_slice(&nonce.to_le_bytes());
        input.extend_from_slice(&gas_limit.to_le_bytes());
        input.extend_from_slice(&gas_price.to_be_bytes());
        input.extend_from_slice(data);
        Hash(keccak256(&input))
    }

    /// Whether this transaction deploys a contract.
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }
}

/// Outcome of an executed transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReceiptStatus {
    Success,
    Failed,
}

impl ReceiptStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ReceiptStatus::Success)
    }
}

/// An event log emitted during execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Contract that emitted the log.
    pub address: Address,

    /// Indexed topics (up to 4).
    pub topics: Vec<Hash>,

    /// Non-indexed data.
    #[serde(with = "super::hex_bytes")]
    pub data: Vec<u8>,
}

/// Transaction receipt.
///
/// Produced exactly once per included transaction, immutable thereafter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Hash of the executed transaction.
    pub transaction_hash: Hash,

    /// Hash of the containing block.
    pub block_hash: Hash,

    /// Sender address.
    pub from: Address,

    /// Recipient (None on deployment).
    pub to: Option<Address>,

    /// Gas consumed by this transaction.
    #[serde(with = "super::hex_u64")]
    pub gas_used: u64,

    /// Running gas total within the containing block.
    #[serde(with = "super::hex_u64")]
    pub cumulative_gas_used: u64,

    /// Success or failure.
    pub status: ReceiptStatus,

    /// Logs emitted during execution.
    pub logs: Vec<LogEntry>,

    /// Created contract address (Some iff a deployment succeeded).
    pub contract_address: Option<Address>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tx(from: u8, nonce: u64) -> Transaction {
        Transaction::new(
            Address([from; 20]),
            Some(Address([0xBB; 20])),
            U256::from_u64(100),
            vec![],
            nonce,
            21000,
            U256::from_u64(1_000_000_000),
        )
    }

    #[test]
    fn test_hash_is_content_addressed() {
        let a = make_tx(0xAA, 0);
        let b = make_tx(0xAA, 0);
        assert_eq!(a.hash, b.hash);

        let c = make_tx(0xAA, 1);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_create_and_call_hash_differently() {
        let call = make_tx(0xAA, 0);
        let create = Transaction::new(
            Address([0xAA; 20]),
            None,
            U256::from_u64(100),
            vec![],
            0,
            21000,
            U256::from_u64(1_000_000_000),
        );
        assert!(create.is_create());
        assert!(!call.is_create());
        assert_ne!(call.hash, create.hash);
    }

    #[test]
    fn test_serde_wire_shape() {
        let tx = make_tx(0xAA, 7);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["nonce"], "0x7");
        assert_eq!(json["gasLimit"], "0x5208");
        assert_eq!(json["gasPrice"], "0x3b9aca00");
        assert_eq!(json["data"], "0x");

        let back: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }
}
