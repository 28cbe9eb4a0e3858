//! Blocks and transaction envelopes committed by the ledger.
//!
//! Every block carries the BLAKE3 hash of its predecessor's header, so the
//! chain can be re-verified from genesis. The `data_hash` is the merkle root
//! over the hashes of the contained transaction envelopes.

use blake3::Hasher as Blake3;
use serde::{Deserialize, Serialize};

use crate::asset::LedgerTimestamp;
use crate::time_service::ledger_time_now;

/// 32-byte block or transaction digest.
pub type Digest = [u8; 32];

/// Identity of the client that signed a transaction proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxCreator {
    pub msp_id: String,
    pub label: String,
    /// Hex encoded Ed25519 verifying key.
    pub public_key: String,
}

/// A single world-state write produced by executing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvWrite {
    pub key: String,
    #[serde(default)]
    pub is_delete: bool,
    /// JSON encoded value; absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A committed transaction: the signed proposal plus its write set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEnvelope {
    pub tx_id: String,
    pub channel: String,
    pub chaincode: String,
    pub function: String,
    pub args: Vec<String>,
    pub creator: TxCreator,
    /// Hex encoded Ed25519 signature over the proposal bytes.
    pub signature: String,
    pub timestamp: LedgerTimestamp,
    #[serde(default)]
    pub writes: Vec<KvWrite>,
}

impl TransactionEnvelope {
    /// BLAKE3 digest of the canonical JSON encoding.
    pub fn hash(&self) -> Digest {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        *blake3::hash(&bytes).as_bytes()
    }
}

/// Derive a transaction id from the proposal nonce and the creator's key.
pub fn compute_tx_id(nonce: &[u8], creator: &TxCreator) -> String {
    let mut hasher = Blake3::new();
    hasher.update(nonce);
    hasher.update(creator.msp_id.as_bytes());
    hasher.update(creator.public_key.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub number: u64,
    #[serde(with = "hex::serde")]
    pub previous_hash: Digest,
    #[serde(with = "hex::serde")]
    pub data_hash: Digest,
    pub timestamp_us: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> Digest {
        let mut hasher = Blake3::new();
        hasher.update(&self.number.to_be_bytes());
        hasher.update(&self.previous_hash);
        hasher.update(&self.data_hash);
        hasher.update(&self.timestamp_us.to_be_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// Answer to a `GetChainInfo` system query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub height: u64,
    #[serde(with = "hex::serde")]
    pub current_block_hash: Digest,
    #[serde(with = "hex::serde")]
    pub previous_block_hash: Digest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<TransactionEnvelope>,
}

impl Block {
    /// Build block `number` on top of `previous_hash`.
    pub fn new(number: u64, previous_hash: Digest, transactions: Vec<TransactionEnvelope>) -> Self {
        let tx_hashes: Vec<Digest> = transactions.iter().map(|tx| tx.hash()).collect();
        let header = BlockHeader {
            number,
            previous_hash,
            data_hash: Self::compute_merkle_root_from_hashes(&tx_hashes),
            timestamp_us: ledger_time_now(),
        };
        Self {
            header,
            transactions,
        }
    }

    /// Block 0: no predecessor and no transactions.
    pub fn genesis() -> Self {
        Self::new(0, [0u8; 32], Vec::new())
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn hash(&self) -> Digest {
        self.header.hash()
    }

    /// Compute the merkle root for an arbitrary slice of 32-byte hashes.
    pub fn compute_merkle_root_from_hashes(items: &[Digest]) -> Digest {
        if items.is_empty() {
            return [0u8; 32];
        }

        if items.len() == 1 {
            return items[0];
        }

        let mut current_level: Vec<Digest> = items.to_vec();
        while current_level.len() > 1 {
            let mut next_level = Vec::with_capacity(current_level.len().div_ceil(2));
            for chunk in current_level.chunks(2) {
                let left = chunk[0];
                let right = if chunk.len() == 2 { chunk[1] } else { chunk[0] };
                let mut hasher = Blake3::new();
                hasher.update(&left);
                hasher.update(&right);
                next_level.push(*hasher.finalize().as_bytes());
            }
            current_level = next_level;
        }

        current_level[0]
    }

    /// Check the data hash against the contained transactions.
    pub fn is_valid(&self) -> bool {
        let tx_hashes: Vec<Digest> = self.transactions.iter().map(|tx| tx.hash()).collect();
        self.header.data_hash == Self::compute_merkle_root_from_hashes(&tx_hashes)
    }

    /// True when `self` directly extends `parent`.
    pub fn extends(&self, parent: &Block) -> bool {
        self.header.number == parent.header.number + 1 && self.header.previous_hash == parent.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(function: &str) -> TransactionEnvelope {
        let creator = TxCreator {
            msp_id: "Org1MSP".into(),
            label: "appUser".into(),
            public_key: hex::encode([3u8; 32]),
        };
        TransactionEnvelope {
            tx_id: compute_tx_id(function.as_bytes(), &creator),
            channel: "mychannel".into(),
            chaincode: "ledger".into(),
            function: function.into(),
            args: vec!["abc".into()],
            creator,
            signature: String::new(),
            timestamp: LedgerTimestamp::from_micros(1_700_000_000_000_000),
            writes: vec![KvWrite {
                key: "abc".into(),
                is_delete: false,
                value: Some("{}".into()),
            }],
        }
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis();
        assert_eq!(genesis.number(), 0);
        assert_eq!(genesis.header.previous_hash, [0u8; 32]);
        assert_eq!(genesis.header.data_hash, [0u8; 32]);
        assert!(genesis.transactions.is_empty());
        assert!(genesis.is_valid());
    }

    #[test]
    fn test_chain_linkage() {
        let genesis = Block::genesis();
        let next = Block::new(1, genesis.hash(), vec![sample_tx("CreateAsset")]);
        assert!(next.extends(&genesis));
        assert!(next.is_valid());

        let orphan = Block::new(1, [9u8; 32], Vec::new());
        assert!(!orphan.extends(&genesis));
    }

    #[test]
    fn test_tampered_block_is_invalid() {
        let mut block = Block::new(1, [0u8; 32], vec![sample_tx("CreateAsset")]);
        block.transactions[0].args.push("extra".into());
        assert!(!block.is_valid());
    }

    #[test]
    fn test_merkle_root_computation() {
        let hashes = vec![[1u8; 32], [2u8; 32], [3u8; 32]];
        let root = Block::compute_merkle_root_from_hashes(&hashes);
        assert_ne!(root, [0u8; 32]);
        assert_eq!(Block::compute_merkle_root_from_hashes(&hashes[..1]), [1u8; 32]);
    }

    #[test]
    fn test_tx_id_depends_on_nonce() {
        let a = sample_tx("CreateAsset");
        let b = sample_tx("TransferAsset");
        assert_ne!(a.tx_id, b.tx_id);
        assert_eq!(a.tx_id.len(), 64);
    }

    #[test]
    fn test_header_json_uses_hex() {
        let block = Block::new(2, [0xabu8; 32], Vec::new());
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["header"]["previousHash"], hex::encode([0xabu8; 32]));
        let decoded: Block = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, block);
    }
}
