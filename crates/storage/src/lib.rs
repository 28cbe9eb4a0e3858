use anyhow::Result;
use filechain_types::{Block, LedgerTimestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

const HEIGHT_KEY: &[u8] = b"height";

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Block {got} is out of order, expected {expected}")]
    OutOfOrder { expected: u64, got: u64 },
    #[error("Corrupt metadata: {0}")]
    Corrupt(String),
}

/// One historical version of a world-state key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub tx_id: String,
    pub timestamp: LedgerTimestamp,
    pub is_delete: bool,
    /// Value written by the transaction; `None` for deletes.
    pub value: Option<String>,
}

/// Abstract storage trait
///
/// World state, per-key history and the block store are only ever mutated
/// together through [`Storage::commit_block`], which applies the write sets of
/// every transaction in the block.
pub trait Storage: Send + Sync {
    fn get_state(&self, key: &str) -> Result<Option<String>>;

    /// Live keys in `start..=end`, ordered by key. An empty bound is open on
    /// that side; an inverted range yields nothing.
    fn state_range(&self, start: &str, end: &str) -> Result<Vec<(String, String)>>;

    /// Every committed write to `key`, oldest first.
    fn get_history(&self, key: &str) -> Result<Vec<HistoryRecord>>;

    fn commit_block(&self, block: &Block) -> Result<()>;

    /// Whether a committed block already carries `tx_id`.
    fn has_transaction(&self, tx_id: &str) -> Result<bool>;

    fn get_block_by_number(&self, number: u64) -> Result<Option<Block>>;

    /// Number of committed blocks, genesis included.
    fn get_height(&self) -> Result<u64>;

    fn get_latest_block(&self) -> Result<Option<Block>> {
        match self.get_height()? {
            0 => Ok(None),
            height => self.get_block_by_number(height - 1),
        }
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

fn range_is_inverted(start: &str, end: &str) -> bool {
    !start.is_empty() && !end.is_empty() && start > end
}

fn range_bounds(start: &str, end: &str) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let lower = if start.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Included(start.as_bytes().to_vec())
    };
    let upper = if end.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Included(end.as_bytes().to_vec())
    };
    (lower, upper)
}

fn history_prefix(key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(key.len() + 1);
    prefix.extend_from_slice(key.as_bytes());
    prefix.push(0);
    prefix
}

fn history_key(key: &str, block_number: u64, write_index: u32) -> Vec<u8> {
    let mut out = history_prefix(key);
    out.extend_from_slice(&block_number.to_be_bytes());
    out.extend_from_slice(&write_index.to_be_bytes());
    out
}

/// History rows produced by a block, in commit order.
fn history_rows(block: &Block) -> Vec<(String, HistoryRecord)> {
    block
        .transactions
        .iter()
        .flat_map(|tx| {
            tx.writes.iter().map(move |write| {
                (
                    write.key.clone(),
                    HistoryRecord {
                        tx_id: tx.tx_id.clone(),
                        timestamp: tx.timestamp,
                        is_delete: write.is_delete,
                        value: if write.is_delete {
                            None
                        } else {
                            write.value.clone()
                        },
                    },
                )
            })
        })
        .collect()
}

/// Sled-backed implementation
pub struct SledStorage {
    db: Db,
    state: Tree,
    history: Tree,
    blocks: Tree,
    transactions: Tree,
    metadata: Tree,
}

impl SledStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let state = db.open_tree("state")?;
        let history = db.open_tree("history")?;
        let blocks = db.open_tree("blocks")?;
        let transactions = db.open_tree("transactions")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            state,
            history,
            blocks,
            transactions,
            metadata,
        })
    }

    fn read_height(tree: &Tree) -> Result<u64> {
        match tree.get(HEIGHT_KEY)? {
            Some(v) => {
                let bytes: [u8; 8] = v.as_ref().try_into().map_err(|_| {
                    StorageError::Corrupt(format!("height has {} bytes", v.len()))
                })?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }
}

impl Storage for SledStorage {
    fn get_state(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .get(key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    fn state_range(&self, start: &str, end: &str) -> Result<Vec<(String, String)>> {
        if range_is_inverted(start, end) {
            return Ok(Vec::new());
        }
        self.state
            .range(range_bounds(start, end))
            .map(|item| {
                let (k, v) = item?;
                Ok((
                    String::from_utf8_lossy(&k).into_owned(),
                    String::from_utf8_lossy(&v).into_owned(),
                ))
            })
            .collect()
    }

    fn get_history(&self, key: &str) -> Result<Vec<HistoryRecord>> {
        let mut records = Vec::new();
        for item in self.history.scan_prefix(history_prefix(key)) {
            let (_, v) = item?;
            records.push(serde_json::from_slice(&v)?);
        }
        Ok(records)
    }

    fn commit_block(&self, block: &Block) -> Result<()> {
        let expected = Self::read_height(&self.metadata)?;
        let number = block.number();
        if number != expected {
            return Err(StorageError::OutOfOrder {
                expected,
                got: number,
            }
            .into());
        }

        let block_bytes = serde_json::to_vec(block)?;
        let mut rows = Vec::new();
        for (index, (key, record)) in history_rows(block).into_iter().enumerate() {
            let encoded = serde_json::to_vec(&record)?;
            rows.push((key, index as u32, record, encoded));
        }

        let tx_ids: Vec<&str> = block.transactions.iter().map(|tx| tx.tx_id.as_str()).collect();

        let outcome: std::result::Result<(), TransactionError<StorageError>> = (
            &self.state,
            &self.history,
            &self.blocks,
            &self.transactions,
            &self.metadata,
        )
            .transaction(
                |(state, history, blocks, transactions, metadata)| {
                    for (key, index, record, encoded) in &rows {
                        match &record.value {
                            Some(value) if !record.is_delete => {
                                state.insert(key.as_bytes(), value.as_bytes())?;
                            }
                            _ => {
                                state.remove(key.as_bytes())?;
                            }
                        }
                        history.insert(history_key(key, number, *index), encoded.as_slice())?;
                    }
                    for tx_id in &tx_ids {
                        transactions.insert(tx_id.as_bytes(), number.to_be_bytes().to_vec())?;
                    }
                    blocks.insert(number.to_be_bytes().to_vec(), block_bytes.as_slice())?;
                    metadata.insert(HEIGHT_KEY, (number + 1).to_be_bytes().to_vec())?;
                    Ok::<(), ConflictableTransactionError<StorageError>>(())
                },
            );

        outcome.map_err(|e| anyhow::anyhow!("commit of block {number} failed: {e}"))?;
        tracing::debug!(block = number, writes = rows.len(), "committed block");
        Ok(())
    }

    fn has_transaction(&self, tx_id: &str) -> Result<bool> {
        Ok(self.transactions.contains_key(tx_id.as_bytes())?)
    }

    fn get_block_by_number(&self, number: u64) -> Result<Option<Block>> {
        self.blocks
            .get(number.to_be_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(Into::into)
    }

    fn get_height(&self) -> Result<u64> {
        Self::read_height(&self.metadata)
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryInner {
    state: BTreeMap<String, String>,
    history: HashMap<String, Vec<HistoryRecord>>,
    blocks: Vec<Block>,
    tx_ids: HashSet<String>,
}

/// In-memory testing backend
#[derive(Default, Clone)]
pub struct MemoryStorage {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_state(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read().state.get(key).cloned())
    }

    fn state_range(&self, start: &str, end: &str) -> Result<Vec<(String, String)>> {
        if range_is_inverted(start, end) {
            return Ok(Vec::new());
        }
        let lower = if start.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(start)
        };
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(end)
        };
        Ok(self
            .inner
            .read()
            .state
            .range::<str, _>((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn get_history(&self, key: &str) -> Result<Vec<HistoryRecord>> {
        Ok(self
            .inner
            .read()
            .history
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn commit_block(&self, block: &Block) -> Result<()> {
        let mut inner = self.inner.write();
        let expected = inner.blocks.len() as u64;
        if block.number() != expected {
            return Err(StorageError::OutOfOrder {
                expected,
                got: block.number(),
            }
            .into());
        }

        for (key, record) in history_rows(block) {
            match &record.value {
                Some(value) if !record.is_delete => {
                    inner.state.insert(key.clone(), value.clone());
                }
                _ => {
                    inner.state.remove(&key);
                }
            }
            inner.history.entry(key).or_default().push(record);
        }
        inner
            .tx_ids
            .extend(block.transactions.iter().map(|tx| tx.tx_id.clone()));
        inner.blocks.push(block.clone());
        Ok(())
    }

    fn has_transaction(&self, tx_id: &str) -> Result<bool> {
        Ok(self.inner.read().tx_ids.contains(tx_id))
    }

    fn get_block_by_number(&self, number: u64) -> Result<Option<Block>> {
        Ok(self.inner.read().blocks.get(number as usize).cloned())
    }

    fn get_height(&self) -> Result<u64> {
        Ok(self.inner.read().blocks.len() as u64)
    }
}
