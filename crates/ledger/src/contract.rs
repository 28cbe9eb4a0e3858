//! The asset contract: the rules for creating, updating, listing and
//! historizing asset records in world state.

use chrono::{DateTime, Utc};
use filechain_storage::{HistoryRecord, Storage};
use filechain_types::{
    file_extension, Asset, AssetHistoryEntry, AssetRecord, KvWrite, LedgerTimestamp,
    CREATE_ASSET_ARG_COUNT,
};

use crate::errors::*;

pub const INIT_LEDGER: &str = "InitLedger";
pub const CREATE_ASSET: &str = "CreateAsset";
pub const READ_ASSET: &str = "ReadAsset";
pub const TRANSFER_ASSET: &str = "TransferAsset";
pub const DELETE_ASSET: &str = "DeleteAsset";
pub const ASSET_EXISTS: &str = "AssetExists";
pub const GET_ASSETS_BY_RANGE: &str = "GetAssetsByRange";
pub const GET_ASSET_HISTORY: &str = "GetAssetHistory";

/// Execution context of one transaction.
///
/// Reads see the transaction's own pending writes first, then committed
/// state. Range and history queries only see committed state.
pub struct TxContext<'a> {
    storage: &'a dyn Storage,
    tx_id: String,
    timestamp: LedgerTimestamp,
    writes: Vec<KvWrite>,
}

impl<'a> TxContext<'a> {
    pub fn new(storage: &'a dyn Storage, tx_id: String, timestamp: LedgerTimestamp) -> Self {
        Self {
            storage,
            tx_id,
            timestamp,
            writes: Vec::new(),
        }
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    pub fn timestamp(&self) -> LedgerTimestamp {
        self.timestamp
    }

    pub fn get_state(&self, key: &str) -> Result<Option<String>> {
        if let Some(write) = self.writes.iter().rev().find(|w| w.key == key) {
            return Ok(write.value.clone());
        }
        Ok(self.storage.get_state(key)?)
    }

    pub fn put_state(&mut self, key: &str, value: String) {
        self.writes.push(KvWrite {
            key: key.to_string(),
            is_delete: false,
            value: Some(value),
        });
    }

    pub fn delete_state(&mut self, key: &str) {
        self.writes.push(KvWrite {
            key: key.to_string(),
            is_delete: true,
            value: None,
        });
    }

    pub fn range(&self, start: &str, end: &str) -> Result<Vec<(String, String)>> {
        Ok(self.storage.state_range(start, end)?)
    }

    pub fn history(&self, key: &str) -> Result<Vec<HistoryRecord>> {
        Ok(self.storage.get_history(key)?)
    }

    pub fn into_writes(self) -> Vec<KvWrite> {
        self.writes
    }
}

/// True for functions that never write world state.
pub fn is_read_only(function: &str) -> bool {
    matches!(
        function,
        READ_ASSET | ASSET_EXISTS | GET_ASSETS_BY_RANGE | GET_ASSET_HISTORY
    )
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AssetContract;

impl AssetContract {
    /// Dispatch `function` and return its JSON (or plain text) payload.
    pub fn invoke(&self, ctx: &mut TxContext<'_>, function: &str, args: &[String]) -> Result<Vec<u8>> {
        match function {
            INIT_LEDGER => self.init_ledger(ctx).map(|_| Vec::new()),
            CREATE_ASSET => Ok(serde_json::to_vec(&self.create_asset(ctx, args)?)?),
            READ_ASSET => {
                let [id] = expect_args::<1>(function, args)?;
                Ok(serde_json::to_vec(&self.read_asset(ctx, id)?)?)
            }
            TRANSFER_ASSET => {
                let [id, owner, description] = expect_args::<3>(function, args)?;
                Ok(serde_json::to_vec(&self.transfer_asset(ctx, id, owner, description)?)?)
            }
            DELETE_ASSET => {
                let [id] = expect_args::<1>(function, args)?;
                self.delete_asset(ctx, id).map(|_| Vec::new())
            }
            ASSET_EXISTS => {
                let [id] = expect_args::<1>(function, args)?;
                Ok(self.asset_exists(ctx, id)?.to_string().into_bytes())
            }
            GET_ASSETS_BY_RANGE => {
                let [start, end] = expect_args::<2>(function, args)?;
                Ok(serde_json::to_vec(&self.assets_by_range(ctx, start, end)?)?)
            }
            GET_ASSET_HISTORY => {
                let [id] = expect_args::<1>(function, args)?;
                Ok(serde_json::to_vec(&self.asset_history(ctx, id)?)?)
            }
            other => Err(LedgerError::UnknownTransaction(other.to_string())),
        }
    }

    /// Seed sample assets into an empty world state.
    pub fn init_ledger(&self, ctx: &mut TxContext<'_>) -> Result<()> {
        if !ctx.range("", "")?.is_empty() {
            return Err(LedgerError::AlreadyInitialized);
        }
        let upload_time = ctx.timestamp().to_datetime().unwrap_or_else(Utc::now);
        for asset in sample_assets(upload_time) {
            let value = serde_json::to_string(&asset)?;
            ctx.put_state(&asset.hash_id, value);
        }
        Ok(())
    }

    pub fn create_asset(&self, ctx: &mut TxContext<'_>, args: &[String]) -> Result<Asset> {
        if args.len() != CREATE_ASSET_ARG_COUNT {
            return Err(LedgerError::InvalidArguments(format!(
                "{CREATE_ASSET} takes {CREATE_ASSET_ARG_COUNT} arguments, got {}",
                args.len()
            )));
        }
        let hash_id = args[0].trim();
        if hash_id.is_empty() {
            return Err(LedgerError::InvalidArguments("hashId must not be empty".into()));
        }
        let file_size = args[4].trim().parse::<u64>().map_err(|_| {
            LedgerError::InvalidArguments(format!("fileSize {:?} is not an unsigned integer", args[4]))
        })?;
        let upload_time = DateTime::parse_from_rfc3339(args[5].trim())
            .map_err(|e| LedgerError::InvalidArguments(format!("uploadTime: {e}")))?
            .with_timezone(&Utc);

        if self.asset_exists(ctx, hash_id)? {
            return Err(LedgerError::AlreadyExists(hash_id.to_string()));
        }

        let asset = Asset {
            hash_id: hash_id.to_string(),
            file_name: args[1].clone(),
            file_type: args[2].clone(),
            file_extension: args[3].clone(),
            file_size,
            upload_time,
            content_path: args[6].clone(),
            owner_info: args[7].clone(),
            description: args[8].clone(),
        };
        ctx.put_state(hash_id, serde_json::to_string(&asset)?);
        Ok(asset)
    }

    pub fn read_asset(&self, ctx: &TxContext<'_>, id: &str) -> Result<Asset> {
        let value = ctx
            .get_state(id)?
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(&value)?)
    }

    /// Overwrite the mutable fields; everything else is left untouched.
    pub fn transfer_asset(
        &self,
        ctx: &mut TxContext<'_>,
        id: &str,
        owner_info: &str,
        description: &str,
    ) -> Result<Asset> {
        let mut asset = self.read_asset(ctx, id)?;
        asset.owner_info = owner_info.to_string();
        asset.description = description.to_string();
        ctx.put_state(id, serde_json::to_string(&asset)?);
        Ok(asset)
    }

    pub fn delete_asset(&self, ctx: &mut TxContext<'_>, id: &str) -> Result<()> {
        if !self.asset_exists(ctx, id)? {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        ctx.delete_state(id);
        Ok(())
    }

    pub fn asset_exists(&self, ctx: &TxContext<'_>, id: &str) -> Result<bool> {
        Ok(ctx.get_state(id)?.is_some())
    }

    pub fn assets_by_range(&self, ctx: &TxContext<'_>, start: &str, end: &str) -> Result<Vec<AssetRecord>> {
        ctx.range(start, end)?
            .into_iter()
            .map(|(key, value)| -> Result<AssetRecord> {
                Ok(AssetRecord {
                    record: serde_json::from_str(&value)?,
                    key,
                })
            })
            .collect()
    }

    /// Every committed version of the asset's mutable fields, oldest first.
    pub fn asset_history(&self, ctx: &TxContext<'_>, id: &str) -> Result<Vec<AssetHistoryEntry>> {
        ctx.history(id)?
            .into_iter()
            .map(|record| -> Result<AssetHistoryEntry> {
                let (owner_info, description) = match (&record.value, record.is_delete) {
                    (Some(value), false) => {
                        let asset: Asset = serde_json::from_str(value)?;
                        (asset.owner_info, asset.description)
                    }
                    _ => (String::new(), String::new()),
                };
                Ok(AssetHistoryEntry {
                    tx_id: record.tx_id,
                    timestamp: record.timestamp,
                    is_delete: record.is_delete,
                    owner_info,
                    description,
                })
            })
            .collect()
    }
}

fn expect_args<'a, const N: usize>(function: &str, args: &'a [String]) -> Result<[&'a str; N]> {
    if args.len() != N {
        return Err(LedgerError::InvalidArguments(format!(
            "{function} takes {N} arguments, got {}",
            args.len()
        )));
    }
    Ok(std::array::from_fn(|i| args[i].as_str()))
}

fn sample_assets(upload_time: DateTime<Utc>) -> Vec<Asset> {
    const SAMPLES: [(&str, &str, &str, &str); 3] = [
        ("welcome.txt", "text/plain", "Welcome to filechain.", "Sample text file"),
        ("logo.svg", "image/svg+xml", "<svg xmlns=\"http://www.w3.org/2000/svg\"/>", "Sample image"),
        ("report.csv", "text/csv", "id,name\n1,sample\n", "Sample spreadsheet"),
    ];

    SAMPLES
        .iter()
        .map(|(name, mime, body, description)| {
            // Only the digest is recorded; the bytes are not in any content store.
            Asset {
                hash_id: blake3::hash(body.as_bytes()).to_hex().to_string(),
                file_name: name.to_string(),
                file_type: mime.to_string(),
                file_extension: file_extension(name),
                file_size: body.len() as u64,
                upload_time,
                content_path: String::new(),
                owner_info: "filechain".to_string(),
                description: description.to_string(),
            }
        })
        .collect()
}
