//! Single-node embedded ledger.
//!
//! Executes the asset contract against its own world state and commits one
//! block per submitted transaction. Commits are serialised by an async mutex
//! so block numbers are strictly sequential; concurrent writers to the same
//! key resolve as last-committed-wins.

use filechain_identity::{Certificate, Role};
use filechain_storage::Storage;
use filechain_types::{ledger_timestamp_now, Block, ChainInfo, TransactionEnvelope};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::contract::{is_read_only, AssetContract, TxContext, DELETE_ASSET};
use crate::errors::*;
use crate::proposal::Proposal;

/// System chaincode answering block and chain queries.
pub const QSCC: &str = "qscc";
pub const GET_BLOCK_BY_NUMBER: &str = "GetBlockByNumber";
pub const GET_CHAIN_INFO: &str = "GetChainInfo";

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub channel: String,
    pub chaincode: String,
    /// MSP id to CA public key (hex) for every organisation allowed to transact.
    pub trusted_msps: HashMap<String, String>,
}

pub struct Ledger {
    storage: Arc<dyn Storage>,
    settings: LedgerSettings,
    contract: AssetContract,
    commit_lock: Mutex<()>,
}

impl Ledger {
    /// Open the ledger, committing a genesis block into empty storage.
    pub fn open(storage: Arc<dyn Storage>, settings: LedgerSettings) -> Result<Self> {
        if storage.get_height()? == 0 {
            storage.commit_block(&Block::genesis())?;
            tracing::info!(channel = %settings.channel, "committed genesis block");
        }
        Ok(Self {
            storage,
            settings,
            contract: AssetContract,
            commit_lock: Mutex::new(()),
        })
    }

    pub fn channel(&self) -> &str {
        &self.settings.channel
    }

    pub fn height(&self) -> Result<u64> {
        Ok(self.storage.get_height()?)
    }

    fn authorize(&self, proposal: &Proposal) -> Result<Certificate> {
        let ca_key = self
            .settings
            .trusted_msps
            .get(&proposal.creator.msp_id)
            .ok_or_else(|| {
                LedgerError::Unauthorized(format!("MSP {} is not a member", proposal.creator.msp_id))
            })?;
        proposal.verify(ca_key)
    }

    fn check_channel(&self, channel: &str) -> Result<()> {
        if channel != self.settings.channel {
            return Err(LedgerError::ChannelNotFound(channel.to_string()));
        }
        Ok(())
    }

    fn check_chaincode(&self, chaincode: &str) -> Result<()> {
        if chaincode != self.settings.chaincode {
            return Err(LedgerError::ChaincodeNotFound(chaincode.to_string()));
        }
        Ok(())
    }

    /// Endorse, order and commit a state-changing transaction.
    ///
    /// `DeleteAsset` is reserved for admin certificates, and a transaction id
    /// is committed at most once.
    pub async fn submit(&self, proposal: &Proposal) -> Result<Vec<u8>> {
        let certificate = self.authorize(proposal)?;
        self.check_channel(&proposal.channel)?;
        self.check_chaincode(&proposal.chaincode)?;
        if proposal.function == DELETE_ASSET && certificate.body.role != Role::Admin {
            return Err(LedgerError::Unauthorized(format!(
                "{DELETE_ASSET} requires an admin identity, {} is a client",
                certificate.body.subject
            )));
        }

        let _guard = self.commit_lock.lock().await;
        let tx_id = proposal.tx_id();
        if self.storage.has_transaction(&tx_id)? {
            return Err(LedgerError::DuplicateTransaction(tx_id));
        }
        let timestamp = ledger_timestamp_now();

        let mut ctx = TxContext::new(self.storage.as_ref(), tx_id.clone(), timestamp);
        let payload = self
            .contract
            .invoke(&mut ctx, &proposal.function, &proposal.args)?;
        let writes = ctx.into_writes();

        let parent = self
            .storage
            .get_latest_block()?
            .ok_or_else(|| LedgerError::Internal("ledger has no genesis block".into()))?;
        let envelope = TransactionEnvelope {
            tx_id: tx_id.clone(),
            channel: proposal.channel.clone(),
            chaincode: proposal.chaincode.clone(),
            function: proposal.function.clone(),
            args: proposal.args.clone(),
            creator: proposal.creator.clone(),
            signature: proposal.signature.clone(),
            timestamp,
            writes,
        };
        let block = Block::new(parent.number() + 1, parent.hash(), vec![envelope]);
        self.storage.commit_block(&block)?;

        tracing::info!(
            tx_id = %tx_id,
            function = %proposal.function,
            block = block.number(),
            creator = %proposal.creator.label,
            "committed transaction"
        );
        Ok(payload)
    }

    /// Execute a query without ordering or committing anything.
    pub async fn evaluate(&self, proposal: &Proposal) -> Result<Vec<u8>> {
        self.authorize(proposal)?;

        if proposal.chaincode == QSCC {
            return self.system_query(&proposal.function, &proposal.args);
        }

        self.check_channel(&proposal.channel)?;
        self.check_chaincode(&proposal.chaincode)?;
        if !is_read_only(&proposal.function) {
            tracing::debug!(function = %proposal.function, "evaluating a writing function; writes are discarded");
        }

        let mut ctx = TxContext::new(self.storage.as_ref(), proposal.tx_id(), ledger_timestamp_now());
        self.contract
            .invoke(&mut ctx, &proposal.function, &proposal.args)
    }

    fn system_query(&self, function: &str, args: &[String]) -> Result<Vec<u8>> {
        match function {
            GET_BLOCK_BY_NUMBER => {
                let (channel, number) = match args {
                    [channel, number] => (channel, number),
                    _ => {
                        return Err(LedgerError::InvalidArguments(format!(
                            "{GET_BLOCK_BY_NUMBER} takes a channel and a block number"
                        )))
                    }
                };
                self.check_channel(channel)?;
                let number: u64 = number.trim().parse().map_err(|_| {
                    LedgerError::InvalidArguments(format!("{number:?} is not a block number"))
                })?;
                Ok(serde_json::to_vec(&self.block_by_number(number)?)?)
            }
            GET_CHAIN_INFO => {
                let channel = args.first().ok_or_else(|| {
                    LedgerError::InvalidArguments(format!("{GET_CHAIN_INFO} takes a channel"))
                })?;
                self.check_channel(channel)?;
                Ok(serde_json::to_vec(&self.chain_info()?)?)
            }
            other => Err(LedgerError::UnknownTransaction(format!("{QSCC}.{other}"))),
        }
    }

    pub fn block_by_number(&self, number: u64) -> Result<Block> {
        self.storage
            .get_block_by_number(number)?
            .ok_or(LedgerError::BlockNotFound(number))
    }

    pub fn chain_info(&self) -> Result<ChainInfo> {
        let latest = self
            .storage
            .get_latest_block()?
            .ok_or_else(|| LedgerError::Internal("ledger has no genesis block".into()))?;
        Ok(ChainInfo {
            height: latest.number() + 1,
            current_block_hash: latest.hash(),
            previous_block_hash: latest.header.previous_hash,
        })
    }

    pub fn flush(&self) -> Result<()> {
        Ok(self.storage.flush()?)
    }
}
