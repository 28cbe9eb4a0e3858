//! Asset workflows: orchestration of the content store, the wallet, the CA
//! and the ledger gateway behind the HTTP pages.
//!
//! Every call opens its own gateway connection and drops it on return. The
//! only state shared between calls is the one-shot bootstrap cell.

use chrono::Utc;
use filechain_content::ContentStore;
use filechain_identity::{
    enroll_admin, register_and_enroll_user, AdminCredentials, CertificateAuthority, Wallet,
    WalletEntry,
};
use filechain_ledger::contract::{
    CREATE_ASSET, DELETE_ASSET, GET_ASSETS_BY_RANGE, GET_ASSET_HISTORY, INIT_LEDGER, READ_ASSET,
    TRANSFER_ASSET,
};
use filechain_ledger::{
    ConnectOptions, Gateway, GatewayConnection, LedgerError, GET_BLOCK_BY_NUMBER, GET_CHAIN_INFO,
    QSCC,
};
use filechain_types::{file_extension, Asset, AssetHistoryEntry, AssetRecord, Block, ChainInfo};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::errors::*;

pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// Names the workflows transact under.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub channel: String,
    pub chaincode: String,
    pub msp_id: String,
    /// Wallet label of the identity used for ordinary transactions.
    pub app_user: String,
    pub affiliation: String,
    pub admin: AdminCredentials,
    /// Skip the `InitLedger` call during bootstrap.
    pub skip_init: bool,
    pub discovery_enabled: bool,
    /// Asset deletion is disabled unless this is set.
    pub admin_token: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            channel: "mychannel".to_string(),
            chaincode: "ledger".to_string(),
            msp_id: "Org1MSP".to_string(),
            app_user: "appUser".to_string(),
            affiliation: "org1.department1".to_string(),
            admin: AdminCredentials::default(),
            skip_init: false,
            discovery_enabled: true,
            admin_token: None,
        }
    }
}

/// One file taken from an upload form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Created,
    /// The content was already registered; its mutable fields were updated.
    Updated,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub asset: Asset,
    pub status: UploadStatus,
}

/// Per-file result of a multi-file upload.
#[derive(Debug)]
pub struct UploadReport {
    pub file_name: String,
    pub result: Result<UploadOutcome>,
}

/// An asset together with every recorded version of its mutable fields.
#[derive(Debug, Clone)]
pub struct AssetListing {
    pub asset: Asset,
    pub history: Vec<AssetHistoryEntry>,
}

#[derive(Debug, Clone)]
pub enum SearchResult {
    Found(Asset),
    /// No asset is registered under this content id.
    Unmatched(String),
}

#[derive(Debug, Clone)]
pub struct RegistrationForm {
    pub ca_name: String,
    pub msp_id: String,
    pub affiliation: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    Registered,
    AlreadyEnrolled,
}

pub struct AssetService {
    gateway: Gateway,
    wallet: Arc<Wallet>,
    ca: Arc<dyn CertificateAuthority>,
    content: Arc<dyn ContentStore>,
    settings: ServiceSettings,
    bootstrapped: OnceCell<()>,
}

impl AssetService {
    pub fn new(
        gateway: Gateway,
        wallet: Arc<Wallet>,
        ca: Arc<dyn CertificateAuthority>,
        content: Arc<dyn ContentStore>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            gateway,
            wallet,
            ca,
            content,
            settings,
            bootstrapped: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn content_backend(&self) -> &'static str {
        self.content.backend()
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.initialized()
    }

    /// Enroll the admin, register the application user and seed the ledger.
    ///
    /// Runs once per process; a failed attempt is retried by the next call.
    pub async fn bootstrap(&self) -> Result<()> {
        self.bootstrapped
            .get_or_try_init(|| async {
                let msp_id = &self.settings.msp_id;
                enroll_admin(self.ca.as_ref(), &self.wallet, msp_id, &self.settings.admin).await?;
                register_and_enroll_user(
                    self.ca.as_ref(),
                    &self.wallet,
                    msp_id,
                    &self.settings.app_user,
                    &self.settings.affiliation,
                    &self.settings.admin.enrollment_id,
                )
                .await?;

                if self.settings.skip_init {
                    debug!("skipping ledger initialization");
                } else {
                    let connection = self.connect(&self.settings.app_user)?;
                    let contract = connection
                        .network(&self.settings.channel)
                        .contract(&self.settings.chaincode);
                    match contract.submit(INIT_LEDGER, &[]).await {
                        Ok(_) => info!(channel = %self.settings.channel, "ledger initialized with sample assets"),
                        Err(LedgerError::AlreadyInitialized) => {
                            warn!(channel = %self.settings.channel, "ledger already initialized")
                        }
                        Err(err) => return Err(WorkflowError::from(err)),
                    }
                }
                Ok::<(), WorkflowError>(())
            })
            .await
            .map(|_| ())
    }

    fn connect(&self, label: &str) -> Result<GatewayConnection> {
        let identity = self.wallet.get(label)?.ok_or_else(|| {
            WorkflowError::NotFound(format!("identity {label} (register it before transacting)"))
        })?;
        let options = ConnectOptions {
            identity_label: label.to_string(),
            discovery_enabled: self.settings.discovery_enabled,
        };
        Ok(self.gateway.connect(identity, options)?)
    }

    async fn app_connection(&self) -> Result<GatewayConnection> {
        self.bootstrap().await?;
        self.connect(&self.settings.app_user)
    }

    /// Store `file` and register it as an asset. Byte-identical content that
    /// is already registered keeps its immutable fields and gets the new owner
    /// and description instead.
    pub async fn upload(&self, file: UploadedFile, owner_info: &str, description: &str) -> Result<UploadOutcome> {
        if file.bytes.is_empty() {
            return Err(WorkflowError::ValidationFailure(format!(
                "{} is empty",
                display_name(&file.file_name)
            )));
        }
        let connection = self.app_connection().await?;
        let contract = connection
            .network(&self.settings.channel)
            .contract(&self.settings.chaincode);

        let stored = self.content.store(&file.bytes).await?;
        let asset = Asset {
            hash_id: stored.id.clone(),
            file_extension: file_extension(&file.file_name),
            file_name: file.file_name,
            file_type: file
                .content_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string()),
            file_size: stored.size,
            upload_time: Utc::now(),
            content_path: stored.path,
            owner_info: owner_info.trim().to_string(),
            description: description.trim().to_string(),
        };
        let args = asset.create_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match contract.submit_json::<Asset>(CREATE_ASSET, &args).await {
            Ok(created) => {
                info!(hash_id = %created.hash_id, size = created.file_size, "asset created");
                Ok(UploadOutcome {
                    asset: created,
                    status: UploadStatus::Created,
                })
            }
            Err(LedgerError::AlreadyExists(_)) => {
                let updated = contract
                    .submit_json::<Asset>(
                        TRANSFER_ASSET,
                        &[
                            asset.hash_id.as_str(),
                            asset.owner_info.as_str(),
                            asset.description.as_str(),
                        ],
                    )
                    .await?;
                info!(hash_id = %updated.hash_id, "content already registered, asset updated");
                Ok(UploadOutcome {
                    asset: updated,
                    status: UploadStatus::Updated,
                })
            }
            Err(err) => {
                warn!(
                    hash_id = %asset.hash_id,
                    error = %err,
                    "ledger write failed, stored content is orphaned"
                );
                Err(err.into())
            }
        }
    }

    /// [`AssetService::upload`] for each file, in order. One failure does not
    /// stop the others.
    pub async fn upload_many(
        &self,
        files: Vec<UploadedFile>,
        owner_info: &str,
        description: &str,
    ) -> Result<Vec<UploadReport>> {
        if files.is_empty() {
            return Err(WorkflowError::ValidationFailure("no files were uploaded".into()));
        }
        let mut reports = Vec::with_capacity(files.len());
        for file in files {
            let file_name = file.file_name.clone();
            let result = self.upload(file, owner_info, description).await;
            reports.push(UploadReport { file_name, result });
        }
        Ok(reports)
    }

    /// Find the asset registered for `bytes` without storing them.
    pub async fn search(&self, bytes: &[u8]) -> Result<SearchResult> {
        if bytes.is_empty() {
            return Err(WorkflowError::ValidationFailure("search file is empty".into()));
        }
        let digest = self.content.hash_only(bytes).await?;
        match self.read_asset(&digest.id).await {
            Ok(asset) => Ok(SearchResult::Found(asset)),
            Err(WorkflowError::NotFound(_)) => {
                debug!(hash_id = %digest.id, "no asset matches searched content");
                Ok(SearchResult::Unmatched(digest.id))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn read_asset(&self, hash_id: &str) -> Result<Asset> {
        let connection = self.app_connection().await?;
        let contract = connection
            .network(&self.settings.channel)
            .contract(&self.settings.chaincode);
        Ok(contract.evaluate_json(READ_ASSET, &[hash_id]).await?)
    }

    /// Update the mutable fields of an existing asset.
    pub async fn edit(&self, hash_id: &str, owner_info: &str, description: &str) -> Result<Asset> {
        let hash_id = hash_id.trim();
        if hash_id.is_empty() {
            return Err(WorkflowError::ValidationFailure("hashId is required".into()));
        }
        let connection = self.app_connection().await?;
        let contract = connection
            .network(&self.settings.channel)
            .contract(&self.settings.chaincode);
        let asset: Asset = contract
            .submit_json(TRANSFER_ASSET, &[hash_id, owner_info.trim(), description.trim()])
            .await?;
        info!(hash_id, owner = %asset.owner_info, "asset updated");
        Ok(asset)
    }

    /// Remove an asset from the world state. Signed by the admin identity and
    /// only allowed with the configured admin token.
    pub async fn delete(&self, hash_id: &str, admin_token: &str) -> Result<()> {
        let expected = self
            .settings
            .admin_token
            .as_deref()
            .ok_or_else(|| WorkflowError::Forbidden("asset deletion is disabled".into()))?;
        if !tokens_match(admin_token, expected) {
            return Err(WorkflowError::Forbidden("invalid admin token".into()));
        }

        self.bootstrap().await?;
        let connection = self.connect(&self.settings.admin.enrollment_id)?;
        let contract = connection
            .network(&self.settings.channel)
            .contract(&self.settings.chaincode);
        contract.submit(DELETE_ASSET, &[hash_id]).await?;
        info!(hash_id, "asset deleted");
        Ok(())
    }

    /// Every live asset with its history. Each history query is a separate
    /// read, so the listing is not a consistent snapshot.
    pub async fn list_assets(&self) -> Result<Vec<AssetListing>> {
        let connection = self.app_connection().await?;
        let contract = connection
            .network(&self.settings.channel)
            .contract(&self.settings.chaincode);
        let records: Vec<AssetRecord> = contract.evaluate_json(GET_ASSETS_BY_RANGE, &["", ""]).await?;

        let mut listings = Vec::with_capacity(records.len());
        for record in records {
            let history = contract
                .evaluate_json(GET_ASSET_HISTORY, &[record.key.as_str()])
                .await?;
            listings.push(AssetListing {
                asset: record.record,
                history,
            });
        }
        Ok(listings)
    }

    pub async fn asset_history(&self, hash_id: &str) -> Result<Vec<AssetHistoryEntry>> {
        let connection = self.app_connection().await?;
        let contract = connection
            .network(&self.settings.channel)
            .contract(&self.settings.chaincode);
        let history: Vec<AssetHistoryEntry> =
            contract.evaluate_json(GET_ASSET_HISTORY, &[hash_id]).await?;
        if history.is_empty() {
            return Err(WorkflowError::NotFound(format!("asset {hash_id}")));
        }
        Ok(history)
    }

    pub async fn chain_info(&self) -> Result<ChainInfo> {
        let connection = self.app_connection().await?;
        let qscc = connection.network(&self.settings.channel).contract(QSCC);
        Ok(qscc
            .evaluate_json(GET_CHAIN_INFO, &[self.settings.channel.as_str()])
            .await?)
    }

    pub async fn block(&self, number: u64) -> Result<Block> {
        let connection = self.app_connection().await?;
        let qscc = connection.network(&self.settings.channel).contract(QSCC);
        let number = number.to_string();
        Ok(qscc
            .evaluate_json(GET_BLOCK_BY_NUMBER, &[self.settings.channel.as_str(), number.as_str()])
            .await?)
    }

    /// Register and enroll a new wallet identity.
    pub async fn register_user(&self, form: RegistrationForm) -> Result<RegistrationStatus> {
        let user_id = form.user_id.trim();
        if user_id.is_empty() {
            return Err(WorkflowError::ValidationFailure("user id is required".into()));
        }
        if form.ca_name.trim() != self.ca.name() {
            return Err(WorkflowError::ValidationFailure(format!(
                "unknown certificate authority {}",
                form.ca_name
            )));
        }
        self.bootstrap().await?;
        if self.wallet.exists(user_id)? {
            return Ok(RegistrationStatus::AlreadyEnrolled);
        }
        register_and_enroll_user(
            self.ca.as_ref(),
            &self.wallet,
            form.msp_id.trim(),
            user_id,
            form.affiliation.trim(),
            &self.settings.admin.enrollment_id,
        )
        .await?;
        Ok(RegistrationStatus::Registered)
    }

    pub fn identities(&self) -> Result<Vec<WalletEntry>> {
        Ok(self.wallet.list()?)
    }

    pub fn certificate_authorities(&self) -> Vec<String> {
        vec![self.ca.name().to_string()]
    }

    pub async fn fetch_content(&self, hash_id: &str) -> Result<Vec<u8>> {
        Ok(self.content.fetch(hash_id).await?)
    }
}

/// Compares digests so the time taken does not depend on where the tokens
/// first differ. `blake3::Hash` equality is constant time.
fn tokens_match(given: &str, expected: &str) -> bool {
    blake3::hash(given.as_bytes()) == blake3::hash(expected.as_bytes())
}

fn display_name(file_name: &str) -> &str {
    if file_name.is_empty() {
        "uploaded file"
    } else {
        file_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret ", "s3cret"));
        assert!(!tokens_match("", "s3cret"));
        assert!(!tokens_match("S3CRET", "s3cret"));
    }
}
