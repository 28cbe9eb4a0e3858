//! View models for the HTML pages and the helpers that render them.
//!
//! Handlers never build markup themselves: they map workflow results into one
//! of the templates below and hand it to [`render_template`].

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use filechain_identity::WalletEntry;
use filechain_types::{Asset, AssetHistoryEntry, Block, ChainInfo};

use crate::workflows::{AssetListing, UploadReport, UploadStatus};

#[derive(Debug, Clone)]
pub struct AssetRow {
    pub hash_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_extension: String,
    pub file_size: u64,
    pub upload_time: String,
    pub content_path: String,
    pub owner_info: String,
    pub description: String,
}

impl From<&Asset> for AssetRow {
    fn from(asset: &Asset) -> Self {
        Self {
            hash_id: asset.hash_id.clone(),
            file_name: asset.file_name.clone(),
            file_type: asset.file_type.clone(),
            file_extension: asset.file_extension.clone(),
            file_size: asset.file_size,
            upload_time: asset.upload_time.to_rfc3339(),
            content_path: asset.content_path.clone(),
            owner_info: asset.owner_info.clone(),
            description: asset.description.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub tx_id: String,
    pub timestamp: String,
    pub is_delete: bool,
    pub owner_info: String,
    pub description: String,
}

impl From<&AssetHistoryEntry> for HistoryRow {
    fn from(entry: &AssetHistoryEntry) -> Self {
        Self {
            tx_id: entry.tx_id.clone(),
            timestamp: entry.timestamp.to_string(),
            is_delete: entry.is_delete,
            owner_info: entry.owner_info.clone(),
            description: entry.description.clone(),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexView {
    pub content_backend: String,
}

#[derive(Debug, Clone)]
pub struct UploadRow {
    pub file_name: String,
    pub status: String,
    pub asset: Option<AssetRow>,
    pub error: Option<String>,
}

impl From<&UploadReport> for UploadRow {
    fn from(report: &UploadReport) -> Self {
        match &report.result {
            Ok(outcome) => Self {
                file_name: report.file_name.clone(),
                status: match outcome.status {
                    UploadStatus::Created => "created".to_string(),
                    UploadStatus::Updated => "updated".to_string(),
                },
                asset: Some(AssetRow::from(&outcome.asset)),
                error: None,
            },
            Err(err) => Self {
                file_name: report.file_name.clone(),
                status: "failed".to_string(),
                asset: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Template)]
#[template(path = "upload_result.html")]
pub struct UploadResultView {
    pub rows: Vec<UploadRow>,
}

impl UploadResultView {
    pub fn new(reports: &[UploadReport]) -> Self {
        Self {
            rows: reports.iter().map(UploadRow::from).collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterView {
    pub cas: Vec<String>,
    pub msps: Vec<String>,
    pub affiliation: String,
    pub message: Option<String>,
}

#[derive(Template)]
#[template(path = "users.html")]
pub struct UsersView {
    pub users: Vec<WalletEntry>,
}

#[derive(Debug, Clone)]
pub struct ListingRow {
    pub asset: AssetRow,
    pub history: Vec<HistoryRow>,
}

#[derive(Template)]
#[template(path = "assets.html")]
pub struct AssetsView {
    pub listings: Vec<ListingRow>,
    pub deletion_enabled: bool,
}

impl AssetsView {
    pub fn new(listings: &[AssetListing], deletion_enabled: bool) -> Self {
        Self {
            listings: listings
                .iter()
                .map(|listing| ListingRow {
                    asset: AssetRow::from(&listing.asset),
                    history: listing.history.iter().map(HistoryRow::from).collect(),
                })
                .collect(),
            deletion_enabled,
        }
    }
}

#[derive(Template)]
#[template(path = "asset.html")]
pub struct AssetView {
    pub asset: AssetRow,
    /// `view`, `edit` or `delete`.
    pub action: String,
}

#[derive(Template)]
#[template(path = "history.html")]
pub struct HistoryView {
    pub hash_id: String,
    pub history: Vec<HistoryRow>,
}

#[derive(Template)]
#[template(path = "search.html")]
pub struct SearchView {
    /// Digest of a searched file that matched no asset.
    pub unmatched: Option<String>,
}

#[derive(Template)]
#[template(path = "blocks.html")]
pub struct BlocksView {
    pub channel: String,
    pub height: u64,
    pub current_block_hash: String,
    pub numbers: Vec<u64>,
}

impl BlocksView {
    pub fn new(channel: &str, info: &ChainInfo) -> Self {
        Self {
            channel: channel.to_string(),
            height: info.height,
            current_block_hash: hex::encode(info.current_block_hash),
            numbers: (0..info.height).rev().collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "block.html")]
pub struct BlockView {
    pub number: u64,
    pub hash: String,
    pub transaction_count: usize,
    pub json: String,
}

impl BlockView {
    pub fn new(block: &Block) -> Self {
        Self {
            number: block.number(),
            hash: hex::encode(block.hash()),
            transaction_count: block.transactions.len(),
            json: serde_json::to_string_pretty(block).unwrap_or_default(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorView {
    pub status: u16,
    pub reason: String,
    pub message: String,
}

impl ErrorView {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Error").to_string(),
            message: message.into(),
        }
    }
}

/// Render `template` as a 200 HTML response, or an error page if rendering fails.
pub fn render_template<T: Template>(template: T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Template rendering failed: {}", e);
            render_error(StatusCode::INTERNAL_SERVER_ERROR, "Template rendering error")
        }
    }
}

/// Render the error page with `status`, falling back to plain text.
pub fn render_error(status: StatusCode, message: &str) -> Response {
    match ErrorView::new(status, message).render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render error view: {}", e);
            (status, message.to_string()).into_response()
        }
    }
}
