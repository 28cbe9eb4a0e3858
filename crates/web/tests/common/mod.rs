//! Shared fixture: a web app wired to an embedded ledger, a local CA and an
//! in-memory content store. Both backends sit behind switches that make them
//! fail like an unreachable peer.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use async_trait::async_trait;
use filechain_content::{
    ContentDigest, ContentError, ContentStore, MemoryContentStore, StoredContent,
};
use filechain_identity::{
    CertificateAuthority, LocalCertificateAuthority, Wallet, ADMIN_USER_ID, ADMIN_USER_PASSWD,
};
use filechain_ledger::{Gateway, Ledger, LedgerClient, LedgerError, LedgerSettings, Proposal};
use filechain_storage::MemoryStorage;
use filechain_web::{build_router, AppState, AssetService, ServiceSettings, UploadedFile};
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const BOUNDARY: &str = "filechain-test-boundary";

/// Switches that take the backends offline.
#[derive(Default)]
pub struct Faults {
    content_down: AtomicBool,
    ledger_down: AtomicBool,
}

impl Faults {
    pub fn set_content_down(&self, down: bool) {
        self.content_down.store(down, Ordering::SeqCst);
    }

    pub fn set_ledger_down(&self, down: bool) {
        self.ledger_down.store(down, Ordering::SeqCst);
    }
}

struct FlakyContentStore {
    inner: Arc<MemoryContentStore>,
    faults: Arc<Faults>,
}

impl FlakyContentStore {
    fn check(&self) -> filechain_content::Result<()> {
        if self.faults.content_down.load(Ordering::SeqCst) {
            return Err(ContentError::Connection("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FlakyContentStore {
    async fn store(&self, bytes: &[u8]) -> filechain_content::Result<StoredContent> {
        self.check()?;
        self.inner.store(bytes).await
    }

    async fn hash_only(&self, bytes: &[u8]) -> filechain_content::Result<ContentDigest> {
        self.check()?;
        self.inner.hash_only(bytes).await
    }

    async fn fetch(&self, id: &str) -> filechain_content::Result<Vec<u8>> {
        self.check()?;
        self.inner.fetch(id).await
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}

struct FlakyLedger {
    inner: Arc<Ledger>,
    faults: Arc<Faults>,
}

impl FlakyLedger {
    fn check(&self) -> filechain_ledger::Result<()> {
        if self.faults.ledger_down.load(Ordering::SeqCst) {
            return Err(LedgerError::Connection("peer unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for FlakyLedger {
    async fn submit(&self, proposal: Proposal) -> filechain_ledger::Result<Vec<u8>> {
        self.check()?;
        self.inner.submit(&proposal).await
    }

    async fn evaluate(&self, proposal: Proposal) -> filechain_ledger::Result<Vec<u8>> {
        self.check()?;
        self.inner.evaluate(&proposal).await
    }

    fn endpoint(&self) -> String {
        LedgerClient::endpoint(self.inner.as_ref())
    }
}

pub struct TestApp {
    _dir: TempDir,
    pub wallet_dir: PathBuf,
    pub service: Arc<AssetService>,
    pub ledger: Arc<Ledger>,
    pub content: Arc<MemoryContentStore>,
    pub faults: Arc<Faults>,
}

impl TestApp {
    pub fn new(settings: ServiceSettings) -> Self {
        let dir = TempDir::new().unwrap();
        let ca = LocalCertificateAuthority::open(
            dir.path().join("ca"),
            "ca.org1.example.com",
            &settings.msp_id,
            ADMIN_USER_ID,
            ADMIN_USER_PASSWD,
        )
        .unwrap();
        let wallet_dir = dir.path().join("wallet");
        let wallet = Wallet::open(&wallet_dir).unwrap();
        let ledger = Arc::new(
            Ledger::open(
                Arc::new(MemoryStorage::new()),
                LedgerSettings {
                    channel: settings.channel.clone(),
                    chaincode: settings.chaincode.clone(),
                    trusted_msps: HashMap::from([(settings.msp_id.clone(), ca.public_key())]),
                },
            )
            .unwrap(),
        );
        let content = Arc::new(MemoryContentStore::new("/content"));
        let faults = Arc::new(Faults::default());
        let service = Arc::new(AssetService::new(
            Gateway::new(Arc::new(FlakyLedger {
                inner: ledger.clone(),
                faults: faults.clone(),
            })),
            Arc::new(wallet),
            Arc::new(ca),
            Arc::new(FlakyContentStore {
                inner: content.clone(),
                faults: faults.clone(),
            }),
            settings,
        ));
        Self {
            _dir: dir,
            wallet_dir,
            service,
            ledger,
            content,
            faults,
        }
    }

    pub fn router(&self) -> Router {
        let mut state = AppState::new(self.service.clone(), "test-node");
        state.ledger = Some(self.ledger.clone());
        build_router(Arc::new(state))
    }

    pub fn router_with_ledger_api(&self) -> Router {
        let mut state = AppState::new(self.service.clone(), "test-node");
        state.ledger = Some(self.ledger.clone());
        state.expose_ledger_api = true;
        build_router(Arc::new(state))
    }
}

pub fn default_app() -> TestApp {
    TestApp::new(ServiceSettings::default())
}

pub fn file(name: &str, content_type: &str, bytes: &[u8]) -> UploadedFile {
    UploadedFile {
        file_name: name.to_string(),
        content_type: Some(content_type.to_string()),
        bytes: bytes.to_vec(),
    }
}

/// Encode a `multipart/form-data` body.
pub fn multipart_body(files: &[(&str, &str, &[u8])], fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, content_type, bytes) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"fileUploaded\"; filename=\"{name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
