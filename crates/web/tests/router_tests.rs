//! HTTP routes exercised through `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::{engine::general_purpose, Engine as _};
use common::{
    body_string, default_app, file, form_request, get_request, multipart_body, multipart_request,
    TestApp,
};
use filechain_identity::Wallet;
use filechain_ledger::{LedgerErrorResponse, PayloadResponse, Proposal};
use filechain_web::ServiceSettings;
use tower::ServiceExt;

#[tokio::test]
async fn test_health_and_version() {
    let app = default_app();
    let response = app.router().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["node_id"], "test-node");
    assert_eq!(json["content_backend"], "memory");
    assert_eq!(json["ledger_height"], 1);

    let response = app.router().oneshot(get_request("/version")).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_index_and_unknown_route() {
    let app = default_app();
    let response = app.router().oneshot(get_request("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("name=\"fileUploaded\""));
    assert!(html.contains("action=\"/upload-multiple\""));

    let response = app
        .router()
        .oneshot(get_request("/no-such-page"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_form_creates_asset() {
    let app = default_app();
    let body = multipart_body(
        &[("hello.txt", "text/plain", b"hello".as_slice())],
        &[("owner", "alice"), ("desc", "test")],
    );
    let response = app
        .router()
        .oneshot(multipart_request("/upload", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("hello.txt: created"));
    assert!(html.contains("alice"));

    let listings = app.service.list_assets().await.unwrap();
    let uploaded = listings
        .iter()
        .find(|l| l.asset.file_name == "hello.txt")
        .unwrap();
    assert_eq!(uploaded.asset.file_size, 5);
    assert_eq!(uploaded.asset.description, "test");
}

#[tokio::test]
async fn test_upload_without_file_is_bad_request() {
    let app = default_app();
    let body = multipart_body(&[], &[("owner", "alice"), ("desc", "test")]);
    let response = app
        .router()
        .oneshot(multipart_request("/upload", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.content.is_empty());
}

#[tokio::test]
async fn test_upload_multiple_skips_empty_parts() {
    let app = default_app();
    let body = multipart_body(
        &[
            ("one.txt", "text/plain", b"one".as_slice()),
            ("empty.txt", "text/plain", b"".as_slice()),
            ("two.txt", "text/plain", b"two".as_slice()),
        ],
        &[("owner", "alice"), ("desc", "batch")],
    );
    let router = app.router();
    let response = router
        .clone()
        .oneshot(multipart_request("/upload-multiple", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("one.txt: created"));
    assert!(html.contains("two.txt: created"));
    assert!(!html.contains("empty.txt"));
    assert_eq!(app.content.len(), 2);

    let response = router.oneshot(get_request("/metrics")).await.unwrap();
    let metrics = body_string(response).await;
    assert!(metrics.contains("filechain_uploads_total{outcome=\"created\"} 2"));
    assert!(metrics.contains("filechain_ledger_height"));
}

#[tokio::test]
async fn test_edit_form_updates_and_redirects() {
    let app = default_app();
    let id = app
        .service
        .upload(file("hello.txt", "text/plain", b"hello"), "alice", "test")
        .await
        .unwrap()
        .asset
        .hash_id;

    let response = app
        .router()
        .oneshot(get_request(&format!("/getasset/{id}/edit")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("action=\"/postasset\""));

    let response = app
        .router()
        .oneshot(form_request(
            "/postasset",
            &format!("hashId={id}&ownerInfo=+bob+&description=updated"),
        ))
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()[header::LOCATION], "/showassets");

    let asset = app.service.read_asset(&id).await.unwrap();
    assert_eq!(asset.owner_info, "bob");
    assert_eq!(asset.description, "updated");

    let response = app
        .router()
        .oneshot(get_request(&format!("/gethistory/{id}")))
        .await
        .unwrap();
    let html = body_string(response).await;
    let alice = html.find("alice").unwrap();
    let bob = html.find("bob").unwrap();
    assert!(alice < bob);
}

#[tokio::test]
async fn test_get_asset_rejects_unknown_action_and_disabled_delete() {
    let app = default_app();
    let id = app
        .service
        .upload(file("hello.txt", "text/plain", b"hello"), "alice", "test")
        .await
        .unwrap()
        .asset
        .hash_id;

    let response = app
        .router()
        .oneshot(get_request(&format!("/getasset/{id}/frobnicate")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router()
        .oneshot(get_request(&format!("/getasset/{id}/delete")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .router()
        .oneshot(get_request("/getasset/missing/view"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_with_admin_token() {
    let app = TestApp::new(ServiceSettings {
        admin_token: Some("s3cret".into()),
        ..ServiceSettings::default()
    });
    let id = app
        .service
        .upload(file("hello.txt", "text/plain", b"hello"), "alice", "test")
        .await
        .unwrap()
        .asset
        .hash_id;

    let response = app
        .router()
        .oneshot(form_request(
            "/deleteasset",
            &format!("hashId={id}&adminToken=wrong"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .router()
        .oneshot(form_request(
            "/deleteasset",
            &format!("hashId={id}&adminToken=s3cret"),
        ))
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    assert!(app.service.read_asset(&id).await.is_err());
}

#[tokio::test]
async fn test_search_redirects_to_edit_view() {
    let app = default_app();
    let id = app
        .service
        .upload(file("hello.txt", "text/plain", b"hello"), "alice", "test")
        .await
        .unwrap()
        .asset
        .hash_id;

    let body = multipart_body(&[("copy.txt", "text/plain", b"hello".as_slice())], &[]);
    let response = app
        .router()
        .oneshot(multipart_request("/postsearch", body))
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers()[header::LOCATION],
        format!("/getasset/{id}/edit").as_str()
    );

    let body = multipart_body(&[("other.txt", "text/plain", b"other".as_slice())], &[]);
    let response = app
        .router()
        .oneshot(multipart_request("/postsearch", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("No matching asset"));
    assert_eq!(app.content.len(), 1);
}

#[tokio::test]
async fn test_register_and_list_users() {
    let app = default_app();
    let response = app.router().oneshot(get_request("/register")).await.unwrap();
    let html = body_string(response).await;
    assert!(html.contains("ca.org1.example.com"));
    assert!(html.contains("Org1MSP"));

    let response = app
        .router()
        .oneshot(form_request(
            "/postregister",
            "cas=ca.org1.example.com&msps=Org1MSP&orgs=org1.department1&userid=dave",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("Registered and enrolled user dave"));

    let response = app.router().oneshot(get_request("/getusers")).await.unwrap();
    let html = body_string(response).await;
    for label in ["admin", "appUser", "dave"] {
        assert!(html.contains(label), "missing {label}");
    }
    assert!(html.contains("ed25519"));
}

#[tokio::test]
async fn test_block_pages() {
    let app = default_app();
    let response = app.router().oneshot(get_request("/block")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("/block/1"));
    assert!(html.contains("/block/0"));

    let response = app.router().oneshot(get_request("/block/1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("InitLedger"));

    let response = app.router().oneshot(get_request("/block/42")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.router().oneshot(get_request("/block/abc")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_content_download_uses_recorded_type() {
    let app = default_app();
    let id = app
        .service
        .upload(file("hello.txt", "text/plain", b"hello"), "alice", "test")
        .await
        .unwrap()
        .asset
        .hash_id;

    let response = app
        .router()
        .oneshot(get_request(&format!("/content/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
    assert_eq!(body_string(response).await, "hello");

    let response = app
        .router()
        .oneshot(get_request("/content/unknown"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_content_with_active_type_is_served_as_attachment() {
    let app = default_app();
    let page = b"<script>alert(document.cookie)</script>";
    let id = app
        .service
        .upload(file("evil page.html", "text/html", page), "mallory", "test")
        .await
        .unwrap()
        .asset
        .hash_id;

    let response = app
        .router()
        .oneshot(get_request(&format!("/content/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"evilpage.html\""
    );
    assert_eq!(body_string(response).await.as_bytes(), page);
}

#[tokio::test]
async fn test_sample_assets_have_no_content_link() {
    let app = default_app();
    let response = app.router().oneshot(get_request("/showassets")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("welcome.txt"));
    assert!(html.contains("not stored"));
    assert!(!html.contains("href=\"/content/"));
}

fn proposal_request(uri: &str, proposal: &Proposal) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(proposal).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_ledger_api_is_opt_in() {
    let app = default_app();
    app.service.bootstrap().await.unwrap();
    let wallet = Wallet::open(&app.wallet_dir).unwrap();
    let identity = wallet.require("appUser").unwrap();
    let proposal = Proposal::signed(
        &identity,
        "appUser",
        "mychannel",
        "ledger",
        "GetAssetsByRange",
        vec![String::new(), String::new()],
    )
    .unwrap();

    let response = app
        .router()
        .oneshot(proposal_request("/api/ledger/evaluate", &proposal))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router_with_ledger_api()
        .oneshot(proposal_request("/api/ledger/evaluate", &proposal))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: PayloadResponse = serde_json::from_str(&body_string(response).await).unwrap();
    let payload = general_purpose::STANDARD.decode(body.payload).unwrap();
    let records: Vec<serde_json::Value> = serde_json::from_slice(&payload).unwrap();
    assert_eq!(records.len(), 3);

    let missing = Proposal::signed(
        &identity,
        "appUser",
        "mychannel",
        "ledger",
        "ReadAsset",
        vec!["missing".into()],
    )
    .unwrap();
    let response = app
        .router_with_ledger_api()
        .oneshot(proposal_request("/api/ledger/evaluate", &missing))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: LedgerErrorResponse = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body.code, "not_found");
    assert_eq!(body.detail, "missing");
}

#[tokio::test]
async fn test_ledger_api_rejects_client_delete() {
    let app = default_app();
    let id = app
        .service
        .upload(file("keep.txt", "text/plain", b"keep me"), "alice", "test")
        .await
        .unwrap()
        .asset
        .hash_id;
    let wallet = Wallet::open(&app.wallet_dir).unwrap();
    let identity = wallet.require("appUser").unwrap();
    let delete = Proposal::signed(
        &identity,
        "appUser",
        "mychannel",
        "ledger",
        "DeleteAsset",
        vec![id.clone()],
    )
    .unwrap();

    let response = app
        .router_with_ledger_api()
        .oneshot(proposal_request("/api/ledger/submit", &delete))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: LedgerErrorResponse = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body.code, "unauthorized");

    assert_eq!(app.service.read_asset(&id).await.unwrap().hash_id, id);
}
