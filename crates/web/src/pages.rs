//! HTML page handlers.

use axum::extract::{Multipart, Path as AxumPath, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use tracing::{error, warn};

use crate::errors::WorkflowError;
use crate::intake::read_upload_form;
use crate::server::SharedState;
use crate::views::{
    render_error, render_template, AssetView, AssetsView, BlockView, BlocksView, HistoryView,
    IndexView, RegisterView, SearchView, UploadResultView, UsersView,
};
use crate::workflows::{
    RegistrationForm, RegistrationStatus, SearchResult, UploadReport, DEFAULT_FILE_TYPE,
};

/// A workflow failure rendered as an error page.
#[derive(Debug)]
pub struct PageError(WorkflowError);

impl From<WorkflowError> for PageError {
    fn from(err: WorkflowError) -> Self {
        Self(err)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status.is_server_error() {
            error!("request failed: {}", self.0);
        } else {
            warn!("request rejected: {}", self.0);
        }
        render_error(status, &self.0.to_string())
    }
}

type PageResult = Result<Response, PageError>;

#[derive(Debug, Deserialize)]
pub struct RegisterParams {
    #[serde(default)]
    pub cas: String,
    #[serde(default)]
    pub msps: String,
    #[serde(default)]
    pub orgs: String,
    #[serde(default)]
    pub userid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditParams {
    pub hash_id: String,
    #[serde(default)]
    pub owner_info: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteParams {
    pub hash_id: String,
    #[serde(default)]
    pub admin_token: String,
}

pub async fn handle_index(State(state): State<SharedState>) -> Response {
    state.record_request();
    render_template(IndexView {
        content_backend: state.service.content_backend().to_string(),
    })
}

pub async fn handle_upload(State(state): State<SharedState>, multipart: Multipart) -> PageResult {
    state.record_request();
    let (file, owner_info, description) = read_upload_form(multipart).await?.into_single()?;
    let file_name = file.file_name.clone();
    let result = state.service.upload(file, &owner_info, &description).await;
    state.uploads.record(&result);

    let report = UploadReport {
        file_name,
        result: Ok(result?),
    };
    Ok(render_template(UploadResultView::new(std::slice::from_ref(&report))))
}

pub async fn handle_upload_multiple(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> PageResult {
    state.record_request();
    let form = read_upload_form(multipart).await?;
    let reports = state
        .service
        .upload_many(form.files, &form.owner_info, &form.description)
        .await?;
    for report in &reports {
        state.uploads.record(&report.result);
    }
    Ok(render_template(UploadResultView::new(&reports)))
}

fn register_view(state: &SharedState, message: Option<String>) -> RegisterView {
    let settings = state.service.settings();
    RegisterView {
        cas: state.service.certificate_authorities(),
        msps: vec![settings.msp_id.clone()],
        affiliation: settings.affiliation.clone(),
        message,
    }
}

pub async fn handle_register(State(state): State<SharedState>) -> Response {
    state.record_request();
    render_template(register_view(&state, None))
}

pub async fn handle_post_register(
    State(state): State<SharedState>,
    Form(params): Form<RegisterParams>,
) -> PageResult {
    state.record_request();
    let user_id = params.userid.trim().to_string();
    let status = state
        .service
        .register_user(RegistrationForm {
            ca_name: params.cas,
            msp_id: params.msps,
            affiliation: params.orgs,
            user_id: user_id.clone(),
        })
        .await?;
    let message = match status {
        RegistrationStatus::Registered => {
            format!("Registered and enrolled user {user_id} and imported it into the wallet")
        }
        RegistrationStatus::AlreadyEnrolled => {
            format!("An identity for the user {user_id} already exists in the wallet")
        }
    };
    Ok(render_template(register_view(&state, Some(message))))
}

pub async fn handle_get_users(State(state): State<SharedState>) -> PageResult {
    state.record_request();
    let users = state.service.identities()?;
    Ok(render_template(UsersView { users }))
}

pub async fn handle_show_assets(State(state): State<SharedState>) -> PageResult {
    state.record_request();
    let listings = state.service.list_assets().await?;
    let deletion_enabled = state.service.settings().admin_token.is_some();
    Ok(render_template(AssetsView::new(&listings, deletion_enabled)))
}

pub async fn handle_get_asset(
    State(state): State<SharedState>,
    AxumPath((id, action)): AxumPath<(String, String)>,
) -> PageResult {
    state.record_request();
    match action.as_str() {
        "view" | "edit" => {}
        "delete" if state.service.settings().admin_token.is_some() => {}
        "delete" => {
            return Err(WorkflowError::Forbidden("asset deletion is disabled".into()).into());
        }
        other => {
            return Err(WorkflowError::ValidationFailure(format!("unknown action {other}")).into());
        }
    }
    let asset = state.service.read_asset(&id).await?;
    Ok(render_template(AssetView {
        asset: (&asset).into(),
        action,
    }))
}

pub async fn handle_post_asset(
    State(state): State<SharedState>,
    Form(params): Form<EditParams>,
) -> PageResult {
    state.record_request();
    state
        .service
        .edit(&params.hash_id, &params.owner_info, &params.description)
        .await?;
    Ok(Redirect::to("/showassets").into_response())
}

pub async fn handle_delete_asset(
    State(state): State<SharedState>,
    Form(params): Form<DeleteParams>,
) -> PageResult {
    state.record_request();
    state
        .service
        .delete(params.hash_id.trim(), &params.admin_token)
        .await?;
    Ok(Redirect::to("/showassets").into_response())
}

pub async fn handle_get_history(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<String>,
) -> PageResult {
    state.record_request();
    let history = state.service.asset_history(&id).await?;
    Ok(render_template(HistoryView {
        hash_id: id,
        history: history.iter().map(Into::into).collect(),
    }))
}

pub async fn handle_search(State(state): State<SharedState>) -> Response {
    state.record_request();
    render_template(SearchView { unmatched: None })
}

pub async fn handle_post_search(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> PageResult {
    state.record_request();
    let (file, _, _) = read_upload_form(multipart).await?.into_single()?;
    match state.service.search(&file.bytes).await? {
        SearchResult::Found(asset) => {
            Ok(Redirect::to(&format!("/getasset/{}/edit", asset.hash_id)).into_response())
        }
        SearchResult::Unmatched(hash_id) => Ok(render_template(SearchView {
            unmatched: Some(hash_id),
        })),
    }
}

pub async fn handle_blocks(State(state): State<SharedState>) -> PageResult {
    state.record_request();
    let info = state.service.chain_info().await?;
    Ok(render_template(BlocksView::new(
        &state.service.settings().channel,
        &info,
    )))
}

pub async fn handle_block(
    State(state): State<SharedState>,
    AxumPath(number): AxumPath<String>,
) -> PageResult {
    state.record_request();
    let number: u64 = number.trim().parse().map_err(|_| {
        WorkflowError::ValidationFailure(format!("{number:?} is not a block number"))
    })?;
    let block = state.service.block(number).await?;
    Ok(render_template(BlockView::new(&block)))
}

/// Media types a browser may render in place. Anything else is served as a
/// download so uploaded markup never runs on this origin.
const INLINE_CONTENT_TYPES: &[&str] = &[
    "text/plain",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "application/pdf",
];

fn is_inline(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    INLINE_CONTENT_TYPES
        .iter()
        .any(|allowed| essence.eq_ignore_ascii_case(allowed))
}

fn attachment_disposition(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let safe = if safe.is_empty() { "download".to_string() } else { safe };
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Raw bytes of stored content, typed with the asset's recorded MIME type
/// when one is registered. Types outside [`INLINE_CONTENT_TYPES`] are sent
/// as attachments, and sniffing is always disabled.
pub async fn handle_content(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<String>,
) -> PageResult {
    state.record_request();
    let bytes = state.service.fetch_content(&id).await?;
    let (content_type, file_name) = match state.service.read_asset(&id).await {
        Ok(asset) => (asset.file_type, asset.file_name),
        Err(_) => (DEFAULT_FILE_TYPE.to_string(), id.clone()),
    };

    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    let value = HeaderValue::from_str(&content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_FILE_TYPE));
    headers.insert(header::CONTENT_TYPE, value);
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    if !is_inline(&content_type) {
        headers.insert(header::CONTENT_DISPOSITION, attachment_disposition(&file_name));
    }
    Ok(response)
}

pub async fn handle_not_found(State(state): State<SharedState>) -> Response {
    state.record_request();
    render_error(StatusCode::NOT_FOUND, "page not found")
}
