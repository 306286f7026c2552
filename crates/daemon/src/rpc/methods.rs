use std::sync::Arc;

use base64::Engine;
use quire_common::content::{Changeset, RejectReason};
use quire_common::protocol::jsonrpc::{
    is_supported_protocol_version, Request, RequestId, Response, RpcError, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, NOT_FOUND, NOT_OPEN, PARSE_ERROR,
    PROTECTED_DOCUMENT, SUPPORTED_PROTOCOL_VERSIONS,
};
use quire_common::protocol::push::PushMessage;
use quire_common::protocol::rpc_methods;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::engine::ChangesetOutcome;
use crate::error::DocumentError;
use crate::notebook::Notebook;
use crate::rpc::session::{ConnectionSession, Released};
use crate::store::BlobRecord;
use crate::subscription::BroadcastPushSink;

const DOC_RECENT_DEFAULT_LIMIT: usize = 20;

#[derive(Clone)]
pub struct RpcServerState {
    notebook: Arc<Notebook>,
    push: BroadcastPushSink,
    shutdown_notifier: Option<broadcast::Sender<()>>,
    session: Arc<ConnectionSession>,
}

impl RpcServerState {
    /// `push` must be the sink the notebook was opened with.
    pub fn new(notebook: Arc<Notebook>, push: BroadcastPushSink) -> Self {
        Self {
            notebook,
            push,
            shutdown_notifier: None,
            session: Arc::new(ConnectionSession::default()),
        }
    }

    /// A copy sharing everything but the session, for one new connection.
    pub fn for_connection(&self) -> Self {
        Self { session: Arc::new(ConnectionSession::default()), ..self.clone() }
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    /// Close the documents and drop the subscriptions this connection holds.
    pub fn release_connection(&self) -> Released {
        self.session.release(&self.notebook)
    }

    pub fn with_shutdown_notifier(mut self, notifier: broadcast::Sender<()>) -> Self {
        self.shutdown_notifier = Some(notifier);
        self
    }

    pub fn notebook(&self) -> &Arc<Notebook> {
        &self.notebook
    }

    pub fn subscribe_pushes(&self) -> broadcast::Receiver<PushMessage> {
        self.push.subscribe()
    }
}

// ── Params / results ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
struct DocCreateParams {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DocIdParams {
    doc_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DocApplyChangesetParams {
    doc_id: String,
    changeset: Changeset,
}

#[derive(Debug, Clone, Deserialize)]
struct DocInfoParams {
    doc_ids: Vec<String>,
}

fn default_doc_recent_limit() -> usize {
    DOC_RECENT_DEFAULT_LIMIT
}

#[derive(Debug, Clone, Deserialize)]
struct DocRecentParams {
    #[serde(default = "default_doc_recent_limit")]
    limit: usize,
}

impl Default for DocRecentParams {
    fn default() -> Self {
        Self { limit: DOC_RECENT_DEFAULT_LIMIT }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DocSearchParams {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionParams {
    sub_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BlobStoreParams {
    owner_id: String,
    content_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BlobGetParams {
    blob_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ApplyChangesetResult {
    Persisted { changeset_id: String, version: i64 },
    Rejected { reason: RejectReason },
}

#[derive(Debug, Clone, Serialize)]
struct BlobResult {
    blob_id: String,
    owner_id: String,
    size: i64,
    content_base64: String,
    created_at: i64,
    accessed_at: i64,
    modified_at: i64,
}

impl From<BlobRecord> for BlobResult {
    fn from(record: BlobRecord) -> Self {
        Self {
            content_base64: base64::engine::general_purpose::STANDARD.encode(&record.content),
            blob_id: record.id,
            owner_id: record.owner_id,
            size: record.size,
            created_at: record.created_at,
            accessed_at: record.accessed_at,
            modified_at: record.modified_at,
        }
    }
}

// ── Dispatch ───────────────────────────────────────────────────────

pub async fn handle_raw_request(raw: &[u8], state: &RpcServerState) -> Response {
    let request = match serde_json::from_slice::<Request>(raw) {
        Ok(request) => request,
        Err(error) => {
            return Response::error(
                RequestId::Null,
                RpcError {
                    code: PARSE_ERROR,
                    message: "Parse error".to_string(),
                    data: Some(json!({ "reason": error.to_string() })),
                },
            );
        }
    };

    if request.jsonrpc != "2.0" {
        return Response::error(
            request.id,
            RpcError { code: INVALID_REQUEST, message: "Invalid Request".to_string(), data: None },
        );
    }

    if let Some(version) = request.protocol_version.as_deref() {
        if !is_supported_protocol_version(version) {
            return Response::error(
                request.id,
                RpcError {
                    code: INVALID_REQUEST,
                    message: "Unsupported protocol version".to_string(),
                    data: Some(json!({
                        "requested": version,
                        "supported": SUPPORTED_PROTOCOL_VERSIONS,
                    })),
                },
            );
        }
    }

    dispatch_request(request, state).await
}

pub async fn dispatch_request(request: Request, state: &RpcServerState) -> Response {
    debug!(method = %request.method, "dispatching rpc request");
    match request.method.as_str() {
        rpc_methods::RPC_PING => Response::success(request.id, json!({ "ok": true })),
        rpc_methods::DAEMON_SHUTDOWN => {
            if let Some(notifier) = &state.shutdown_notifier {
                let _ = notifier.send(());
            }
            Response::success(request.id, json!({ "ok": true }))
        }
        rpc_methods::DOC_CREATE => handle_doc_create(request, state),
        rpc_methods::DOC_OPEN => handle_doc_open(request, state).await,
        rpc_methods::DOC_CLOSE => handle_doc_close(request, state),
        rpc_methods::DOC_APPLY_CHANGESET => handle_doc_apply_changeset(request, state).await,
        rpc_methods::DOC_OUTLINE => handle_doc_outline(request, state).await,
        rpc_methods::DOC_INFO => handle_doc_info(request, state).await,
        rpc_methods::DOC_RECENT => handle_doc_recent(request, state),
        rpc_methods::DOC_SEARCH => handle_doc_search(request, state),
        rpc_methods::DOC_TRASH => handle_doc_trash(request, state).await,
        rpc_methods::DOC_RECOVER => handle_doc_recover(request, state),
        rpc_methods::DOC_DELETE_PERMANENTLY => handle_doc_delete_permanently(request, state),
        rpc_methods::DOC_FETCH_TRASH => handle_doc_fetch_trash(request, state),
        rpc_methods::DOC_SUBSCRIBE => handle_doc_subscribe(request, state),
        rpc_methods::DOC_UNSUBSCRIBE => handle_doc_unsubscribe(request, state),
        rpc_methods::DOCLIST_SUBSCRIBE => {
            let sub_id = state.notebook.subscribe_doc_list();
            state.session.track_list_sub(&sub_id);
            Response::success(request.id, json!({ "sub_id": sub_id }))
        }
        rpc_methods::DOCLIST_UNSUBSCRIBE => handle_doclist_unsubscribe(request, state),
        rpc_methods::GRAPH_GET => handle_graph_get(request, state),
        rpc_methods::BLOB_STORE => handle_blob_store(request, state),
        rpc_methods::BLOB_GET => handle_blob_get(request, state),
        _ => Response::error(
            request.id,
            RpcError {
                code: METHOD_NOT_FOUND,
                message: "Method not found".to_string(),
                data: None,
            },
        ),
    }
}

// ── Document handlers ──────────────────────────────────────────────

fn handle_doc_create(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_optional_params::<DocCreateParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    match state.notebook.create_document(params.title.as_deref()) {
        Ok(doc_id) => Response::success(request.id, json!({ "doc_id": doc_id })),
        Err(error) => document_error_response(request.id, error),
    }
}

async fn handle_doc_open(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<DocIdParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    match state.notebook.open_document(&params.doc_id).await {
        Ok((result, lease)) => {
            state.session.hold_lease(lease);
            Response::success(request.id, json!(result))
        }
        Err(error) => document_error_response(request.id, error),
    }
}

/// Closes one of this connection's opens of the document.
fn handle_doc_close(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<DocIdParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    match state.session.take_lease(&params.doc_id) {
        Some(lease) => {
            state.notebook.close_document(lease);
            Response::success(request.id, json!({ "ok": true }))
        }
        None => document_error_response(request.id, DocumentError::not_open(&params.doc_id)),
    }
}

async fn handle_doc_apply_changeset(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<DocApplyChangesetParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    match state.notebook.apply_changeset(&params.doc_id, params.changeset).await {
        Ok(ChangesetOutcome::Persisted { changeset_id, version }) => Response::success(
            request.id,
            json!(ApplyChangesetResult::Persisted { changeset_id, version }),
        ),
        Ok(ChangesetOutcome::Rejected(reason)) => {
            Response::success(request.id, json!(ApplyChangesetResult::Rejected { reason }))
        }
        Err(error) => document_error_response(request.id, error),
    }
}

async fn handle_doc_outline(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<DocIdParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    match state.notebook.outline(&params.doc_id).await {
        Ok(outline) => Response::success(request.id, json!({ "outline": outline })),
        Err(error) => document_error_response(request.id, error),
    }
}

async fn handle_doc_info(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<DocInfoParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    match state.notebook.document_info(&params.doc_ids).await {
        Ok(items) => Response::success(request.id, json!({ "items": items })),
        Err(error) => document_error_response(request.id, error),
    }
}

fn handle_doc_recent(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_optional_params::<DocRecentParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    match state.notebook.recent_documents(params.limit) {
        Ok(items) => Response::success(request.id, json!({ "items": items })),
        Err(error) => document_error_response(request.id, error),
    }
}

fn handle_doc_search(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<DocSearchParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    let items = state.notebook.search(&params.query, params.limit);
    Response::success(request.id, json!({ "items": items }))
}

async fn handle_doc_trash(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<DocIdParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    match state.notebook.move_to_trash(&params.doc_id).await {
        Ok(()) => Response::success(request.id, json!({ "ok": true })),
        Err(error) => document_error_response(request.id, error),
    }
}

fn handle_doc_recover(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<DocIdParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    match state.notebook.recover(&params.doc_id) {
        Ok(()) => Response::success(request.id, json!({ "ok": true })),
        Err(error) => document_error_response(request.id, error),
    }
}

fn handle_doc_delete_permanently(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<DocIdParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    match state.notebook.delete_permanently(&params.doc_id) {
        Ok(()) => Response::success(request.id, json!({ "ok": true })),
        Err(error) => document_error_response(request.id, error),
    }
}

fn handle_doc_fetch_trash(request: Request, state: &RpcServerState) -> Response {
    match state.notebook.fetch_trash() {
        Ok(items) => Response::success(request.id, json!({ "items": items })),
        Err(error) => document_error_response(request.id, error),
    }
}

// ── Subscription handlers ──────────────────────────────────────────

fn handle_doc_subscribe(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<DocIdParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    let sub_id = state.notebook.subscribe_doc_content(&params.doc_id);
    state.session.track_content_sub(&sub_id);
    Response::success(request.id, json!({ "sub_id": sub_id }))
}

fn handle_doc_unsubscribe(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<SubscriptionParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    state.notebook.unsubscribe_doc_content(&params.sub_id);
    state.session.forget_content_sub(&params.sub_id);
    Response::success(request.id, json!({ "ok": true }))
}

fn handle_doclist_unsubscribe(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<SubscriptionParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    state.notebook.unsubscribe_doc_list(&params.sub_id);
    state.session.forget_list_sub(&params.sub_id);
    Response::success(request.id, json!({ "ok": true }))
}

// ── Graph / blob handlers ──────────────────────────────────────────

fn handle_graph_get(request: Request, state: &RpcServerState) -> Response {
    match state.notebook.graph() {
        Ok(graph) => Response::success(request.id, json!(graph)),
        Err(error) => document_error_response(request.id, error),
    }
}

fn handle_blob_store(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<BlobStoreParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    let content = match base64::engine::general_purpose::STANDARD.decode(&params.content_base64) {
        Ok(content) => content,
        Err(error) => {
            return invalid_params_response(
                request.id,
                format!("content_base64 is not valid base64: {error}"),
            );
        }
    };

    match state.notebook.store_blob(&params.owner_id, &content) {
        Ok(blob_id) => Response::success(request.id, json!({ "blob_id": blob_id })),
        Err(error) => document_error_response(request.id, error),
    }
}

fn handle_blob_get(request: Request, state: &RpcServerState) -> Response {
    let params = match parse_params::<BlobGetParams>(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };

    match state.notebook.get_blob(&params.blob_id) {
        Ok(blob) => {
            Response::success(request.id, json!({ "blob": blob.map(BlobResult::from) }))
        }
        Err(error) => document_error_response(request.id, error),
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn parse_params<T: DeserializeOwned>(request: &Request) -> Result<T, Response> {
    let Some(params) = request.params.clone() else {
        return Err(invalid_params_response(
            request.id.clone(),
            format!("{} requires params", request.method),
        ));
    };

    serde_json::from_value::<T>(params).map_err(|error| {
        invalid_params_response(
            request.id.clone(),
            format!("failed to decode {} params: {error}", request.method),
        )
    })
}

/// Like `parse_params`, but absent params mean all defaults.
fn parse_optional_params<T: DeserializeOwned + Default>(request: &Request) -> Result<T, Response> {
    match request.params {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(_) => parse_params(request),
    }
}

fn invalid_params_response(request_id: RequestId, reason: String) -> Response {
    Response::error(
        request_id,
        RpcError {
            code: INVALID_PARAMS,
            message: "Invalid params".to_string(),
            data: Some(json!({ "reason": reason })),
        },
    )
}

fn document_error_response(request_id: RequestId, error: DocumentError) -> Response {
    let code = match &error {
        DocumentError::NotFound { .. } => NOT_FOUND,
        DocumentError::NotOpen { .. } => NOT_OPEN,
        DocumentError::ProtectedDocument { .. } => PROTECTED_DOCUMENT,
        DocumentError::Storage(inner) => {
            warn!(error = ?inner, "rpc request failed in storage");
            INTERNAL_ERROR
        }
    };
    Response::error(request_id, RpcError { code, message: error.to_string(), data: None })
}
