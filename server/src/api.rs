//! HTTP handlers for the external interface (§6): suggestion, search, file
//! retrieval, index update (SSE), the agent endpoints (sync + SSE), and
//! configuration round-tripping.
//!
//! Grounded directly on `search_localFile_endpoint.py`'s route shapes and
//! response envelopes; the Flask `stream_with_context` generator becomes an
//! axum `Sse` response fed by an unbounded channel, and the upstream's
//! thread-plus-queue progress relay becomes a `ProgressSink` impl that
//! writes to the same channel.

use crate::agent::{self, AgentEvent};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use codescope_core::config::ConfigPatch;
use codescope_core::progress::ProgressSink;
use codescope_core::{query, CoreError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

fn core_error_response(err: &CoreError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.uptime_seconds(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    q: Option<String>,
    index_type: Option<String>,
    limit: Option<usize>,
    multiword: Option<bool>,
    compat: Option<bool>,
}

pub async fn suggest_handler(State(state): State<Arc<AppState>>, Query(params): Query<SuggestParams>) -> Json<Value> {
    let Some(query_text) = params.q.filter(|s| !s.is_empty()) else {
        return Json(json!({ "suggestions": Vec::<String>::new() }));
    };
    let limit = params.limit.unwrap_or(10);
    let snapshot = state.snapshot();
    let partition = if params.index_type.as_deref() == Some("docs") { &snapshot.docs_partition } else { &snapshot.other_partition };

    let multiword = params.multiword.unwrap_or(true);
    let compat = params.compat.unwrap_or(true);
    let suggestions = query::suggest(partition, &query_text, limit);

    if multiword && query_text.contains(' ') && !compat {
        Json(json!({ "suggestions": suggestions, "mode": "multiword" }))
    } else {
        Json(json!({ "suggestions": suggestions }))
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    mode: Option<String>,
    limit: Option<usize>,
    index_type: Option<String>,
}

pub async fn search_handler(State(state): State<Arc<AppState>>, Query(params): Query<SearchParams>) -> Response {
    let Some(query_text) = params.q.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No query provided" }))).into_response();
    };
    let mode = match params.mode.as_deref().map(|m| m.to_lowercase()) {
        Some(ref m) if m == "and" => query::Mode::And,
        Some(ref m) if m == "or" => query::Mode::Or,
        _ => query::endpoint_default_mode(),
    };
    let limit = params.limit.unwrap_or(10);
    let index_type = params.index_type.as_deref().unwrap_or("other");

    let snapshot = state.snapshot();
    let partition = if index_type == "docs" { &snapshot.docs_partition } else { &snapshot.other_partition };
    let mut hits = query::search_content(partition, &query_text, mode, limit);

    if index_type == "docs" {
        let root = state.config.snapshot().root.clone();
        for hit in hits.iter_mut() {
            query::normalize_docs_hit(hit, &snapshot.shard_map, &root);
        }
    }

    let results: Vec<Value> = hits
        .into_iter()
        .map(|hit| {
            let mut obj = json!({ "path": hit.path, "score": hit.score });
            if let Some(page) = hit.page {
                obj["page"] = json!(page);
            }
            if let Some(sheet) = hit.sheet {
                obj["sheet"] = json!(sheet);
            }
            obj
        })
        .collect();

    Json(json!({ "results": results })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct FileParams {
    path: Option<String>,
    highlight: Option<String>,
}

pub async fn file_handler(State(state): State<Arc<AppState>>, Query(params): Query<FileParams>) -> Response {
    let Some(rel) = params.path.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "file path not provided" }))).into_response();
    };

    let config = state.config.snapshot();
    let root = match config.root.canonicalize() {
        Ok(p) => p,
        Err(e) => return core_error_response(&CoreError::Io { path: Some(config.root.clone()), message: e.to_string() }),
    };
    let candidate = root.join(&rel);
    let full = match candidate.canonicalize() {
        Ok(p) => p,
        Err(_) => return core_error_response(&CoreError::NotFound { path: rel.clone() }),
    };
    if !full.starts_with(&root) {
        return core_error_response(&CoreError::AccessDenied { path: rel.clone() });
    }
    if let Ok(shard_dir) = config.shard_dir_path().canonicalize() {
        if full.starts_with(&shard_dir) {
            return core_error_response(&CoreError::AccessDenied { path: rel.clone() });
        }
    }

    let content = match std::fs::read_to_string(&full) {
        Ok(c) => c,
        Err(e) => return core_error_response(&CoreError::Io { path: Some(full.clone()), message: e.to_string() }),
    };
    let tokenizer = codescope_core::tokenizer::default_tokenizer();
    let content = agent::truncate_to_token_budget(&content, tokenizer.as_ref(), 9_000);

    let last_modified = std::fs::metadata(&full)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut body = json!({ "path": rel, "content": content, "last_modified": last_modified });
    if let Some(term) = params.highlight.filter(|s| !s.is_empty()) {
        body["highlighted_excerpt"] = json!(query::highlight(&content, &term));
    }
    Json(body).into_response()
}

pub async fn files_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.snapshot();
    let files: Vec<String> = snapshot.other_partition.metadata().keys().cloned().collect();
    Json(json!({ "files": files }))
}

struct ChannelProgress {
    tx: mpsc::UnboundedSender<Result<Event, Infallible>>,
}

impl ProgressSink for ChannelProgress {
    fn report(&self, step: &str, percentage: u8) {
        let payload = json!({ "status": "progress", "step": step, "progress": percentage }).to_string();
        let _ = self.tx.send(Ok(Event::default().data(payload)));
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateParams {
    force: Option<bool>,
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UpdateParams>,
) -> Sse<UnboundedReceiverStream<Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let force = params.force.unwrap_or(false);
    let state = state.clone();

    tokio::task::spawn_blocking(move || {
        let config = state.config.snapshot();
        if !config.root.is_dir() {
            let _ = tx.send(Ok(Event::default().data(
                json!({ "status": "error", "message": format!("source root '{}' does not exist", config.root.display()) }).to_string(),
            )));
            return;
        }
        let has_entries = std::fs::read_dir(&config.root).map(|mut it| it.next().is_some()).unwrap_or(false);
        if !has_entries {
            let _ = tx.send(Ok(Event::default().data(
                json!({ "status": "error", "message": format!("source root '{}' is empty", config.root.display()) }).to_string(),
            )));
            return;
        }
        let _ = tx.send(Ok(Event::default().data(json!({ "status": "info", "message": "source root validated" }).to_string())));

        if force {
            let _ = std::fs::remove_file(config.index_dir_path().join("docs").join("partition.json"));
            let _ = std::fs::remove_file(config.index_dir_path().join("other").join("partition.json"));
        }

        let progress = ChannelProgress { tx: tx.clone() };
        let cancel = Arc::new(AtomicBool::new(false));
        match codescope_core::ingest::run(&config, &state.binary_exts, &progress, &cancel) {
            Ok(result) => {
                state.replace_snapshot(result);
                state.mark_init_completed();
                let _ = tx.send(Ok(Event::default().data(json!({ "status": "success", "message": "index updated" }).to_string())));
            }
            Err(e) => {
                let _ = tx.send(Ok(Event::default().data(json!({ "status": "error", "message": e.to_string() }).to_string())));
            }
        }
    });

    Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct AgentRequest {
    issue: Option<String>,
    trace_log: Option<String>,
    search_keywords: Option<String>,
}

pub async fn agent_handler(State(state): State<Arc<AppState>>, Json(body): Json<AgentRequest>) -> Response {
    let Some(issue) = body.issue.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "issue is required" }))).into_response();
    };
    let trace_log = body.trace_log.unwrap_or_default();
    let search_keywords = body.search_keywords.unwrap_or_default();
    let request_id = format!("req_{:08x}", state.next_request_id());

    let state_clone = state.clone();
    let result = tokio::task::spawn_blocking(move || agent::run_agent(&state_clone, &issue, &trace_log, &search_keywords, |_| {})).await;

    match result {
        Ok(Ok(outcome)) => Json(json!({
            "agent_response": outcome.response,
            "search_queries": outcome.search_queries,
            "file_paths": outcome.file_paths,
            "request_id": request_id,
        }))
        .into_response(),
        Ok(Err(e)) => core_error_response(&CoreError::Upstream { message: e.to_string() }),
        Err(e) => core_error_response(&CoreError::Upstream { message: e.to_string() }),
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentStreamParams {
    issue: Option<String>,
    trace_log: Option<String>,
    search_keywords: Option<String>,
}

pub async fn agent_stream_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AgentStreamParams>,
) -> Response {
    let Some(issue) = params.issue.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "issue is required" }))).into_response();
    };
    let trace_log = params.trace_log.unwrap_or_default();
    let search_keywords = params.search_keywords.unwrap_or_default();
    let request_id = format!("req_{:08x}", state.next_request_id());

    let (tx, rx) = mpsc::unbounded_channel::<Result<Event, Infallible>>();
    let _ = tx.send(Ok(Event::default().data(json!({ "status": "info", "step": "start", "progress": 0 }).to_string())));

    let tx_worker = tx.clone();
    let state_clone = state.clone();
    let request_id_clone = request_id.clone();
    drop(tx);

    tokio::task::spawn_blocking(move || {
        let outcome = agent::run_agent(&state_clone, &issue, &trace_log, &search_keywords, |event| {
            let payload = match event {
                AgentEvent::Action { tool, input } => {
                    json!({ "status": "progress", "step": tool.to_string(), "progress": 50, "input": input })
                }
                AgentEvent::Observation { tool, output } => {
                    json!({ "status": "progress", "step": format!("{tool}_result"), "progress": 75, "output": output })
                }
                AgentEvent::Finish { .. } => json!({ "status": "progress", "step": "finish", "progress": 95 }),
            };
            let _ = tx_worker.send(Ok(Event::default().data(payload.to_string())));
        });

        let final_event = match outcome {
            Ok(result) => json!({
                "status": "success",
                "result": {
                    "agent_response": result.response,
                    "search_queries": result.search_queries,
                    "file_paths": result.file_paths,
                },
                "request_id": request_id_clone,
            }),
            Err(e) => json!({ "status": "error", "message": e.to_string() }),
        };
        let _ = tx_worker.send(Ok(Event::default().data(final_event.to_string())));
    });

    Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default()).into_response()
}

pub async fn get_config_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.config.snapshot();
    Json(json!({ "end_point": config.end_point, "api_key": config.api_key, "app_dir": config.root }))
}

pub async fn update_config_handler(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let Some(obj) = body.as_object() else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No data provided" }))).into_response();
    };

    let mut patch = ConfigPatch::default();
    let mut touched = false;
    if let Some(v) = obj.get("end_point").and_then(Value::as_str) {
        patch.end_point = Some(v.to_string());
        touched = true;
    }
    if let Some(v) = obj.get("api_key").and_then(Value::as_str) {
        patch.api_key = Some(v.to_string());
        touched = true;
    }
    if let Some(v) = obj.get("app_dir").and_then(Value::as_str) {
        if v.is_empty() {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "app_dir is empty" }))).into_response();
        }
        let path = PathBuf::from(v);
        if !path.is_dir() {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("app_dir '{v}' does not exist or is not a directory") })),
            )
                .into_response();
        }
        patch.app_dir = Some(path);
        touched = true;
    }
    if !touched {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No valid keys provided for update" }))).into_response();
    }

    state.config.update(patch);
    let updated = state.config.snapshot();
    Json(json!({
        "message": "Config updated successfully",
        "updated": { "end_point": updated.end_point, "api_key": updated.api_key, "app_dir": updated.root },
    }))
    .into_response()
}

pub async fn init_status_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "initialization_completed": state.is_init_completed() }))
}
