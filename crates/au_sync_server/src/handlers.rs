//! Request handlers for the workspace endpoints.

use async_trait::async_trait;
use au_core::model::WorkspaceMeta;
use au_core::store::WorkspaceHandle;
use au_core::sync::{Frame, FrameSink, FrameStream};
use au_core::{AuError, Result};
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;

use crate::error::ApiError;
use crate::AppState;

/// Workspace metadata as exposed on the wire.
#[derive(Debug, Serialize)]
struct WorkspaceSummary {
    id: String,
    alias: String,
    created_at: DateTime<Utc>,
    size_in_bytes: u64,
}

impl From<WorkspaceMeta> for WorkspaceSummary {
    fn from(meta: WorkspaceMeta) -> Self {
        Self {
            id: meta.id,
            alias: meta.alias,
            created_at: meta.created_at,
            size_in_bytes: meta.size_bytes,
        }
    }
}

/// Build the adapter's router over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workspaces", get(list_workspaces))
        .route("/workspaces/:id", get(get_workspace))
        .route("/workspaces/:id/download", get(download_workspace))
        .route("/workspaces/:id/sync", get(sync_workspace))
        .with_state(state)
}

async fn list_workspaces(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<WorkspaceSummary>>, ApiError> {
    let listed = state.store.list_workspaces()?;
    Ok(Json(listed.into_iter().map(Into::into).collect()))
}

async fn get_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<WorkspaceSummary>, ApiError> {
    let meta = state.store.get_workspace(&id)?;
    Ok(Json(meta.into()))
}

async fn download_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let handle = state.store.open_workspace(&id, false)?;
    let body = handle.document().save();
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        body,
    )
        .into_response())
}

/// Upgrade to the sync protocol and run a server-side session.
///
/// The workspace is opened writeable before the upgrade so that a held
/// lock surfaces as a plain 409 instead of a dropped socket. The handle
/// keeps the lock for the whole session and flushes on the way out.
async fn sync_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> std::result::Result<Response, ApiError> {
    let handle = state.store.open_workspace(&id, true)?;
    let shutdown = state.shutdown.subscribe();
    Ok(ws.on_upgrade(move |socket| run_sync_session(socket, handle, id, shutdown)))
}

async fn run_sync_session(
    socket: WebSocket,
    mut handle: WorkspaceHandle,
    id: String,
    shutdown: tokio::sync::watch::Receiver<bool>,
) {
    tracing::info!(workspace = %id, "sync session started");
    let (sink, stream) = socket.split();
    let result = au_core::sync::sync(
        Box::new(WsFrameStream(stream)),
        Box::new(WsFrameSink(sink)),
        handle.document(),
        false,
        shutdown,
    )
    .await;
    match result {
        Ok(()) => tracing::info!(workspace = %id, "sync session finished"),
        Err(e) => tracing::warn!(workspace = %id, error = %e, "sync session failed"),
    }
    if let Err(e) = handle.flush() {
        tracing::error!(workspace = %id, error = %e, "failed to flush after sync");
    }
    handle.close();
}

struct WsFrameSink(SplitSink<WebSocket, Message>);
struct WsFrameStream(SplitStream<WebSocket>);

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Binary(data) => Message::Binary(data),
            Frame::Ping => Message::Ping(Vec::new()),
            Frame::Pong => Message::Pong(Vec::new()),
            Frame::Close => Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "".into(),
            })),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| AuError::Transport(e.to_string()))
    }
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next(&mut self) -> Option<Result<Frame>> {
        loop {
            return match self.0.next().await? {
                Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data))),
                Ok(Message::Ping(_)) => Some(Ok(Frame::Ping)),
                Ok(Message::Pong(_)) => Some(Ok(Frame::Pong)),
                Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
                Ok(Message::Text(_)) => continue,
                Err(e) => Some(Err(AuError::Transport(e.to_string()))),
            };
        }
    }
}
