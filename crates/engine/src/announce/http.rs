//! HTTP sync: serves the signed head and chain blocks to indexers.
//!
//! - `GET /head` returns the [`SignedHead`] JSON, or 204 when nothing has
//!   been announced yet.
//! - `GET /blocks/{link}` returns the raw bytes of an advertisement or
//!   entries chunk, 404 when unknown and 400 for a malformed link.

use super::{Announcer, BlockSource};
use crate::error::AnnounceError;
use adchain_core::Link;
use adchain_signer::{SignedHead, Signer};
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Error body returned by the sync endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
enum SyncError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Shared state of the sync routes.
pub struct SyncState {
    head: RwLock<Option<SignedHead>>,
    blocks: Arc<dyn BlockSource>,
}

impl SyncState {
    pub fn new(blocks: Arc<dyn BlockSource>) -> Self {
        Self {
            head: RwLock::new(None),
            blocks,
        }
    }

    pub async fn set_head(&self, head: SignedHead) {
        *self.head.write().await = Some(head);
    }
}

/// Build the sync router.
pub fn router(state: Arc<SyncState>) -> Router {
    Router::new()
        .route("/head", get(get_head))
        .route("/blocks/{link}", get(get_block))
        .with_state(state)
}

async fn get_head(State(state): State<Arc<SyncState>>) -> Response {
    match state.head.read().await.clone() {
        Some(head) => Json(head).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn get_block(
    State(state): State<Arc<SyncState>>,
    Path(link): Path<String>,
) -> Result<Response, SyncError> {
    let link = Link::from_hex(&link).map_err(|e| SyncError::BadRequest(e.to_string()))?;
    match state.blocks.load_block(&link).await {
        Ok(Some(bytes)) => Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response()),
        Ok(None) => Err(SyncError::NotFound(link.to_hex())),
        Err(e) => {
            error!(link = %link, error = %e, "failed to load block");
            Err(SyncError::Internal(e.to_string()))
        }
    }
}

/// [`Announcer`] publishing heads through an HTTP server.
pub struct HttpAnnouncer {
    signer: Arc<dyn Signer>,
    state: Arc<SyncState>,
    local_addr: SocketAddr,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    server: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    closed: AtomicBool,
}

impl HttpAnnouncer {
    /// Bind `listen_addr` and start serving.
    pub async fn bind(
        listen_addr: &str,
        signer: Arc<dyn Signer>,
        blocks: Arc<dyn BlockSource>,
    ) -> Result<Self, AnnounceError> {
        let bind_error = |source| AnnounceError::Bind {
            addr: listen_addr.to_string(),
            source,
        };
        let addr: SocketAddr = listen_addr.parse().map_err(|e| {
            bind_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid listen address: {e}"),
            ))
        })?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let state = Arc::new(SyncState::new(blocks));
        let app = router(state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(address = %local_addr, "HTTP sync server listening");

        Ok(Self {
            signer,
            state,
            local_addr,
            shutdown: Mutex::new(Some(shutdown_tx)),
            server: Mutex::new(Some(server)),
            closed: AtomicBool::new(false),
        })
    }

    /// Address the server is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Announcer for HttpAnnouncer {
    async fn update_root(&self, head: Link) -> Result<(), AnnounceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AnnounceError::Closed);
        }
        self.state.set_head(self.signer.sign_head(head)).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), AnnounceError> {
        self.closed.store(true, Ordering::Release);
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(());
        }
        let Some(server) = self.server.lock().await.take() else {
            return Ok(());
        };
        match server.await {
            Ok(Ok(())) => {
                info!(address = %self.local_addr, "HTTP sync server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(AnnounceError::Server(e.to_string())),
            Err(e) => Err(AnnounceError::Server(format!("server task failed: {e}"))),
        }
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}
