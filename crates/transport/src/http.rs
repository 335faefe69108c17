//! HTTP/HTTPS listener (§4.3). Each request becomes an ephemeral session:
//! the decoded `Message` is pushed onto the same ingress pipeline as the
//! stream transports, and the first reply frame written to the session's
//! sink becomes the HTTP response body.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::context::TransportContext;
use crate::error::TransportError;
use codec::Message;
use registry::TransportKind;

const RESPONSE_WAIT: Duration = Duration::from_secs(5);

pub fn build_router(ctx: Arc<TransportContext>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/messages", post(submit_message))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn submit_message(State(ctx): State<Arc<TransportContext>>, Json(message): Json<Message>) -> impl IntoResponse {
    let peer: SocketAddr = "0.0.0.0:0".parse().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = ctx.registry.create(TransportKind::Http, peer, tx);
    let priority = message.priority();

    if ctx.ingress.sender(priority).send((session.id, message)).is_err() {
        ctx.registry.remove(session.id);
        return (StatusCode::SERVICE_UNAVAILABLE, "ingress pipeline is gone").into_response();
    }

    let reply = tokio::time::timeout(RESPONSE_WAIT, rx.recv()).await;
    ctx.registry.remove(session.id);

    match reply {
        Ok(Some(bytes)) => {
            // The frame bytes written to the sink already carry the
            // response message; decode them back for a JSON body.
            let mut cursor = std::io::Cursor::new(bytes);
            match ctx.codec.decode(&mut cursor).await {
                Ok(response_message) => Json(response_message).into_response(),
                Err(err) => {
                    warn!(error = %err, "failed to decode queued http response frame");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        Ok(None) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(_elapsed) => StatusCode::GATEWAY_TIMEOUT.into_response(),
    }
}

pub async fn spawn_http_listener(
    addr: SocketAddr,
    ctx: Arc<TransportContext>,
    cancellation: CancellationToken,
) -> Result<JoinHandle<()>, TransportError> {
    let router = build_router(ctx);
    let listener = TcpListener::bind(addr).await.map_err(|e| TransportError::Bind(addr, e))?;
    info!(%addr, "http listener bound");

    Ok(tokio::spawn(async move {
        let shutdown = cancellation.clone();
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            })
            .await;
        if let Err(err) = result {
            error!(%addr, error = %err, "http listener exited with error");
        }
    }))
}

#[derive(Debug, Clone)]
pub struct HttpsListenerConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

pub async fn spawn_https_listener(
    addr: SocketAddr,
    tls_config: HttpsListenerConfig,
    ctx: Arc<TransportContext>,
    cancellation: CancellationToken,
) -> Result<JoinHandle<()>, TransportError> {
    let router = build_router(ctx);
    let rustls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(tls_config.cert_path, tls_config.key_path)
        .await
        .map_err(|e| TransportError::TlsLoad(e.to_string()))?;

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    let shutdown_cancellation = cancellation.clone();
    tokio::spawn(async move {
        shutdown_cancellation.cancelled().await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
    });

    info!(%addr, "https listener bound");
    Ok(tokio::spawn(async move {
        if let Err(err) = axum_server::bind_rustls(addr, rustls_config)
            .handle(handle)
            .serve(router.into_make_service())
            .await
        {
            error!(%addr, error = %err, "https listener exited with error");
        }
    }))
}
