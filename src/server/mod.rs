// Query server module
// Health endpoint and the WebSocket query endpoint with measurement persistence


use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::HeaderValue;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, error, info, warn};

use crate::search::{ErrorResponse, QueryOutcome, QueryPipeline, QueryRequest};
use crate::stats::{MeasurementWriter, Window};
use crate::{AnnError, Result};

/// Shared state of the query server
pub struct ServerState {
    pipeline: QueryPipeline,
    writer: MeasurementWriter,
    category: Option<String>,
}

impl ServerState {
    #[inline]
    pub fn new(pipeline: QueryPipeline, writer: MeasurementWriter) -> Self {
        Self {
            pipeline,
            writer,
            category: None,
        }
    }

    /// Suffix measurement files with a category name
    #[inline]
    #[must_use]
    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    /// Answer one client message
    ///
    /// Returns the JSON reply and, when the query ran, its outcome for
    /// persistence. Every failure becomes an `{"error": ...}` reply.
    #[inline]
    pub async fn handle_message(&self, text: &str) -> (String, Option<QueryOutcome>) {
        let request: QueryRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                let error = AnnError::InvalidArgument(format!("malformed request: {}", e));
                return (error_reply(&error), None);
            }
        };

        match self.pipeline.run(&request).await {
            Ok(outcome) => match serde_json::to_string(&outcome.response) {
                Ok(reply) => (reply, Some(outcome)),
                Err(e) => (
                    error_reply(&AnnError::Other(anyhow::anyhow!(
                        "failed to encode response: {}",
                        e
                    ))),
                    None,
                ),
            },
            Err(e) => {
                if e.is_client_error() {
                    debug!("Rejected query: {}", e);
                } else {
                    warn!("Query failed: {}", e);
                }
                (error_reply(&e), None)
            }
        }
    }

    /// Append the before, during and after windows of a query
    #[inline]
    pub async fn persist(&self, outcome: &QueryOutcome) -> Result<()> {
        let records = Window::ALL
            .iter()
            .map(|window| (*window, outcome.record(*window)))
            .collect();
        self.writer
            .append_windows(records, self.category.as_deref())
            .await
    }
}

fn error_reply(error: &AnnError) -> String {
    serde_json::to_string(&ErrorResponse::from(error))
        .unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string())
}

/// Build the router serving `/` and `/ws`
///
/// `allowed_origin` of `*` allows any origin.
#[inline]
pub fn router(state: Arc<ServerState>, allowed_origin: &str) -> Result<Router> {
    let origin = if allowed_origin == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(allowed_origin).map_err(|e| {
            AnnError::Config(format!("invalid allowed origin {}: {}", allowed_origin, e))
        })?;
        AllowOrigin::exact(value)
    };

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/", get(health))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state))
}

async fn health() -> Json<Value> {
    Json(json!({ "message": "pgvector-ann query server is running" }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut pending: VecDeque<String> = VecDeque::new();
    info!("Client connected");

    loop {
        let text = match pending.pop_front() {
            Some(text) => text,
            None => match receiver.next().await {
                Some(Ok(Message::Text(text))) => text.to_string(),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("WebSocket receive failed: {}", e);
                    break;
                }
            },
        };

        // Dropping the query future aborts its sampler and releases its session
        let query = state.handle_message(&text);
        tokio::pin!(query);
        let (reply, outcome) = loop {
            tokio::select! {
                answered = &mut query => break answered,
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Text(next))) => pending.push_back(next.to_string()),
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        info!("Client disconnected during a query, abandoning it");
                        return;
                    }
                    Some(Ok(_)) => {}
                },
            }
        };

        if let Err(e) = sender.send(Message::Text(reply.into())).await {
            warn!("Failed to send reply: {}", e);
            break;
        }

        if let Some(outcome) = outcome {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                if let Err(e) = state.persist(&outcome).await {
                    error!("Failed to persist measurements: {}", e);
                }
            });
        }
    }

    info!("Client disconnected");
}

/// Serve until Ctrl+C
#[inline]
pub async fn serve(router: Router, host: &str, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Query server listening on http://{}:{}", host, port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Query server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
