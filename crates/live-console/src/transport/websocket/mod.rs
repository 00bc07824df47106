//! Browser terminal transport: a JSON message channel over a websocket plus
//! the static panel that speaks it.

mod connection;
pub mod protocol;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, ws},
    http::header,
    response::{Html, IntoResponse, Redirect},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::context::ConsoleContext;
use crate::error::ConsoleError;

pub use connection::{ConsoleConnection, EventWriter};

pub const STATIC_PREFIX: &str = "/console_static";

const INDEX_HTML: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/console/index.html"
));
const ENTRYPOINT_JS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/console/entrypoint.mjs"
));

pub fn build_router(ctx: Arc<ConsoleContext>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/websocket", get(websocket_handler))
        .route("/console_static/", get(index_handler))
        .route("/console_static/index.html", get(index_handler))
        .route("/console_static/entrypoint.mjs", get(entrypoint_handler))
        .with_state(ctx)
}

async fn root_handler() -> Redirect {
    Redirect::temporary(&format!("{}/index.html", STATIC_PREFIX))
}

async fn index_handler() -> impl IntoResponse {
    Html(INDEX_HTML)
}

async fn entrypoint_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        ENTRYPOINT_JS,
    )
}

async fn websocket_handler(
    ws: ws::WebSocketUpgrade,
    State(ctx): State<Arc<ConsoleContext>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, ctx))
}

async fn serve_socket(socket: ws::WebSocket, ctx: Arc<ConsoleContext>) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let mut connection = ConsoleConnection::new(Arc::clone(&ctx), outbound_tx);

    let pump = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(ws::Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(ws::Message::Text(text))) => connection.handle_text(&text),
                Some(Ok(ws::Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Websocket receive failed");
                    break;
                }
            },
            _ = ctx.wait_for_shutdown() => break,
        }
    }

    connection.disconnect();
    drop(connection);
    pump.abort();
    debug!("Websocket connection closed");
}

/// Bound HTTP listener serving the message channel and panel.
pub struct WebServer {
    listener: TcpListener,
    ctx: Arc<ConsoleContext>,
}

impl WebServer {
    pub async fn bind(addr: &str, ctx: Arc<ConsoleContext>) -> Result<Self, ConsoleError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ConsoleError::Bind {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Serves until the context's shutdown signal fires.
    pub async fn run(self) -> Result<(), ConsoleError> {
        let WebServer { listener, ctx } = self;
        let addr = listener.local_addr().ok();
        let app = build_router(Arc::clone(&ctx));
        info!(addr = ?addr, "Browser console listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { ctx.wait_for_shutdown().await })
            .await?;
        info!("Browser console stopped");
        Ok(())
    }
}
