//! WebSocket transport
//!
//! This file implements the WebSocket server in front of the registry:
//! - accept TCP connections and upgrade them to WebSocket, but only on the
//!   configured socket path (`/socket` by default); other paths get a 404;
//! - run one `Session` per connection with the shared `Registry`.
//!
//! Origins are not checked.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tracing::{info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;

use crate::broker::Registry;
use crate::config::Settings;
use crate::transport::session::Session;
use crate::utils::HubError;

/// Binds `addr` and serves WebSocket clients until the task is dropped.
pub async fn start_websocket_server(
    addr: &str,
    registry: Arc<Registry>,
    settings: Settings,
) -> Result<(), HubError> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, registry, settings).await;
    Ok(())
}

/// Accepts connections from an already bound listener, forever.
pub async fn serve(listener: TcpListener, registry: Arc<Registry>, settings: Settings) {
    match listener.local_addr() {
        Ok(local) => info!(
            "WebSocket server listening on ws://{local}{}",
            settings.server.path
        ),
        Err(e) => warn!("WebSocket server listening on unknown address: {e}"),
    }

    let settings = Arc::new(settings);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                // usually fd exhaustion; back off instead of spinning
                warn!("failed to accept connection: {e}");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        tokio::spawn(handle_connection(
            stream,
            peer,
            registry.clone(),
            settings.clone(),
        ));
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
    settings: Arc<Settings>,
) {
    let path = settings.server.path.as_str();
    let callback = |request: &Request, response: Response| check_path(request, response, path);
    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, "WebSocket handshake error: {e}");
            return;
        }
    };

    let (sink, source) = ws_stream.split();
    let session = Session::new(registry, settings.broker.queue_capacity);
    let id = session.endpoint().id();
    info!(endpoint = %id, %peer, "client connected");

    let reason = session.run(sink, source).await;
    info!(endpoint = %id, %peer, "client disconnected: {reason}");
}

fn check_path(
    request: &Request,
    response: Response,
    path: &str,
) -> Result<Response, ErrorResponse> {
    let requested = request.uri().path();
    if requested == path {
        return Ok(response);
    }

    let mut error = ErrorResponse::new(Some(format!("no WebSocket endpoint at {requested}")));
    *error.status_mut() = StatusCode::NOT_FOUND;
    Err(error)
}
