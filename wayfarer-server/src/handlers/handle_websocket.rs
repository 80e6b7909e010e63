use std::net::SocketAddr;

use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::infra::{
    app_state::AppState,
    websocket::{Connection, messages},
};

/// Handle WebSocket upgrade request
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Some(remote)))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, remote: Option<SocketAddr>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (connection, mut rx) = Connection::open(remote);
    let conn_id = connection.id();
    info!(session = %conn_id, remote = ?remote, "client connected");

    // Spawn task to handle outgoing messages
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match messages::outbound_to_websocket(&msg) {
                Ok(frame) => {
                    if ws_sender.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode outbound message"),
            }
        }
        let _ = ws_sender.close().await;
    });

    // Handle incoming messages
    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(Message::Close(_)) => break,
            Ok(msg) => msg,
            Err(e) => {
                debug!(session = %conn_id, error = %e, "websocket error");
                break;
            }
        };

        match messages::websocket_to_request(&msg) {
            Ok(Some(request)) => {
                debug!(
                    session = %conn_id,
                    command = %request.command,
                    request_id = %request.request_id,
                    "request received"
                );
                if state.hub.dispatch(connection.session(), request).is_err() {
                    warn!(session = %conn_id, "hub stopped, closing connection");
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                debug!(session = %conn_id, error = %e, "ignoring malformed frame");
            }
        }
    }

    handle_disconnect(&state, connection).await;
    writer.abort();
}

/// Release everything the hub holds for this client.
async fn handle_disconnect(state: &AppState, connection: Connection) {
    let conn_id = connection.id();
    if state.hub.disconnect(conn_id).is_err() {
        debug!(session = %conn_id, "hub already stopped");
    }
    info!(
        session = %conn_id,
        connected_for = %(chrono::Utc::now() - connection.connected_at),
        "client disconnected"
    );
}
