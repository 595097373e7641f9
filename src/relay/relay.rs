use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as ClientMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::TokenVerifier;
use crate::store::Records;

/// The fixed channel set relayed from a node's console stream. Anything a
/// node emits outside these is dropped, never forwarded.
pub const CHANNELS: [&str; 6] = [
    "console",
    "block",
    "installed",
    "announcement",
    "statusUpdate",
    "initialStatus",
];

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct ConsoleParams {
    pub token: Option<String>,
    pub server: Option<String>,
}

/// Per-session console proxy: one authenticated client connection bridged
/// to the owning node's live console stream.
pub struct ConsoleRelay {
    store: Arc<dyn Records>,
    tokens: Arc<dyn TokenVerifier>,
    scheme: String,
}

impl ConsoleRelay {
    pub fn new(store: Arc<dyn Records>, tokens: Arc<dyn TokenVerifier>, scheme: &str) -> Self {
        ConsoleRelay {
            store,
            tokens,
            scheme: scheme.to_string(),
        }
    }

    /// Drive one session to completion. Every failure before the upstream
    /// dial just drops the client socket: an authorization failure must not
    /// signal whether the instance exists, and must never dereference any
    /// node address or secret.
    pub async fn run_session(&self, client: WebSocket, params: ConsoleParams) {
        let token = match params.token {
            Some(token) => token,
            None => return,
        };
        let principal = match tokio::time::timeout(HANDSHAKE_TIMEOUT, self.tokens.verify(&token))
            .await
        {
            Ok(Some(principal)) => principal,
            _ => return,
        };

        let server_id = match params.server.as_deref().and_then(|s| Uuid::parse_str(s).ok()) {
            Some(id) => id,
            None => return,
        };
        let server = match self.store.get_server(server_id).await {
            Ok(server) => server,
            Err(_) => return,
        };
        if !server.is_operator(principal) {
            return;
        }

        let node = match self.store.get_node(server.node).await {
            Ok(node) => node,
            Err(_) => return,
        };

        let ws_scheme = if self.scheme == "https" { "wss" } else { "ws" };
        let url = format!(
            "{}://{}:{}/server/{}/console?authentication={}",
            ws_scheme, node.host, node.port, server.id, node.secret
        );

        // Node agents use self-signed certificates, like every other call
        // to them.
        let connector = if ws_scheme == "wss" {
            match native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()
            {
                Ok(tls) => Some(Connector::NativeTls(tls)),
                Err(e) => {
                    warn!("[RELAY] Could not build TLS connector: {}", e);
                    return;
                }
            }
        } else {
            None
        };

        let upstream = match connect_async_tls_with_config(url.as_str(), None, false, connector).await {
            Ok((upstream, _)) => upstream,
            Err(e) => {
                warn!("[RELAY] Could not reach console of node {}: {}", node.name, e);
                return;
            }
        };

        debug!(
            "[RELAY] Session open: user {} on server {}",
            principal, server.id
        );
        forward(client, upstream).await;
        debug!("[RELAY] Session closed for server {}", server.id);
    }
}

/// Pure, untransformed forwarding between the two legs of a session. Runs
/// until either side closes, then closes the other: no session half
/// survives its peer, and nothing is buffered beyond the transport.
async fn forward(client: WebSocket, upstream: WebSocketStream<MaybeTlsStream<TcpStream>>) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    loop {
        tokio::select! {
            upstream_msg = upstream_rx.next() => match upstream_msg {
                Some(Ok(UpstreamMessage::Text(raw))) => {
                    if on_channel(raw.as_str())
                        && client_tx
                            .send(ClientMessage::Text(raw.as_str().into()))
                            .await
                            .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(UpstreamMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            client_msg = client_rx.next() => match client_msg {
                // The console stream is one-way; client frames are not
                // forwarded, only their disconnect matters.
                Some(Ok(ClientMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = client_tx.close().await;
    let _ = upstream_tx.close().await;
}

fn on_channel(raw: &str) -> bool {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return false,
    };
    value
        .get("event")
        .and_then(Value::as_str)
        .map(|event| CHANNELS.contains(&event))
        .unwrap_or(false)
}
