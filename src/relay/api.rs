use std::sync::Arc;

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use super::relay::{ConsoleParams, ConsoleRelay};

type AppState = State<Arc<ConsoleRelay>>;

pub struct Api {
    address: String,
    port: u16,
    router: Router,
}

impl Api {
    pub async fn start(self) {
        let socket = format!("{}:{}", self.address, self.port);
        let listener = tokio::net::TcpListener::bind(socket).await.unwrap();
        axum::serve(listener, self.router).await.unwrap();
    }
}

pub fn setup(address: &str, port: u16, relay: Arc<ConsoleRelay>) -> Api {
    Api {
        address: address.to_string(),
        port,
        router: router(relay),
    }
}

pub fn router(relay: Arc<ConsoleRelay>) -> Router {
    Router::new()
        .route("/console", get(console))
        .with_state(relay)
}

async fn console(
    State(relay): AppState,
    Query(params): Query<ConsoleParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move { relay.run_session(socket, params).await })
}
