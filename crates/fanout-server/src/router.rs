//! Axum route wiring for the fan-out WebSocket endpoint.

use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::connection::handle_socket;
use crate::state::FanoutState;

/// Builds the `/v1/stream` router. Mount this into a host application's
/// top-level `Router` (e.g. nested under the `sa-server` binary's app).
pub fn router(state: FanoutState) -> Router {
    Router::new().route("/v1/stream", get(stream_ws)).with_state(state)
}

async fn stream_ws(ws: WebSocketUpgrade, State(state): State<FanoutState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
