//! Per-connection handshake, subscription dispatch, and heartbeat.
//!
//! Grounded on the gateway's node WebSocket handler: split socket into a
//! writer task draining an outbound `mpsc` channel and a reader loop
//! dispatching inbound frames, with a wait-for-hello gate before the
//! connection is considered established.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use sa_domain::ReplayQuery;
use sa_protocol::{ClientFrame, ErrorCode, ServerFrame, PROTOCOL_VERSION};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::state::FanoutState;

struct SubscriptionHandle {
    cancel: CancellationToken,
}

type Subs = Arc<Mutex<HashMap<String, SubscriptionHandle>>>;

pub async fn handle_socket(socket: WebSocket, state: FanoutState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let version = match wait_for_hello(&mut ws_stream, state.config.hello_timeout).await {
        Some(v) => v,
        None => {
            tracing::debug!("socket closed before hello");
            return;
        }
    };

    if version != PROTOCOL_VERSION {
        let _ = send_frame(
            &mut ws_sink,
            &ServerFrame::Error {
                code: ErrorCode::VersionMismatch,
                message: format!("server speaks protocol {PROTOCOL_VERSION}, client sent {version}"),
            },
        )
        .await;
        return;
    }

    if send_frame(&mut ws_sink, &ServerFrame::ServerHello { version: PROTOCOL_VERSION })
        .await
        .is_err()
    {
        return;
    }

    let conn_cancel = CancellationToken::new();
    let subs: Subs = Arc::new(Mutex::new(HashMap::new()));
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerFrame>(256);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_sink.send(Message::Text(frame.encode())).await.is_err() {
                break;
            }
        }
    });

    let mut ping_timer = tokio::time::interval(state.config.heartbeat_interval);
    ping_timer.tick().await; // first tick fires immediately; skip it
    let mut pong_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = conn_cancel.cancelled() => break,
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(
                            &text,
                            &state,
                            &subs,
                            &outbound_tx,
                            &conn_cancel,
                            &mut pong_deadline,
                        ).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            _ = ping_timer.tick() => {
                if outbound_tx.send(ServerFrame::Ping).await.is_err() {
                    break;
                }
                pong_deadline = Some(Instant::now() + state.config.heartbeat_timeout);
            }
            _ = sleep_until_opt(pong_deadline), if pong_deadline.is_some() => {
                tracing::debug!("closing connection: no pong within heartbeat_timeout");
                break;
            }
        }
    }

    conn_cancel.cancel();
    writer.abort();
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

async fn wait_for_hello(
    stream: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
    timeout: std::time::Duration,
) -> Option<u32> {
    tokio::time::timeout(timeout, async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                if let Some(ClientFrame::Hello { version }) = ClientFrame::decode(&text) {
                    return Some(version);
                }
                // other-frame-while-fresh: ignored, keep waiting.
            }
        }
        None
    })
    .await
    .unwrap_or(None)
}

async fn send_frame(
    sink: &mut (impl SinkExt<Message> + Unpin),
    frame: &ServerFrame,
) -> Result<(), ()> {
    sink.send(Message::Text(frame.encode())).await.map_err(|_| ())
}

async fn handle_client_frame(
    text: &str,
    state: &FanoutState,
    subs: &Subs,
    outbound_tx: &mpsc::Sender<ServerFrame>,
    conn_cancel: &CancellationToken,
    pong_deadline: &mut Option<Instant>,
) {
    match ClientFrame::decode(text) {
        Some(ClientFrame::Subscribe { stream_id, after_seq }) => {
            let sub_cancel = conn_cancel.child_token();
            let previous = subs
                .lock()
                .insert(stream_id.clone(), SubscriptionHandle { cancel: sub_cancel.clone() });
            if let Some(previous) = previous {
                previous.cancel.cancel();
            }
            tokio::spawn(run_subscription(
                state.clone(),
                subs.clone(),
                stream_id,
                after_seq,
                outbound_tx.clone(),
                sub_cancel,
                conn_cancel.clone(),
            ));
        }
        Some(ClientFrame::Unsubscribe { stream_id }) => {
            if let Some(handle) = subs.lock().remove(&stream_id) {
                handle.cancel.cancel();
            }
        }
        Some(ClientFrame::Pong) => {
            *pong_deadline = None;
        }
        Some(ClientFrame::Hello { .. }) => {
            // already established; a second hello is just ignored.
        }
        None => {
            let _ = outbound_tx
                .send(ServerFrame::Error {
                    code: ErrorCode::InvalidMessage,
                    message: "could not parse client frame".into(),
                })
                .await;
        }
    }
}

/// Drives one subscription through `REPLAYING` to `LIVE`, then forwards
/// broadcasts until unsubscribed, overflowed, or the connection closes.
async fn run_subscription(
    state: FanoutState,
    subs: Subs,
    stream_id: String,
    after_seq: u64,
    outbound_tx: mpsc::Sender<ServerFrame>,
    sub_cancel: CancellationToken,
    conn_cancel: CancellationToken,
) {
    // Subscribe before replaying so nothing broadcast mid-replay is missed;
    // it simply accumulates in this receiver's bounded ring until we start
    // reading it in the LIVE phase below.
    let mut live_rx = state.broadcaster.subscribe(&stream_id);

    let store = state.event_store.clone();
    let replay_stream_id = stream_id.clone();
    let replayed = tokio::task::spawn_blocking(move || {
        store.replay(&replay_stream_id, ReplayQuery::from_seq(after_seq))
    })
    .await;

    let events = match replayed {
        Ok(Ok(events)) => events,
        Ok(Err(e)) => {
            let _ = outbound_tx
                .send(ServerFrame::Error {
                    code: ErrorCode::ReplayFailed,
                    message: format!("replay failed for {stream_id}: {e}"),
                })
                .await;
            return;
        }
        Err(e) => {
            let _ = outbound_tx
                .send(ServerFrame::Error {
                    code: ErrorCode::ReplayFailed,
                    message: format!("replay task for {stream_id} panicked: {e}"),
                })
                .await;
            return;
        }
    };

    for event in &events {
        if sub_cancel.is_cancelled() {
            return;
        }
        if outbound_tx
            .send(ServerFrame::Event { stream_id: stream_id.clone(), event: event.clone() })
            .await
            .is_err()
        {
            return;
        }
    }

    let last_replay_seq = events.last().map(|e| e.seq).unwrap_or(after_seq);
    if sub_cancel.is_cancelled() {
        return;
    }
    if outbound_tx
        .send(ServerFrame::ReplayEnd { stream_id: stream_id.clone(), last_replay_seq })
        .await
        .is_err()
    {
        return;
    }

    let mut last_seen_seq = last_replay_seq;
    loop {
        tokio::select! {
            _ = sub_cancel.cancelled() => return,
            recv = live_rx.recv() => {
                match recv {
                    Ok(event) => {
                        // Dedup: this event may already be in the replay we just sent.
                        if event.seq <= last_seen_seq {
                            continue;
                        }
                        last_seen_seq = event.seq;
                        if outbound_tx
                            .send(ServerFrame::Event { stream_id: stream_id.clone(), event })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        let _ = outbound_tx
                            .send(ServerFrame::Error {
                                code: ErrorCode::BufferOverflow,
                                message: format!(
                                    "subscription to {stream_id} exceeded max_buffer_size"
                                ),
                            })
                            .await;
                        subs.lock().remove(&stream_id);
                        conn_cancel.cancel();
                        return;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}
