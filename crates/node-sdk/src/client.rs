//! Connection lifecycle: handshake, multiplexed subscribe/replay, heartbeat
//! reply, and resume-on-reconnect.

use std::sync::Arc;

use futures_util::{Stream, SinkExt, StreamExt};
use sa_protocol::{ClientFrame, ServerFrame, PROTOCOL_VERSION};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::reconnect::ReconnectBackoff;
use crate::registry::SubscriptionTable;
use crate::types::{FanoutClientError, SubscriptionEvent};

enum Command {
    Subscribe { stream_id: String, after_seq: u64 },
    Unsubscribe { stream_id: String },
}

/// A fully-configured fan-out client ready to connect to the server.
///
/// Create via [`FanoutClientBuilder`](crate::builder::FanoutClientBuilder).
pub struct FanoutClient {
    pub(crate) server_ws_url: String,
    pub(crate) reconnect_backoff: ReconnectBackoff,
}

/// Handle returned by [`FanoutClient::spawn`]; the only way a caller reaches
/// a running client once it has been handed to the connection task.
pub struct FanoutHandle {
    subscriptions: Arc<SubscriptionTable>,
    cmd_tx: mpsc::Sender<Command>,
}

impl FanoutClient {
    pub fn builder() -> crate::builder::FanoutClientBuilder {
        crate::builder::FanoutClientBuilder::new()
    }

    /// Starts the connection-management task and returns a handle for
    /// subscribing to streams. Reconnects indefinitely (bounded by
    /// `reconnect_backoff.max_attempts`) until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> FanoutHandle {
        let subscriptions = Arc::new(SubscriptionTable::new());
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let subs_for_task = subscriptions.clone();
        tokio::spawn(async move {
            if let Err(e) = self.run(subs_for_task, cmd_rx, shutdown).await {
                tracing::warn!(error = %e, "fan-out client stopped");
            }
        });
        FanoutHandle { subscriptions, cmd_tx }
    }

    async fn run(
        self,
        subscriptions: Arc<SubscriptionTable>,
        mut cmd_rx: mpsc::Receiver<Command>,
        shutdown: CancellationToken,
    ) -> Result<(), FanoutClientError> {
        let mut attempt: u32 = 0;
        loop {
            if shutdown.is_cancelled() {
                return Err(FanoutClientError::Shutdown);
            }

            let result = tokio::select! {
                r = self.connect_and_run(&subscriptions, &mut cmd_rx) => r,
                _ = shutdown.cancelled() => return Err(FanoutClientError::Shutdown),
            };

            match result {
                Ok(()) => {
                    tracing::info!(url = %self.server_ws_url, "fan-out connection closed gracefully");
                    attempt = 0;
                }
                Err(e) => {
                    tracing::warn!(url = %self.server_ws_url, attempt, error = %e, "fan-out connection lost");
                }
            }

            if self.reconnect_backoff.should_give_up(attempt) {
                return Err(FanoutClientError::ReconnectExhausted(attempt));
            }
            let delay = self.reconnect_backoff.delay_for_attempt(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Err(FanoutClientError::Shutdown),
            }
            attempt += 1;
        }
    }

    async fn connect_and_run(
        &self,
        subscriptions: &Arc<SubscriptionTable>,
        cmd_rx: &mut mpsc::Receiver<Command>,
    ) -> Result<(), anyhow::Error> {
        let (ws, _response) = tokio_tungstenite::connect_async(&self.server_ws_url).await?;
        let (mut sink, mut stream) = ws.split();

        sink.send(Message::Text(ClientFrame::Hello { version: PROTOCOL_VERSION }.encode()))
            .await?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => match ServerFrame::decode(&text) {
                Some(ServerFrame::ServerHello { version }) if version == PROTOCOL_VERSION => {}
                Some(ServerFrame::Error { code, message }) => {
                    return Err(anyhow::anyhow!("server rejected hello ({code:?}): {message}"))
                }
                other => return Err(anyhow::anyhow!("unexpected handshake reply: {other:?}")),
            },
            _ => return Err(anyhow::anyhow!("connection closed before server-hello")),
        }

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientFrame>(64);
        for (stream_id, after_seq) in subscriptions.resubscribe_plan() {
            outbound_tx.send(ClientFrame::Subscribe { stream_id, after_seq }).await.ok();
        }

        let writer_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if sink.send(Message::Text(frame.encode())).await.is_err() {
                    break;
                }
            }
        });

        let result = self.read_loop(subscriptions, &mut stream, &outbound_tx, cmd_rx).await;
        drop(outbound_tx);
        writer_task.abort();
        result
    }

    async fn read_loop(
        &self,
        subscriptions: &Arc<SubscriptionTable>,
        stream: &mut (impl Stream<Item = tokio_tungstenite::tungstenite::Result<Message>> + Unpin),
        outbound_tx: &mpsc::Sender<ClientFrame>,
        cmd_rx: &mut mpsc::Receiver<Command>,
    ) -> Result<(), anyhow::Error> {
        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_server_frame(subscriptions, outbound_tx, &text).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Subscribe { stream_id, after_seq }) => {
                            outbound_tx.send(ClientFrame::Subscribe { stream_id, after_seq }).await.ok();
                        }
                        Some(Command::Unsubscribe { stream_id }) => {
                            outbound_tx.send(ClientFrame::Unsubscribe { stream_id }).await.ok();
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn handle_server_frame(
        &self,
        subscriptions: &Arc<SubscriptionTable>,
        outbound_tx: &mpsc::Sender<ClientFrame>,
        text: &str,
    ) -> Result<(), anyhow::Error> {
        match ServerFrame::decode(text) {
            Some(ServerFrame::Event { stream_id, event }) => {
                subscriptions.deliver(&stream_id, event.seq, SubscriptionEvent::Event(event)).await;
            }
            Some(ServerFrame::ReplayEnd { stream_id, last_replay_seq }) => {
                subscriptions
                    .deliver(&stream_id, last_replay_seq, SubscriptionEvent::ReplayEnd { last_replay_seq })
                    .await;
            }
            Some(ServerFrame::Ping) => {
                outbound_tx.send(ClientFrame::Pong).await.ok();
            }
            Some(ServerFrame::Error { code, message }) => {
                tracing::warn!(?code, message = %message, "fan-out server error frame");
            }
            Some(ServerFrame::ServerHello { .. }) | None => {
                tracing::debug!("ignoring unexpected frame: {text}");
            }
        }
        Ok(())
    }
}

impl FanoutHandle {
    /// Subscribes to `stream_id` from the beginning and returns a channel
    /// delivering every [`SubscriptionEvent`] for it, including across
    /// disconnect/reconnect cycles (resumed via `last_seen_seq`).
    pub async fn subscribe(&self, stream_id: impl Into<String>) -> mpsc::Receiver<SubscriptionEvent> {
        self.subscribe_after(stream_id, 0).await
    }

    pub async fn subscribe_after(&self, stream_id: impl Into<String>, after_seq: u64) -> mpsc::Receiver<SubscriptionEvent> {
        let stream_id = stream_id.into();
        let (tx, rx) = mpsc::channel(256);
        self.subscriptions.insert(stream_id.clone(), after_seq, tx);
        self.cmd_tx
            .send(Command::Subscribe { stream_id, after_seq })
            .await
            .ok();
        rx
    }

    pub async fn unsubscribe(&self, stream_id: impl Into<String>) {
        let stream_id = stream_id.into();
        self.subscriptions.remove(&stream_id);
        self.cmd_tx.send(Command::Unsubscribe { stream_id }).await.ok();
    }
}
