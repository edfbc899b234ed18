//! Push-channel task: handshake, read/write pump, heartbeat, and retry.
//!
//! One task per `connect()`. It owns the socket; every lifecycle edge is
//! reported back to the service, which updates the engine and tells the
//! task whether (and when) to try again. A task whose epoch is no longer
//! current is told to stop.

use std::sync::Weak;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parceltrack_core::ControlMessage;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, interval_at, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::error::ConnectionError;
use crate::query::ShipmentQuery;
use crate::service::Shared;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub(crate) struct ChannelSettings {
    pub url: String,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
}

async fn open(settings: &ChannelSettings) -> Result<Socket, ConnectionError> {
    match timeout(settings.connect_timeout, connect_async(settings.url.as_str())).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(ConnectionError::Handshake(e)),
        Err(_) => Err(ConnectionError::Timeout(settings.connect_timeout)),
    }
}

pub(crate) async fn run_channel<Q: ShipmentQuery>(
    shared: Weak<Shared<Q>>,
    epoch: u64,
    settings: ChannelSettings,
    mut outbound: UnboundedReceiver<ControlMessage>,
    cancel: CancellationToken,
) {
    loop {
        // Anything queued for a previous socket is obsolete; open replays.
        while outbound.try_recv().is_ok() {}

        tracing::debug!(url = %settings.url, epoch, "opening channel");
        let opened = tokio::select! {
            () = cancel.cancelled() => return,
            result = open(&settings) => result,
        };

        let error = match opened {
            Ok(socket) => {
                let Some(service) = shared.upgrade() else {
                    return;
                };
                if !service.channel_opened(epoch) {
                    return;
                }
                drop(service);
                match pump(socket, &shared, &settings, &mut outbound, &cancel).await {
                    Ok(()) => return,
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        let Some(service) = shared.upgrade() else {
            return;
        };
        let Some(delay) = service.channel_failed(epoch, &error) else {
            return;
        };
        drop(service);

        tokio::select! {
            () = cancel.cancelled() => return,
            () = sleep(delay) => {}
        }

        let Some(service) = shared.upgrade() else {
            return;
        };
        if !service.channel_retry_due(epoch) {
            return;
        }
    }
}

/// Drive an open socket until it fails (`Err`) or is cancelled (`Ok`).
async fn pump<Q: ShipmentQuery>(
    socket: Socket,
    shared: &Weak<Shared<Q>>,
    settings: &ChannelSettings,
    outbound: &mut UnboundedReceiver<ControlMessage>,
    cancel: &CancellationToken,
) -> Result<(), ConnectionError> {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let period = settings.heartbeat_interval;
    let mut heartbeat = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(e) = ws_tx.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "close frame not sent");
                }
                return Ok(());
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Some(service) = shared.upgrade() else {
                            return Ok(());
                        };
                        service.ingest_message(&text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_tx.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "channel closed by server");
                        return Err(ConnectionError::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(ConnectionError::Closed),
                }
            }

            Some(control) = outbound.recv() => {
                match control.to_json() {
                    Ok(json) => {
                        tracing::debug!(op = ?control.op, tracking_number = %control.tracking_number, "control message");
                        ws_tx.send(Message::Text(json)).await?;
                    }
                    Err(e) => tracing::warn!(error = %e, "control message not encodable"),
                }
            }

            _ = heartbeat.tick() => {
                ws_tx.send(Message::Ping(Vec::new())).await?;
            }
        }
    }
}
