use std::collections::VecDeque;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::Event;
use crate::feeds::client::{Command, ConnectionStatus, RetryPolicy, StreamClient, Transport};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns the WebSocket for one feed URL and runs the [`StreamClient`]'s
/// commands against it.
pub struct FeedConnection {
    url: String,
    client: StreamClient,
}

/// Handle to a spawned feed task. Dropping it aborts the task.
pub struct FeedHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl FeedHandle {
    /// Ask the task to close the socket and cancel any pending retry, then
    /// wait for it to finish. Never waits on a full event channel.
    pub async fn stop(mut self) -> Result<()> {
        let _ = self.stop_tx.send(true);
        match (&mut self.task).await {
            Ok(result) => result,
            // Aborted or panicked; nothing left to release
            Err(_) => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl FeedConnection {
    pub fn new(url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            client: StreamClient::new(policy),
        }
    }

    /// Spawns a task that connects and sends Frame and Status events
    pub fn spawn(self, tx: mpsc::Sender<Event>) -> FeedHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(tx, stop_rx));
        FeedHandle { stop_tx, task }
    }

    async fn run(mut self, tx: mpsc::Sender<Event>, mut stop: watch::Receiver<bool>) -> Result<()> {
        let mut pending: VecDeque<Command> = self.client.start().into();
        let mut socket: Option<Socket> = None;

        loop {
            let Some(command) = pending.pop_front() else {
                // Nothing queued: read the socket if there is one, else we're done
                let Some(ws) = socket.as_mut() else {
                    break;
                };

                let transport = tokio::select! {
                    _ = stopped(&mut stop) => {
                        pending.extend(self.client.stop());
                        continue;
                    }
                    msg = ws.next() => to_transport(msg),
                };

                if let Some(transport) = transport {
                    if matches!(transport, Transport::Closed { .. } | Transport::Error(_)) {
                        socket = None;
                    }
                    pending.extend(self.client.handle(transport));
                }
                continue;
            };

            match command {
                Command::Connect => {
                    debug!(url = %self.url, "Connecting");
                    let result = tokio::select! {
                        _ = stopped(&mut stop) => {
                            pending.extend(self.client.stop());
                            continue;
                        }
                        r = connect_async(self.url.as_str()) => r,
                    };
                    match result {
                        Ok((ws, _)) => {
                            socket = Some(ws);
                            pending.extend(self.client.handle(Transport::Opened));
                        }
                        Err(e) => {
                            pending.extend(self.client.handle(Transport::Error(e.to_string())));
                        }
                    }
                }
                Command::Deliver(text) => {
                    let sent = tokio::select! {
                        _ = stopped(&mut stop) => {
                            pending.extend(self.client.stop());
                            continue;
                        }
                        r = tx.send(Event::Frame(text)) => r,
                    };
                    if sent.is_err() {
                        return Err(Error::ChannelClosed);
                    }
                }
                Command::ScheduleRetry(delay) => {
                    tokio::select! {
                        _ = stopped(&mut stop) => pending.extend(self.client.stop()),
                        _ = tokio::time::sleep(delay) => {
                            pending.extend(self.client.handle(Transport::RetryDue));
                        }
                    }
                }
                // The retry sleep only lives inside the select above, so
                // leaving it is what cancels it.
                Command::CancelRetry => {}
                Command::Disconnect => {
                    if let Some(mut ws) = socket.take() {
                        let _ = ws.close(None).await;
                    }
                }
                // Best effort once stopping; the loop may no longer be reading
                Command::Report(ConnectionStatus::Stopped) => {
                    let _ = tx.try_send(Event::Status(ConnectionStatus::Stopped));
                }
                Command::Report(status) => {
                    let sent = tokio::select! {
                        _ = stopped(&mut stop) => {
                            pending.extend(self.client.stop());
                            continue;
                        }
                        r = tx.send(Event::Status(status)) => r,
                    };
                    if sent.is_err() {
                        return Err(Error::ChannelClosed);
                    }
                }
            }
        }

        debug!(status = ?self.client.status(), "Feed task exiting");
        Ok(())
    }
}

// Resolves once stop is requested or the handle is gone
async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

fn to_transport(
    msg: Option<std::result::Result<tungstenite::Message, tungstenite::Error>>,
) -> Option<Transport> {
    match msg {
        None => Some(Transport::Closed { reason: None }),
        Some(Ok(tungstenite::Message::Text(text))) => Some(Transport::Message(text)),
        Some(Ok(tungstenite::Message::Binary(bytes))) => match String::from_utf8(bytes) {
            Ok(text) => Some(Transport::Message(text)),
            Err(_) => {
                warn!("Dropping non-UTF-8 binary frame");
                None
            }
        },
        Some(Ok(tungstenite::Message::Close(frame))) => Some(Transport::Closed {
            reason: frame.map(|f| f.reason.to_string()),
        }),
        Some(Ok(_)) => None,
        Some(Err(e)) => Some(Transport::Error(e.to_string())),
    }
}
