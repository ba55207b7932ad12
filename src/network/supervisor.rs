use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::{ChatError, ConnectionStatus, OutboundFrame, UserId};

use super::transport::{Connector, Link, LinkEvent};

/// Incremented on every open and close; transport callbacks carry the epoch they were born in.
pub type ConnectionEpoch = u64;

/// What the supervisor reports to its single consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Frame(String),
    Status {
        status: ConnectionStatus,
        reason: Option<String>,
    },
}

enum Signal {
    Opened(mpsc::UnboundedSender<String>),
    Failed(String),
    Frame(String),
    Closed(Option<String>),
}

struct Tagged {
    epoch: ConnectionEpoch,
    signal: Signal,
}

/// Owns the one transport connection of the authenticated identity.
pub struct ConnectionSupervisor {
    connector: Arc<dyn Connector>,
    epoch: ConnectionEpoch,
    status: ConnectionStatus,
    identity: Option<UserId>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    task: Option<JoinHandle<()>>,
    signal_sender: mpsc::UnboundedSender<Tagged>,
    signal_receiver: mpsc::UnboundedReceiver<Tagged>,
}

impl ConnectionSupervisor {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let (signal_sender, signal_receiver) = mpsc::unbounded_channel();
        Self {
            connector,
            epoch: 0,
            status: ConnectionStatus::Disconnected,
            identity: None,
            outbound: None,
            task: None,
            signal_sender,
            signal_receiver,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn epoch(&self) -> ConnectionEpoch {
        self.epoch
    }

    /// Starts the handshake for `identity`. The outcome arrives through `next_event`.
    pub fn open(&mut self, identity: UserId) -> ConnectionStatus {
        if self.identity.as_ref() == Some(&identity) && self.status != ConnectionStatus::Disconnected
        {
            return self.status;
        }
        if self.identity.is_some() {
            self.close();
        }

        self.epoch += 1;
        let epoch = self.epoch;
        log::info!("Opening connection for user {identity} (epoch {epoch})");

        self.identity = Some(identity.clone());
        self.status = ConnectionStatus::Connecting;

        let connector = Arc::clone(&self.connector);
        let signals = self.signal_sender.clone();
        self.task = Some(tokio::spawn(async move {
            let Link {
                outbound,
                mut inbound,
            } = match connector.connect(&identity).await {
                Ok(link) => link,
                Err(err) => {
                    let _ = signals.send(Tagged {
                        epoch,
                        signal: Signal::Failed(err.to_string()),
                    });
                    return;
                }
            };

            if signals
                .send(Tagged {
                    epoch,
                    signal: Signal::Opened(outbound),
                })
                .is_err()
            {
                return;
            }

            while let Some(event) = inbound.recv().await {
                let signal = match event {
                    LinkEvent::Frame(text) => Signal::Frame(text),
                    LinkEvent::Closed(reason) => Signal::Closed(reason),
                };
                let closed = matches!(signal, Signal::Closed(_));
                if signals.send(Tagged { epoch, signal }).is_err() || closed {
                    return;
                }
            }
            let _ = signals.send(Tagged {
                epoch,
                signal: Signal::Closed(None),
            });
        }));

        self.status
    }

    /// Releases the transport. Anything still in flight from it becomes stale.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.outbound = None;
        self.epoch += 1;
        if let Some(identity) = self.identity.take() {
            log::info!("Closed connection for user {identity}");
        }
        self.status = ConnectionStatus::Disconnected;
    }

    pub fn send(&self, frame: &OutboundFrame) -> Result<(), ChatError> {
        let outbound = match (&self.outbound, self.status) {
            (Some(outbound), ConnectionStatus::Connected) => outbound,
            _ => return Err(ChatError::NotConnected),
        };
        let text =
            serde_json::to_string(frame).map_err(|err| ChatError::ConnectionFailure(err.to_string()))?;
        outbound.send(text).map_err(|_| ChatError::NotConnected)
    }

    /// Next event from the current connection. Events from superseded epochs are dropped here.
    pub async fn next_event(&mut self) -> Option<SupervisorEvent> {
        loop {
            let Tagged { epoch, signal } = self.signal_receiver.recv().await?;
            if epoch != self.epoch {
                log::debug!("Discarding event from stale connection epoch {epoch}");
                continue;
            }

            match signal {
                Signal::Opened(outbound) => {
                    self.outbound = Some(outbound);
                    self.status = ConnectionStatus::Connected;
                    log::info!("Connected to server (epoch {epoch})");
                    return Some(SupervisorEvent::Status {
                        status: ConnectionStatus::Connected,
                        reason: None,
                    });
                }
                Signal::Frame(text) => return Some(SupervisorEvent::Frame(text)),
                Signal::Failed(reason) => {
                    log::warn!("Connection attempt failed: {reason}");
                    return Some(self.dropped(Some(reason)));
                }
                Signal::Closed(reason) => {
                    log::info!("Disconnected from server");
                    return Some(self.dropped(reason));
                }
            }
        }
    }

    fn dropped(&mut self, reason: Option<String>) -> SupervisorEvent {
        // identity is kept so that a later open() for the same user reconnects
        self.task = None;
        self.outbound = None;
        self.epoch += 1;
        self.status = ConnectionStatus::Disconnected;
        SupervisorEvent::Status {
            status: ConnectionStatus::Disconnected,
            reason,
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
