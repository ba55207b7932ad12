use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::common::{ChatError, UserId};

/// Raw events from one established connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Frame(String),
    Closed(Option<String>),
}

/// Both directions of an established connection. Dropping `outbound` closes it.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Establishes a connection whose handshake carries the user identity.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, identity: &UserId) -> Result<Link, ChatError>;
}

pub struct WebSocketConnector {
    socket_url: Url,
}

impl WebSocketConnector {
    pub fn new(socket_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            socket_url: Url::parse(socket_url)?,
        })
    }

    pub fn build_url(&self, identity: &UserId) -> Url {
        let mut url = self.socket_url.clone();
        url.query_pairs_mut().append_pair("userId", identity.as_str());
        url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, identity: &UserId) -> Result<Link, ChatError> {
        let url = self.build_url(identity);
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| ChatError::ConnectionFailure(err.to_string()))?;
        log::debug!("WebSocket handshake with {} complete", self.socket_url);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_socket(stream, outbound_rx, inbound_tx));

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

async fn pump_socket(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<LinkEvent>,
) {
    let (mut sink, mut source) = stream.split();

    let mut reason = None;
    loop {
        tokio::select! {
            text = outbound.recv() => match text {
                Some(text) => {
                    if let Err(err) = sink.send(Message::Text(text)).await {
                        reason = Some(err.to_string());
                        break;
                    }
                }
                None => {
                    // owner released the connection
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(LinkEvent::Frame(text)).is_err() {
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    if inbound.send(LinkEvent::Frame(text)).is_err() {
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    reason = frame
                        .map(|frame| frame.reason.to_string())
                        .filter(|reason| !reason.is_empty());
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    reason = Some(err.to_string());
                    break;
                }
                None => break,
            },
        }
    }

    let _ = inbound.send(LinkEvent::Closed(reason));
}
