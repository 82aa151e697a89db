//! # Upstream Connector
//!
//! One task per relay that owns the WebSocket to the realtime API: it
//! connects with the bearer credential and protocol-version header, then
//! loops over inbound socket frames and the relay's outbound request
//! channel. The relay actor hears about the link purely through actor
//! messages; dropping the request channel is how the relay closes this leg.
//!
//! There is no reconnection here. A dropped upstream link ends the relay.

use crate::config::UpstreamConfig;
use crate::relay::protocol::{UpstreamEvent, UpstreamRequest};
use crate::websocket::MediaRelay;
use actix::{Addr, Message};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{info, warn};

/// The upstream socket finished its handshake; requests go through `tx`.
#[derive(Message)]
#[rtype(result = "()")]
pub struct UpstreamOpened {
    pub tx: mpsc::UnboundedSender<UpstreamRequest>,
}

/// A parsed event from the upstream socket.
#[derive(Message)]
#[rtype(result = "()")]
pub struct UpstreamEventMessage(pub UpstreamEvent);

/// The upstream socket is gone (clean close, error, or failed connect).
#[derive(Message)]
#[rtype(result = "()")]
pub struct UpstreamClosed;

/// Connect and pump the upstream leg for one relay. Always ends by telling
/// the relay the link is closed.
pub async fn run(config: UpstreamConfig, addr: Addr<MediaRelay>) {
    if let Err(e) = connect_and_pump(&config, &addr).await {
        warn!(error = %e, "Upstream connection ended with error");
    }
    addr.do_send(UpstreamClosed);
}

async fn connect_and_pump(
    config: &UpstreamConfig,
    addr: &Addr<MediaRelay>,
) -> anyhow::Result<()> {
    let mut request = config.url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", config.api_key))?,
    );
    headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

    let (ws_stream, _) = connect_async(request).await?;
    info!("Connected to the realtime API");

    let (mut write, mut read) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<UpstreamRequest>();
    addr.do_send(UpstreamOpened { tx });

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<UpstreamEvent>(&text) {
                            Ok(event) => addr.do_send(UpstreamEventMessage(event)),
                            Err(e) => {
                                warn!(error = %e, raw = %text, "Unparseable upstream message");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "Upstream closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {} // binary/ping/pong: nothing to relay
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                }
            }
            cmd = rx.recv() => {
                match cmd {
                    Some(request) => {
                        let json = serde_json::to_string(&request)?;
                        write.send(WsMessage::Text(json)).await?;
                    }
                    None => {
                        // The relay dropped its sender: close our side.
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
