//! # Client WebSocket Relay
//!
//! One `MediaRelay` actor per browser connection on `/media-stream`. The
//! actor exclusively owns both legs of the relay: the client socket (its
//! actix context) and the upstream link (a [`LinkState`] wrapping the
//! connector task's channel), plus the per-connection [`Session`].
//!
//! ## Message flow:
//! - **Client text frame**: translation control message; stores the
//!   direction and sends `session.update` upstream (deferred until the
//!   upstream handshake finishes if it is still in flight).
//! - **Client binary frame**: opaque audio blob; decoded off-thread, then
//!   forwarded upstream as base64 PCM16 — or dropped with a warning when
//!   the upstream link is not open.
//! - **Upstream events**: run through the pure dispatch in [`crate::relay`];
//!   at most one client event comes back out per upstream event.
//! - **Either leg closing**: the other leg is closed exactly once and the
//!   registry entry is released.

use crate::audio::{codec, decoder, transcode};
use crate::config::AppConfig;
use crate::relay::protocol::{ClientControl, ClientEvent, UpstreamRequest};
use crate::relay::session::Session;
use crate::relay::upstream::{UpstreamClosed, UpstreamEventMessage, UpstreamOpened};
use crate::relay::{dispatch_upstream, session_update_for, upstream, LinkState};
use crate::state::{AppState, ConnectionRegistry};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often the client leg is pinged (and turn staleness checked).
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long without any pong before the client is considered gone.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket actor relaying one client connection to one upstream link.
pub struct MediaRelay {
    /// Identity of this connection in the acceptor's registry
    conn_id: Uuid,

    /// Application configuration snapshot
    config: AppConfig,

    /// Acceptor-owned registry this relay registers with
    registry: Arc<ConnectionRegistry>,

    /// Per-connection turn state; never shared outside this actor
    session: Session,

    /// Explicit upstream link state
    link: LinkState,

    /// Whether a deferred `session.update` has already gone out on open
    config_sent: bool,

    /// Last heartbeat response from the client
    last_heartbeat: Instant,
}

impl MediaRelay {
    pub fn new(state: &AppState) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            session: Session::new(state.config.audio.max_turn_bytes),
            link: LinkState::Connecting,
            config_sent: false,
            registry: state.registry.clone(),
            config: state.config.clone(),
            last_heartbeat: Instant::now(),
        }
    }

    /// Record the translation direction from a client control message and,
    /// when the upstream link is already open, produce the `session.update`
    /// to send. While still connecting the update is deferred to
    /// [`MediaRelay::pending_session_update`].
    fn configure_translation(&mut self, control: ClientControl) -> Option<UpstreamRequest> {
        self.session
            .set_translation(control.language_from.clone(), control.language_to.clone());

        if self.link.is_open() {
            self.config_sent = true;
            Some(session_update_for(
                &control.language_from,
                &control.language_to,
                &self.config.upstream,
            ))
        } else {
            debug!("Upstream link not open yet, session.update deferred");
            None
        }
    }

    /// The deferred `session.update` to send when the upstream link opens,
    /// if a direction was configured while connecting. Guarded so the
    /// open/configure orderings both yield exactly one update.
    fn pending_session_update(&mut self) -> Option<UpstreamRequest> {
        if self.config_sent {
            return None;
        }
        let (from, to) = self.session.translation()?.clone();
        self.config_sent = true;
        Some(session_update_for(&from, &to, &self.config.upstream))
    }

    /// Handle a client text frame.
    fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientControl>(text) {
            Ok(control) => {
                info!(
                    from = %control.language_from,
                    to = %control.language_to,
                    "Client configured translation direction"
                );
                if let Some(request) = self.configure_translation(control) {
                    self.link.send(request);
                }
            }
            Err(e) => {
                // Connection survives a bad frame.
                warn!(error = %e, "Ignoring unparseable client text frame");
            }
        }
    }

    /// Handle a client binary frame: an opaque audio blob.
    ///
    /// Decoding runs on a blocking thread so the event loop never stalls;
    /// only this frame's processing waits on it. Audio arriving before the
    /// upstream link opens is dropped, not queued.
    fn handle_audio(&mut self, data: &[u8]) {
        let tx = match &self.link {
            LinkState::Open(tx) => tx.clone(),
            _ => {
                warn!(
                    bytes = data.len(),
                    "Dropping client audio, upstream link not open"
                );
                return;
            }
        };

        let blob = data.to_vec();
        tokio::spawn(async move {
            let decoded = tokio::task::spawn_blocking(move || decoder::decode_to_samples(&blob)).await;
            match decoded {
                Ok(Ok(samples)) => {
                    let pcm = codec::samples_to_pcm16(&samples);
                    let audio = transcode::encode(&pcm);
                    if tx.send(UpstreamRequest::AudioAppend { audio }).is_err() {
                        warn!("Upstream link went away before audio could be forwarded");
                    }
                }
                Ok(Err(e)) => {
                    // Nothing is forwarded for this blob; connection survives.
                    warn!(error = %e, "Failed to decode client audio blob");
                }
                Err(e) => {
                    error!(error = %e, "Audio decode task failed");
                }
            }
        });
    }

    /// Send one event to the client.
    fn send_client_event(&self, event: &ClientEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(event) {
            Ok(json) => ctx.text(json),
            Err(e) => error!(error = %e, "Failed to serialize client event"),
        }
    }
}

impl Actor for MediaRelay {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(conn_id = %self.conn_id, "Client connected to /media-stream");
        self.registry.register(self.conn_id);

        // Open the paired upstream leg.
        let upstream_config = self.config.upstream.clone();
        tokio::spawn(upstream::run(upstream_config, ctx.address()));

        let turn_timeout = Duration::from_secs(self.config.audio.turn_timeout_secs);
        ctx.run_interval(HEARTBEAT_INTERVAL, move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(conn_id = %act.conn_id, "Client heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");

            // An upstream that never completes a turn must not hold audio
            // forever; abandon the stale turn and keep the connection.
            if act.session.turn_stale(turn_timeout) {
                warn!(conn_id = %act.conn_id, "Turn inactivity deadline passed, failing turn");
                act.session.reset_turn();
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Close the paired leg exactly once; dropping the sender ends the
        // connector task, which closes the upstream socket.
        if self.link.close() {
            debug!(conn_id = %self.conn_id, "Closing upstream leg with client connection");
        }
        self.registry.release(&self.conn_id);
        info!(conn_id = %self.conn_id, "Client disconnected from /media-stream");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MediaRelay {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(&text),
            Ok(ws::Message::Binary(data)) => self.handle_audio(&data),
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(conn_id = %self.conn_id, ?reason, "Client closed connection");
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                error!(conn_id = %self.conn_id, error = %e, "Client WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<UpstreamOpened> for MediaRelay {
    type Result = ();

    fn handle(&mut self, msg: UpstreamOpened, _ctx: &mut Self::Context) {
        if matches!(self.link, LinkState::Closed) {
            // Relay already terminating; dropping the sender tears the
            // freshly opened socket back down.
            return;
        }

        info!(conn_id = %self.conn_id, "Upstream link open");
        self.link = LinkState::Open(msg.tx);

        if let Some(request) = self.pending_session_update() {
            self.link.send(request);
        }
    }
}

impl Handler<UpstreamEventMessage> for MediaRelay {
    type Result = ();

    fn handle(&mut self, msg: UpstreamEventMessage, ctx: &mut Self::Context) {
        match dispatch_upstream(&mut self.session, msg.0, &self.config.audio) {
            Ok(Some(event)) => self.send_client_event(&event, ctx),
            Ok(None) => {}
            Err(e) => {
                warn!(conn_id = %self.conn_id, error = %e, "Failing current turn");
                self.session.reset_turn();
            }
        }
    }
}

impl Handler<UpstreamClosed> for MediaRelay {
    type Result = ();

    fn handle(&mut self, _msg: UpstreamClosed, ctx: &mut Self::Context) {
        info!(conn_id = %self.conn_id, "Upstream link closed");
        self.link.close();
        ctx.stop();
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a fresh relay actor.
pub async fn media_stream(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    debug!(peer = ?req.connection_info().peer_addr(), "WebSocket upgrade on /media-stream");
    let relay = MediaRelay::new(state.get_ref());
    ws::start(relay, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tokio::sync::mpsc;

    fn relay_with_link(link: LinkState) -> MediaRelay {
        let state = AppState::new(AppConfig::default());
        let mut relay = MediaRelay::new(&state);
        relay.link = link;
        relay
    }

    fn control(from: &str, to: &str) -> ClientControl {
        ClientControl {
            language_from: from.to_string(),
            language_to: to.to_string(),
        }
    }

    #[test]
    fn test_control_while_open_sends_update_immediately() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut relay = relay_with_link(LinkState::Open(tx));

        let request = relay.configure_translation(control("en", "fr")).unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "session.update");

        // Nothing further is pending once the update went out.
        assert!(relay.pending_session_update().is_none());
    }

    #[test]
    fn test_control_while_connecting_defers_update_until_open() {
        let mut relay = relay_with_link(LinkState::Connecting);

        // Control message arrives before the upstream handshake finishes.
        assert!(relay.configure_translation(control("en", "fr")).is_none());

        // On open, exactly one update is produced.
        let request = relay.pending_session_update().unwrap();
        let json = serde_json::to_value(&request).unwrap();
        let instructions = json["session"]["instructions"].as_str().unwrap();
        assert!(instructions.contains("en"));
        assert!(instructions.contains("fr"));

        assert!(relay.pending_session_update().is_none());
    }

    #[test]
    fn test_no_update_pending_without_translation() {
        let mut relay = relay_with_link(LinkState::Connecting);
        assert!(relay.pending_session_update().is_none());
    }

    #[test]
    fn test_new_relay_starts_connecting() {
        let state = AppState::new(AppConfig::default());
        let relay = MediaRelay::new(&state);
        assert!(matches!(relay.link, LinkState::Connecting));
        assert!(!relay.config_sent);
    }
}
