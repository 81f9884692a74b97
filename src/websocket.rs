//! WebSocket module for real-time glucose streaming
//!
//! Each session polls the controller once a second and pushes new readings,
//! new alerts and connection status changes to its client.

use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::controller::CgmController;
use crate::models::{ConnectionStatus, WsMessage};
use crate::state::SessionState;

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the session state is polled for changes
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Position of a client in the session's reading and alert streams
#[derive(Debug, Default, Clone)]
pub struct StreamCursor {
    last_reading_id: Option<Uuid>,
    last_alert_id: Option<Uuid>,
    last_status: Option<ConnectionStatus>,
    primed: bool,
}

impl StreamCursor {
    /// Messages for everything that changed since the previous poll,
    /// oldest first. The first poll only reports the status and the
    /// current reading.
    pub fn advance(&mut self, state: &SessionState) -> Vec<WsMessage> {
        let mut messages = Vec::new();

        let status = state.status();
        if self.last_status != Some(status) {
            self.last_status = Some(status);
            messages.push(WsMessage::StatusChanged {
                status,
                device: state.device().cloned(),
            });
        }

        let first_poll = !self.primed;
        self.primed = true;

        let mut readings: Vec<_> = match self.last_reading_id {
            Some(last) => state.history().take_while(|r| r.id != last).cloned().collect(),
            None if first_poll => state.current_reading().cloned().into_iter().collect(),
            None => state.history().cloned().collect(),
        };
        if let Some(newest) = readings.first() {
            self.last_reading_id = Some(newest.id);
        }
        readings.reverse();
        messages.extend(readings.into_iter().map(WsMessage::ReadingUpdate));

        let mut alerts: Vec<_> = match self.last_alert_id {
            Some(last) => state.alerts().take_while(|a| a.id != last).cloned().collect(),
            None if first_poll => Vec::new(),
            None => state.alerts().cloned().collect(),
        };
        if let Some(newest) = state.alerts().next() {
            self.last_alert_id = Some(newest.id);
        }
        alerts.reverse();
        messages.extend(alerts.into_iter().map(WsMessage::AlertRaised));

        messages
    }
}

/// WebSocket session actor
pub struct WsSession {
    client_id: String,
    last_heartbeat: Instant,
    controller: CgmController,
    cursor: StreamCursor,
    /// A poll is waiting on the session lock
    poll_in_flight: bool,
}

impl WsSession {
    pub fn new(client_id: String, controller: CgmController) -> Self {
        Self {
            client_id,
            last_heartbeat: Instant::now(),
            controller,
            cursor: StreamCursor::default(),
            poll_in_flight: false,
        }
    }

    /// Cursor to poll from, or `None` while the previous poll is unfinished
    fn begin_poll(&mut self) -> Option<StreamCursor> {
        if self.poll_in_flight {
            return None;
        }
        self.poll_in_flight = true;
        Some(self.cursor.clone())
    }

    fn finish_poll(&mut self, cursor: StreamCursor) {
        self.cursor = cursor;
        self.poll_in_flight = false;
    }

    fn send(ctx: &mut ws::WebsocketContext<Self>, msg: &WsMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            ctx.text(json);
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(
                    client_id = %act.client_id,
                    "WebSocket heartbeat timeout"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn start_session_polling(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(POLL_INTERVAL, |act, ctx| {
            let Some(mut cursor) = act.begin_poll() else {
                debug!(client_id = %act.client_id, "Previous poll still pending");
                return;
            };
            let controller = act.controller.clone();

            let fut = async move {
                let state = controller.state().await;
                let messages = cursor.advance(&state);
                (cursor, messages)
            };

            let fut = actix::fut::wrap_future::<_, Self>(fut);

            ctx.spawn(fut.map(|(cursor, messages), act, ctx| {
                act.finish_poll(cursor);
                for msg in &messages {
                    Self::send(ctx, msg);
                }
            }));
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(client_id = %self.client_id, "WebSocket connected");

        self.start_heartbeat(ctx);
        self.start_session_polling(ctx);

        Self::send(
            ctx,
            &WsMessage::Connected {
                client_id: self.client_id.clone(),
            },
        );
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        info!(client_id = %self.client_id, "WebSocket disconnected");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                debug!(client_id = %self.client_id, message = %text);

                match serde_json::from_str::<WsMessage>(&text) {
                    Ok(WsMessage::Ping) => {
                        self.last_heartbeat = Instant::now();
                        Self::send(ctx, &WsMessage::Pong);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(client_id = %self.client_id, error = %e);
                        Self::send(
                            ctx,
                            &WsMessage::Error {
                                message: "Invalid message format".into(),
                            },
                        );
                    }
                }
            }
            Ok(ws::Message::Close(reason)) => {
                info!(client_id = %self.client_id, reason = ?reason);
                ctx.stop();
            }
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e);
                ctx.stop();
            }
            _ => {}
        }
    }
}
