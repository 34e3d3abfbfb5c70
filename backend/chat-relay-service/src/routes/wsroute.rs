//! Hosted WebSocket transport.
//!
//! `GET /ws` upgrades an authenticated request into a session actor. The
//! actor registers its connection on open, drains its outbox from the local
//! push gateway, answers `sendMessage` frames, and deregisters on close.

use crate::error::{AppError, AppResult};
use crate::gateway::LocalSessionGateway;
use crate::handlers::{self, SendMessageRequest};
use crate::state::AppState;
use crate::websocket::{WsInboundFrame, WsOutboundFrame};
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_middleware::AuthContext;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

/// Reply frame for the actor to write
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct TextFrame(String);

struct WsSession {
    user_id: String,
    connection_id: String,
    state: AppState,
    sessions: LocalSessionGateway,
    outbox: Option<UnboundedReceiver<String>>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let client_timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > client_timeout {
                tracing::warn!(
                    connection_id = %act.connection_id,
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_message(&self, request: SendMessageRequest, ctx: &mut ws::WebsocketContext<Self>) {
        let state = self.state.clone();
        let user_id = self.user_id.clone();
        let addr = ctx.address();

        actix::spawn(async move {
            let frame = match handlers::send_message(&state, Some(&user_id), request).await {
                Ok(body) => WsOutboundFrame::SendResult {
                    status: 200,
                    body: serde_json::to_value(body).unwrap_or(Value::Null),
                },
                Err(e) => WsOutboundFrame::SendResult {
                    status: e.status_code(),
                    body: serde_json::to_value(e.to_response()).unwrap_or(Value::Null),
                },
            };

            match serde_json::to_string(&frame) {
                Ok(text) => addr.do_send(TextFrame(text)),
                Err(e) => tracing::error!(error = %e, "failed to encode send result"),
            }
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            "WebSocket session started"
        );

        self.hb(ctx);

        if let Some(outbox) = self.outbox.take() {
            ctx.add_stream(UnboundedReceiverStream::new(outbox));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            "WebSocket session stopped"
        );

        let state = self.state.clone();
        let sessions = self.sessions.clone();
        let user_id = self.user_id.clone();
        let connection_id = self.connection_id.clone();

        actix::spawn(async move {
            sessions.close(&connection_id).await;
            if let Err(e) = handlers::on_disconnect(&state, Some(&user_id), Some(&connection_id)).await {
                tracing::error!(
                    connection_id = %connection_id,
                    error = %e,
                    "failed to deregister closed session"
                );
            }
        });
    }
}

impl Handler<TextFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: TextFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

// Outbox: every item is a payload pushed by the fan-out engine
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // Gateway dropped the sender, so no more pushes can arrive
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match WsInboundFrame::parse(&text) {
                Some(WsInboundFrame::SendMessage {
                    conversation_id,
                    text,
                }) => self.send_message(
                    SendMessageRequest {
                        conversation_id,
                        text,
                    },
                    ctx,
                ),
                None => {
                    tracing::debug!(connection_id = %self.connection_id, "ignoring unknown frame");
                }
            },
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(?reason, "WebSocket close message received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(connection_id = %self.connection_id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// Issue a connection id, open its outbox and register it.
///
/// The outbox opens first: once the registry lists the connection, a push
/// to it must land in the session, never come back `Gone`. A failed
/// registration closes the outbox again.
pub async fn open_session(
    state: &AppState,
    sessions: &LocalSessionGateway,
    user_id: &str,
) -> AppResult<(String, UnboundedReceiver<String>)> {
    let connection_id = Uuid::new_v4().to_string();
    let outbox = sessions.open(&connection_id).await;

    if let Err(e) = handlers::on_connect(state, Some(user_id), Some(&connection_id)).await {
        sessions.close(&connection_id).await;
        return Err(e);
    }
    Ok((connection_id, outbox))
}

/// GET /ws
///
/// The front door has already resolved the caller. The connection id is
/// issued here and lives only as long as the session.
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    auth: Option<AuthContext>,
) -> Result<HttpResponse, Error> {
    let Some(sessions) = state.sessions.clone() else {
        return Ok(HttpResponse::NotFound().finish());
    };
    let user_id = auth.map(|a| a.user_id).ok_or(AppError::Unauthorized)?;
    let (connection_id, outbox) = open_session(&state, &sessions, &user_id).await?;

    let session = WsSession {
        user_id: user_id.clone(),
        connection_id: connection_id.clone(),
        state: state.get_ref().clone(),
        sessions: sessions.clone(),
        outbox: Some(outbox),
        hb: Instant::now(),
        heartbeat_interval: state.config.ws.heartbeat_interval,
        client_timeout: state.config.ws.client_timeout,
    };

    match ws::start(session, &req, stream) {
        Ok(response) => Ok(response),
        Err(e) => {
            // Handshake failed before the actor ran; undo the registration
            sessions.close(&connection_id).await;
            if let Err(cleanup) =
                handlers::on_disconnect(&state, Some(&user_id), Some(&connection_id)).await
            {
                tracing::warn!(error = %cleanup, "failed to undo registration");
            }
            Err(e)
        }
    }
}
