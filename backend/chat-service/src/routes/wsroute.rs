use crate::error::AppError;
use crate::services::message_router::MessageRouter;
use crate::state::AppState;
use crate::websocket::{is_participant_id, ChatLeg, SessionHandle, SessionId};
use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, StreamHandler, WrapFuture};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use jwt_security::Verification;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub access: Option<String>,
}

pub struct ChatSession {
    leg: ChatLeg,
    handle: SessionHandle,
    outbound: Option<UnboundedReceiver<String>>,
    router: MessageRouter,
    hb: Instant,
    close_code: Option<u16>,
}

impl ChatSession {
    fn new(leg: ChatLeg, router: MessageRouter) -> Self {
        let (handle, outbound) = SessionHandle::channel();
        Self {
            leg,
            handle,
            outbound: Some(outbound),
            router,
            hb: Instant::now(),
            close_code: None,
        }
    }

    fn session_id(&self) -> SessionId {
        self.handle.id()
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!(leg = %act.leg.forward(), "chat heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for ChatSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);

        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }

        // Nothing else is processed until the leg is registered and the
        // history frame is queued.
        let router = self.router.clone();
        let leg = self.leg.clone();
        let handle = self.handle.clone();
        ctx.wait(
            async move { router.connect(&leg, handle).await }
                .into_actor(self)
                .map(|result, act, ctx| {
                    if let Err(e) = result {
                        error!(leg = %act.leg.forward(), error = %e, "failed to open chat leg");
                        ctx.stop();
                    }
                }),
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let router = self.router.clone();
        let leg = self.leg.clone();
        let session = self.session_id();
        let code = self.close_code;

        actix::spawn(async move {
            router.close(&leg, session, code).await;
        });
    }
}

/// Frames queued through the registry.
impl StreamHandler<String> for ChatSession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    // The session keeps its own sender alive, so this only fires on stop.
    fn finished(&mut self, _ctx: &mut Self::Context) {}
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                let router = self.router.clone();
                let leg = self.leg.clone();
                let raw = text.to_string();

                // One frame at a time per socket.
                ctx.wait(
                    async move { router.on_message(&leg, &raw).await }
                        .into_actor(self)
                        .map(|result, act, _ctx| {
                            if let Err(e) = result {
                                error!(
                                    target: "internal_error",
                                    leg = %act.leg.forward(),
                                    error = %e,
                                    "failed to route chat message"
                                );
                            }
                        }),
                );
            }
            Ok(ws::Message::Binary(_)) => {
                debug!("binary chat frames are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                self.close_code = reason.as_ref().map(|r| u16::from(r.code));
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                warn!(leg = %self.leg.forward(), error = %e, "chat socket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Check path ids and the `?access=` token before upgrading.
async fn admit(
    state: &AppState,
    path: &(String, String),
    params: &WsParams,
) -> Result<ChatLeg, AppError> {
    let (sender, receiver) = path;
    if !is_participant_id(sender) || !is_participant_id(receiver) {
        return Err(AppError::Validation("invalid_participant".into()));
    }

    let token = params
        .access
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?;
    if let Err(e) = state.tokens.validate_access(token, Verification::Strict).await {
        // Revoked or expired tokens still decode; name the user in the log.
        debug!(
            user_id = %state.tokens.extract_claim(token, "user_id"),
            error = %e,
            "rejecting chat socket token"
        );
        return Err(e.into());
    }

    Ok(ChatLeg::new(sender.clone(), receiver.clone()))
}

/// **Endpoint**: `GET /ws/{sender}/{receiver}?access=<token>`
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let leg = admit(&state, &path, &query).await?;
    let session = ChatSession::new(leg, state.router.clone());
    ws::start(session, &req, stream)
}
