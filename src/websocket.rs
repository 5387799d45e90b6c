//! # WebSocket Streaming Endpoint
//!
//! Handles real-time audio streaming for speech-to-text transcription.
//! Clients connect to `/ws/transcribe?token=...` and send binary audio
//! frames; the server answers with ordered JSON events (acknowledgements,
//! transcription results, summaries).
//!
//! ## Session Loop:
//! Each accepted connection runs one sequential task: a receive-with-timeout
//! cycle over the message stream. A received frame is dispatched to the
//! session's chunk or control path; a timeout runs the idle-tier trigger
//! checks (silence flush, keepalive). The 1s poll window is scheduling
//! granularity, not a protocol deadline. Because the task awaits each
//! transcription pass inline, at most one invocation is ever in flight per
//! session and the buffer needs no locking.
//!
//! ## Teardown:
//! Peer close, stream end, and protocol errors all leave the loop; the
//! session transitions through `Stopping` to `Closed` and the connection is
//! closed. Identity rejection happens before the loop ever starts, with a
//! close code that distinguishes it from runtime failure.

use crate::auth::AuthError;
use crate::error::{AppError, AppResult};
use crate::session::events::ServerEvent;
use crate::session::StreamSession;
use crate::state::AppState;
use crate::transcription::TranscriptionInvoker;

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// HTTP-to-WebSocket upgrade handler.
///
/// The credential is resolved before the session exists: a rejected token
/// gets a handshake followed immediately by a close frame carrying the
/// rejection code, and no audio is ever accepted on that channel.
pub async fn stream_websocket(
    req: HttpRequest,
    body: web::Payload,
    app_state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let (response, ws, msg_stream) = actix_ws::handle(&req, body)
        .map_err(|e| AppError::BadRequest(format!("websocket upgrade failed: {}", e)))?;

    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .map(|q| q.into_inner())
        .unwrap_or_default();
    let token = query.get("token").map(String::as_str);

    match app_state.verifier.verify(token) {
        Err(rejection) => {
            info!(
                reason = %rejection,
                peer = ?req.connection_info().peer_addr(),
                "streaming connection rejected"
            );
            actix_web::rt::spawn(reject(ws, rejection));
        }
        Ok(identity) => {
            let config = app_state.get_config();
            let invoker = TranscriptionInvoker::new(
                app_state.engine.clone(),
                Duration::from_millis(config.engine.request_timeout_ms),
            );
            let session = StreamSession::new(
                identity,
                invoker,
                config.streaming.trigger_config(),
                config.streaming.history_limit,
            );

            info!(session_id = %session.id(), "streaming connection accepted");
            app_state.session_started();
            actix_web::rt::spawn(run_session(
                ws,
                msg_stream,
                session,
                config.streaming.poll_window(),
                app_state.clone(),
            ));
        }
    }

    Ok(response)
}

/// Close a freshly upgraded connection with the rejection's close code.
async fn reject(ws: Session, rejection: AuthError) {
    let reason = CloseReason {
        code: CloseCode::Other(rejection.close_code()),
        description: Some(rejection.to_string()),
    };
    let _ = ws.close(Some(reason)).await;
}

/// The sequential per-connection session loop.
async fn run_session(
    mut ws: Session,
    mut msg_stream: MessageStream,
    mut session: StreamSession,
    poll_window: Duration,
    app_state: web::Data<AppState>,
) {
    let events = session.activate();
    if !send_events(&mut ws, events).await {
        session.shutdown();
        app_state.session_ended();
        return;
    }

    let close_reason = loop {
        match tokio::time::timeout(poll_window, msg_stream.next()).await {
            Ok(Some(Ok(message))) => match message {
                Message::Binary(chunk) => {
                    let events = session.on_chunk(&chunk).await;
                    if !send_events(&mut ws, events).await {
                        break None;
                    }
                }
                Message::Text(text) => {
                    let events = session.on_control(&text).await;
                    if !send_events(&mut ws, events).await {
                        break None;
                    }
                }
                Message::Ping(payload) => {
                    if ws.pong(&payload).await.is_err() {
                        break None;
                    }
                }
                Message::Pong(_) => {}
                Message::Close(reason) => {
                    debug!(session_id = %session.id(), ?reason, "peer closed channel");
                    break reason;
                }
                // Fragmented and no-op frames are not part of this protocol.
                Message::Continuation(_) | Message::Nop => {
                    warn!(session_id = %session.id(), "ignoring unexpected frame");
                }
            },
            Ok(Some(Err(err))) => {
                warn!(session_id = %session.id(), error = %err, "websocket protocol error");
                break Some(CloseReason {
                    code: CloseCode::Error,
                    description: None,
                });
            }
            // Stream ended without a close frame: transport is gone.
            Ok(None) => break None,
            // Poll window elapsed with no message: idle-tier checks.
            Err(_) => {
                let events = session.on_idle().await;
                if !send_events(&mut ws, events).await {
                    break None;
                }
            }
        }
    };

    session.shutdown();
    app_state.session_ended();
    let _ = ws.close(close_reason).await;
}

/// Serialize and ship events in production order. Returns `false` once the
/// peer can no longer be reached, which ends the loop.
async fn send_events(ws: &mut Session, events: Vec<ServerEvent>) -> bool {
    for event in events {
        match serde_json::to_string(&event) {
            Ok(json) => {
                if ws.text(json).await.is_err() {
                    return false;
                }
            }
            Err(err) => {
                // Serialization of our own event type failing is a bug, but
                // it must not take the session down.
                error!(error = %err, "failed to serialize outbound event");
            }
        }
    }
    true
}
