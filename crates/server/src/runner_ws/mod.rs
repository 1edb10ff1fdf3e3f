//! Websocket endpoint runners connect to.
//!
//! Each socket is split into a writer task fed by an unbounded channel (the
//! [`RunnerLink`] the dispatcher talks to) and a read loop that forwards text
//! frames and pongs to the dispatcher.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use velo_dispatch::RunnerLink;
use velo_wire::{CloseCode, RUNNER_NAME_HEADER};

use crate::state::AppState;

// ── Handshake ───────────────────────────────────────────────────

/// Check the handshake headers and return the runner's name.
pub fn authorize(headers: &HeaderMap, token: Option<&str>) -> Result<String, (StatusCode, &'static str)> {
    let name = headers
        .get(RUNNER_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "missing X-Runner-Name header"))?;

    if let Some(expected) = token {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected) {
            warn!(runner = name, "runner failed authentication");
            return Err((StatusCode::UNAUTHORIZED, "invalid runner token"));
        }
    }

    Ok(name.to_string())
}

pub async fn runner_upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    match authorize(&headers, state.runner_token.as_deref()) {
        Ok(name) => ws
            .on_upgrade(move |socket| handle_runner(socket, state, name))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

// ── Link ────────────────────────────────────────────────────────

struct SocketLink {
    tx: mpsc::UnboundedSender<Message>,
}

impl RunnerLink for SocketLink {
    fn send_ping(&self) -> bool {
        self.tx.send(Message::Ping(Bytes::new())).is_ok()
    }

    fn send_text(&self, text: String) -> bool {
        self.tx.send(Message::Text(text.into())).is_ok()
    }

    fn close(&self, code: CloseCode, reason: &str) {
        let frame = CloseFrame {
            code: code.code(),
            reason: reason.to_string().into(),
        };
        let _ = self.tx.send(Message::Close(Some(frame)));
    }
}

// ── Connection loop ─────────────────────────────────────────────

async fn handle_runner(socket: WebSocket, state: Arc<AppState>, name: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let link = Arc::new(SocketLink { tx });

    // Stops after a close frame or once every link handle is gone.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let registered = {
        let name = name.clone();
        let link: Arc<dyn RunnerLink> = link.clone();
        state.with_dispatcher(move |d| d.register(&name, link)).await
    };
    match registered {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            link.close(CloseCode::NameTaken, &e.to_string());
            drop(link);
            let _ = writer.await;
            return;
        }
        Err(e) => {
            error!(runner = %name, error = %e, "runner registration panicked");
            writer.abort();
            return;
        }
    }
    drop(link);

    let mut close_code = None;
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let runner = name.clone();
                let text = text.as_str().to_owned();
                if let Err(e) = state.with_dispatcher(move |d| d.handle_message(&runner, &text)).await {
                    error!(runner = %name, error = %e, "message handler panicked");
                }
            }
            Ok(Message::Pong(_)) => state.dispatcher.on_pong(&name),
            Ok(Message::Close(frame)) => {
                close_code = frame.and_then(|f| CloseCode::from_code(f.code));
                break;
            }
            Ok(Message::Binary(_)) => debug!(runner = %name, "ignoring binary frame"),
            Ok(Message::Ping(_)) => {}
            Err(e) => {
                debug!(runner = %name, error = %e, "runner socket error");
                break;
            }
        }
    }

    let disconnected = {
        let name = name.clone();
        state.with_dispatcher(move |d| d.disconnect(&name, close_code)).await
    };
    if let Err(e) = disconnected {
        error!(runner = %name, error = %e, "runner disconnect panicked");
    }
    writer.abort();
}
