//! Server connection: handshake, reconnect loop and message pump.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use velo_wire::{CloseCode, RunnerBound, ServerBound, RUNNER_NAME_HEADER};

use crate::error::ConnectionError;
use crate::executor::BenchExecutor;
use crate::session::{Finished, Session};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Runner endpoint, e.g. `ws://bench.example.com:7890/runner`.
    pub server_url: String,
    pub name: String,
    pub token: Option<String>,
}

/// Open a socket to the server, presenting name and token.
pub async fn connect(config: &ClientConfig) -> Result<Socket, ConnectionError> {
    let mut request = config.server_url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(RUNNER_NAME_HEADER, header_value(&config.name)?);
    if let Some(token) = &config.token {
        headers.insert(header::AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
    }

    match tokio_tungstenite::connect_async(request).await {
        Ok((socket, _)) => Ok(socket),
        Err(WsError::Http(response)) if response.status() == StatusCode::UNAUTHORIZED => {
            Err(ConnectionError::AuthenticationFailure)
        }
        Err(e) => Err(e.into()),
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ConnectionError> {
    HeaderValue::from_str(value).map_err(|e| ConnectionError::InvalidRequest(e.to_string()))
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Reconnect,
    Shutdown,
}

pub struct RunnerClient {
    config: ClientConfig,
    session: Session,
    events: mpsc::UnboundedReceiver<Finished>,
    shutdown: watch::Receiver<bool>,
}

impl RunnerClient {
    pub fn new(config: ClientConfig, executor: BenchExecutor, shutdown: watch::Receiver<bool>) -> Self {
        let (session, events) = Session::new(executor);
        Self {
            config,
            session,
            events,
            shutdown,
        }
    }

    /// Stay connected until shutdown is signalled.
    pub async fn run(mut self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match connect(&self.config).await {
                Ok(socket) => {
                    info!(server = %self.config.server_url, runner = %self.config.name, "connected to server");
                    backoff = INITIAL_BACKOFF;
                    if self.serve(socket).await == Flow::Shutdown {
                        return;
                    }
                    self.session.cancel("connection to server lost");
                }
                Err(ConnectionError::AuthenticationFailure) => {
                    error!(
                        runner = %self.config.name,
                        retry_in_secs = backoff.as_secs(),
                        "authentication failure, check VELO_RUNNER_TOKEN"
                    );
                    backoff = next_backoff(backoff);
                }
                Err(e) => {
                    warn!(error = %e, retry_in_secs = backoff.as_secs(), "could not connect to server");
                    backoff = next_backoff(backoff);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.shutdown.changed() => {
                    self.session.cancel("runner shutting down");
                    return;
                }
            }
        }
    }

    async fn serve(&mut self, mut socket: Socket) -> Flow {
        loop {
            let replies = tokio::select! {
                frame = socket.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.on_text(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code));
                        match code.and_then(CloseCode::from_code) {
                            Some(CloseCode::NameTaken) => {
                                error!(runner = %self.config.name, "another runner is connected under this name");
                            }
                            Some(close) => info!(code = %close, "server closed the connection"),
                            None => info!(code = ?code, "server closed the connection"),
                        }
                        return Flow::Reconnect;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "connection error");
                        return Flow::Reconnect;
                    }
                    None => {
                        warn!("connection closed without a close frame");
                        return Flow::Reconnect;
                    }
                },
                Some(finished) = self.events.recv() => self.session.on_finished(finished),
                _ = self.shutdown.changed() => {
                    self.session.cancel("runner shutting down");
                    let frame = CloseFrame {
                        code: WsCloseCode::from(CloseCode::ClientDisconnect.code()),
                        reason: "runner shutting down".into(),
                    };
                    if let Err(e) = socket.close(Some(frame)).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    return Flow::Shutdown;
                }
            };

            for reply in replies {
                let wire = match reply.to_wire() {
                    Ok(wire) => wire,
                    Err(e) => {
                        error!(message = reply.identifier(), error = %e, "failed to encode message");
                        continue;
                    }
                };
                if let Err(e) = socket.send(Message::Text(wire.into())).await {
                    warn!(error = %e, "failed to send to server");
                    return Flow::Reconnect;
                }
                debug!(message = reply.identifier(), "sent");
            }
        }
    }

    fn on_text(&mut self, text: &str) -> Vec<ServerBound> {
        match RunnerBound::from_wire(text) {
            Ok(message) => {
                debug!(message = message.identifier(), "received");
                self.session.handle(message)
            }
            Err(e) if e.is_unknown_type() => {
                debug!(error = %e, "ignoring unknown message type");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "malformed message from server");
                Vec::new()
            }
        }
    }
}
