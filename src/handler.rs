//! WebSocket connection handler
//!
//! Handles individual connections: WebSocket handshake with routing on the
//! request path, then one of
//! - `/ws?username=..&room=..`: a chat session (inbound + outbound duty)
//! - `/admin`: notification submission, one JSON notification per frame
//! - `/stats`: a single statistics frame

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::hub::HubHandle;
use crate::message::{AdminError, Notification, NotifyAck};
use crate::session::{run_inbound, run_outbound, InboundContext, Session};

/// Where an upgraded connection goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Chat session with validated join parameters
    Chat { username: String, room: String },
    /// Administrative notification channel
    Admin,
    /// One-shot statistics query
    Stats,
}

/// Map a request path and query to a route
///
/// Join parameters must both be present and non-empty.
pub fn parse_route(path: &str, query: Option<&str>) -> Result<Route, (StatusCode, AppError)> {
    match path {
        "/ws" => {
            let mut username = None;
            let mut room = None;
            if let Some(query) = query {
                for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                    match key.as_ref() {
                        "username" => username = Some(value.into_owned()),
                        "room" => room = Some(value.into_owned()),
                        _ => {}
                    }
                }
            }
            let username = username
                .filter(|u| !u.is_empty())
                .ok_or((StatusCode::BAD_REQUEST, AppError::MissingJoinParam("username")))?;
            let room = room
                .filter(|r| !r.is_empty())
                .ok_or((StatusCode::BAD_REQUEST, AppError::MissingJoinParam("room")))?;
            Ok(Route::Chat { username, room })
        }
        "/admin" => Ok(Route::Admin),
        "/stats" => Ok(Route::Stats),
        _ => Err((StatusCode::NOT_FOUND, AppError::UnknownPath(path.to_string()))),
    }
}

fn reject(status: StatusCode, message: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message));
    *response.status_mut() = status;
    response
}

/// Accept connections forever, one task per connection
pub async fn serve(listener: TcpListener, hub: HubHandle, config: Arc<Config>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("New connection from {}", addr);
                let hub = hub.clone();
                let config = Arc::clone(&config);

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, hub, config).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake and dispatches on the request path.
/// Requests with a bad path or missing join parameters are refused during
/// the handshake, before any session exists.
pub async fn handle_connection(
    stream: TcpStream,
    hub: HubHandle,
    config: Arc<Config>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut route = None;
    let handshake = accept_hdr_async(stream, |req: &Request, resp: Response| {
        match parse_route(req.uri().path(), req.uri().query()) {
            Ok(parsed) => {
                route = Some(parsed);
                Ok(resp)
            }
            Err((status, reason)) => Err(reject(status, reason.to_string())),
        }
    })
    .await;

    let ws_stream = match handshake {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            debug!("Handshake from {} refused: {}", peer_addr, e);
            return Ok(());
        }
    };
    let Some(route) = route else {
        return Ok(());
    };

    match route {
        Route::Chat { username, room } => {
            run_session(ws_stream, username, room, hub, &config).await
        }
        Route::Admin => {
            info!("Admin channel opened from {}", peer_addr);
            run_admin(ws_stream, hub).await
        }
        Route::Stats => send_stats(ws_stream, hub).await,
    }
}

/// Drive one chat session until either duty ends, then unregister it
async fn run_session(
    ws_stream: WebSocketStream<TcpStream>,
    username: String,
    room: String,
    hub: HubHandle,
    config: &Config,
) -> Result<(), AppError> {
    let (ws_sender, ws_receiver) = ws_stream.split();

    let (session, mailbox) = Session::new(username, room, config.mailbox_capacity);
    let ctx = InboundContext::for_session(&session);
    info!("Session {} ({}) joining '{}'", ctx.id, ctx.username, ctx.room);

    hub.register(session).await?;

    let (liveness_tx, liveness_rx) = watch::channel(Instant::now());

    let mut read_task = tokio::spawn(run_inbound(
        ws_receiver,
        ctx.clone(),
        hub.clone(),
        liveness_tx,
    ));
    let mut write_task = tokio::spawn(run_outbound(
        ws_sender,
        mailbox,
        liveness_rx,
        config.ping_interval,
        config.pong_timeout,
    ));

    tokio::select! {
        _ = &mut read_task => {
            debug!("Inbound duty completed for {}", ctx.id);
            hub.unregister(ctx.id, ctx.room.clone()).await?;
            // Mailbox closes once the hub drops the session; let queued events flush
            if timeout(config.pong_timeout, &mut write_task).await.is_err() {
                write_task.abort();
            }
        }
        _ = &mut write_task => {
            debug!("Outbound duty completed for {}", ctx.id);
            read_task.abort();
            hub.unregister(ctx.id, ctx.room.clone()).await?;
        }
    }

    info!("Session {} ({}) disconnected", ctx.id, ctx.username);
    Ok(())
}

/// Accept notifications until the admin closes the channel
async fn run_admin(
    ws_stream: WebSocketStream<TcpStream>,
    hub: HubHandle,
) -> Result<(), AppError> {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    while let Some(frame) = ws_receiver.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = match serde_json::from_str::<Notification>(&text) {
            Ok(notification) => {
                let id = hub.notify(notification).await?;
                serde_json::to_string(&NotifyAck::sent(id))?
            }
            Err(e) => {
                warn!("Rejected admin notification: {}", e);
                serde_json::to_string(&AdminError {
                    error: e.to_string(),
                })?
            }
        };
        ws_sender.send(Message::Text(reply.into())).await?;
    }

    debug!("Admin channel closed");
    Ok(())
}

async fn send_stats(
    mut ws_stream: WebSocketStream<TcpStream>,
    hub: HubHandle,
) -> Result<(), AppError> {
    let json = serde_json::to_string(&hub.stats())?;
    ws_stream.send(Message::Text(json.into())).await?;
    ws_stream.close(None).await?;
    Ok(())
}
