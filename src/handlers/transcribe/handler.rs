//! Transcription WebSocket handler.
//!
//! Owns the connection lifecycle: upgrades the HTTP request, runs one
//! receive loop per connection, and forwards all outbound traffic through
//! a single writer task. Everything per-connection lives on this task's
//! stack; connections share nothing but the application state.

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::middleware::ClientIp;
use crate::state::AppState;

use super::messages::{IncomingMessage, MessageRoute, OutgoingMessage};
use super::session::TranscriptionController;

/// Channel buffer size for outgoing messages.
const CHANNEL_BUFFER_SIZE: usize = 64;

/// Maximum WebSocket frame size (1 MB). Audio chunks are tiny; anything
/// near this limit is a misbehaving client.
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB).
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Transcription WebSocket handler.
///
/// Upgrades the HTTP connection to a WebSocket carrying the transcription
/// protocol: JSON control frames plus binary PCM audio in, JSON transcript
/// deltas out.
pub async fn transcribe_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| {
            handle_transcribe_socket(socket, state, client_ip.map(|Extension(ip)| ip))
        })
}

/// Run one transcription connection to completion.
async fn handle_transcribe_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    client_ip: Option<ClientIp>,
) {
    let connection_id = uuid::Uuid::new_v4();
    info!(%connection_id, "transcription WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    // Writer task: the only place that touches the socket's send half.
    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!("failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let (mut controller, mut session_events) = TranscriptionController::new(
        app_state.speech.clone(),
        app_state.config.recognition(),
        message_tx.clone(),
    );

    loop {
        select! {
            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        if !process_message(msg, &mut controller, &message_tx).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        // Transport failure: same silent teardown as an
                        // explicit stop plus close.
                        debug!(%connection_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(%connection_id, "WebSocket closed by client");
                        break;
                    }
                }
            }
            Some(event) = session_events.recv() => {
                controller.handle_session_event(event).await;
            }
        }
    }

    controller.stop().await;
    sender_task.abort();

    if let Some(ClientIp(ip)) = client_ip {
        app_state.release_connection(ip);
    }

    info!(%connection_id, "transcription WebSocket disconnected");
}

/// Process one inbound frame. Returns `false` to end the connection.
async fn process_message(
    msg: Message,
    controller: &mut TranscriptionController,
    message_tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    match msg {
        Message::Text(text) => {
            match serde_json::from_str::<IncomingMessage>(&text) {
                Ok(IncomingMessage::StartTranscription) => controller.start().await,
                Ok(IncomingMessage::StopTranscription) => controller.stop().await,
                Err(e) => {
                    warn!("failed to parse control message: {}", e);
                    let _ = message_tx
                        .send(MessageRoute::Outgoing(OutgoingMessage::Error {
                            message: format!("invalid message: {e}"),
                        }))
                        .await;
                }
            }
            true
        }
        Message::Binary(data) => {
            controller.push_audio(data).await;
            true
        }
        // axum answers pings at the protocol level.
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            debug!("WebSocket close frame received");
            false
        }
    }
}
