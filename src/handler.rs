//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, event
//! decoding, acknowledgement delivery, and bidirectional communication
//! with the ChatServer.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{ClientEvent, ServerEvent};
use crate::server::{AckSender, ServerCommand};
use crate::types::ConnectionId;

/// Buffer size for the server → client event channel
const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, registers the connection with the
/// ChatServer, and runs the read/write task pair until either side closes.
/// Each decoded event is driven to its acknowledgement before the next
/// frame is read, so a connection's events are handled strictly in order.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Generate connection ID
    let id = ConnectionId::new();
    info!("Connection {} opened from {}", id, peer_addr);

    // Channel for server -> client events
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER_SIZE);

    // Register with ChatServer
    if cmd_tx
        .send(ServerCommand::Connect {
            id,
            sender: event_tx.clone(),
        })
        .await
        .is_err()
    {
        error!("Failed to register connection {} - server closed", id);
        return Err(AppError::ChannelSend);
    }

    // Clone channels for the read task
    let cmd_tx_read = cmd_tx.clone();
    let ack_tx = event_tx.clone();

    // Spawn read task (WebSocket -> ServerCommand -> ack)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    let ack = match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => {
                            let (reply_tx, reply_rx) = oneshot::channel();
                            let cmd = client_event_to_command(id, event, reply_tx);
                            if cmd_tx_read.send(cmd).await.is_err() {
                                debug!("Server closed, ending read task for {}", id);
                                break;
                            }
                            // Wait for the event to be handled to completion
                            // before reading the next frame
                            match reply_rx.await {
                                Ok(Ok(())) => ServerEvent::ack_ok(),
                                Ok(Err(e)) => ServerEvent::ack_err(&e),
                                Err(_) => {
                                    debug!("Server dropped ack for {}", id);
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Invalid event from {}: {}", id, e);
                            ServerEvent::ack_err(&AppError::InvalidEvent)
                        }
                    };
                    if ack_tx.send(ack).await.is_err() {
                        debug!("Write side closed, ending read task for {}", id);
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Connection {} sent close frame", id);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", id);
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", id);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", id);
    });

    // Spawn write task (ServerEvent -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for connection");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", id);
        }
    }

    // Send disconnect command
    let _ = cmd_tx.send(ServerCommand::Disconnect { id }).await;

    info!("Connection {} closed", id);

    Ok(())
}

/// Convert a ClientEvent to a ServerCommand carrying its ack channel
fn client_event_to_command(
    id: ConnectionId,
    event: ClientEvent,
    respond_to: AckSender,
) -> ServerCommand {
    match event {
        ClientEvent::Join { username, room } => ServerCommand::Join {
            id,
            username,
            room,
            respond_to,
        },
        ClientEvent::SendMessage { text } => ServerCommand::SendMessage {
            id,
            text,
            respond_to,
        },
        ClientEvent::SendLocation {
            latitude,
            longitude,
        } => ServerCommand::SendLocation {
            id,
            latitude,
            longitude,
            respond_to,
        },
    }
}
