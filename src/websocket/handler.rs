//! WebSocket Handler
//!
//! Upgrades viewer requests and runs one writer and one reader per
//! connection. The writer drains the viewer's hub queue; the reader only
//! watches for close frames and the read deadline.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::hub::{Frame, HubHandle};
use crate::api::AppState;

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = state.hub.clone();
    let read_deadline = state.viewer_read_deadline;
    ws.on_upgrade(move |socket| handle_socket(socket, hub, read_deadline))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: HubHandle, read_deadline: Duration) {
    let (mut sender, receiver) = socket.split();

    let viewer = match hub.register().await {
        Ok(viewer) => viewer,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register viewer");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    let viewer_id = viewer.id.clone();

    let mut send_task = tokio::spawn(write_frames(sender, viewer.frames, viewer.closed));
    let mut recv_task = tokio::spawn(read_frames(receiver, read_deadline, viewer_id.clone()));

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    hub.unregister(&viewer_id).await;
}

/// Forward hub frames to the socket until the hub closes the viewer or a
/// write fails
async fn write_frames<S>(
    mut sender: S,
    mut frames: mpsc::Receiver<Frame>,
    mut closed: oneshot::Receiver<()>,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    loop {
        tokio::select! {
            biased;

            _ = &mut closed => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            frame = frames.recv() => {
                let message = match frame {
                    Some(Frame::Payload(bytes)) => match std::str::from_utf8(&bytes) {
                        Ok(text) => Message::Text(text.to_owned()),
                        Err(_) => Message::Binary(bytes.to_vec()),
                    },
                    Some(Frame::Ping) => Message::Ping(Vec::new()),
                    None => break,
                };
                if let Err(e) = sender.send(message).await {
                    tracing::debug!(error = %e, "WebSocket write failed");
                    break;
                }
            }
        }
    }
}

/// Read until close, error, or the deadline passes without any frame
///
/// Every inbound frame, pongs included, refreshes the deadline.
async fn read_frames<R, E>(mut receiver: R, read_deadline: Duration, viewer_id: String)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        match tokio::time::timeout(read_deadline, receiver.next()).await {
            Err(_) => {
                tracing::debug!(viewer_id = %viewer_id, "Read deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(viewer_id = %viewer_id, error = %e, "WebSocket receive error");
                break;
            }
            Ok(Some(Ok(Message::Close(_)))) => {
                tracing::debug!(viewer_id = %viewer_id, "Viewer requested close");
                break;
            }
            Ok(Some(Ok(_))) => {}
        }
    }
}
