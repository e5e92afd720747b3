//! `/events` WebSocket streaming (grounded on the teacher's WebSocket event
//! streaming loop, minus the QEMU-specific event type).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use tracing::{debug, error, info};

use crate::coordinator::{Coordinator, VmEvent};

pub async fn events_handler(ws: WebSocketUpgrade, State(coordinator): State<Arc<Coordinator>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator))
}

async fn handle_socket(mut socket: WebSocket, coordinator: Arc<Coordinator>) {
    info!("vmctl: events client connected");

    let mut rx = coordinator.events.subscribe();
    let mut dropped_count: u64 = 0;

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if dropped_count > 0 {
                            if let Ok(json) = serde_json::to_string(&VmEvent::Backpressure { dropped_count }) {
                                if socket.send(Message::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                            dropped_count = 0;
                        }

                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if let Err(err) = socket.send(Message::Text(json)).await {
                                    error!(%err, "vmctl: failed to send event to client");
                                    break;
                                }
                            }
                            Err(err) => error!(%err, "vmctl: failed to serialize event"),
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        dropped_count += n;
                        debug!(dropped_count, "vmctl: events client lagging");
                    }
                    Err(err) => {
                        error!(%err, "vmctl: event channel closed");
                        break;
                    }
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("vmctl: events client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        error!(%err, "vmctl: websocket error");
                        break;
                    }
                }
            }
        }
    }
}
