use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::stream::Stream;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::state::{AppState, StoreEvent};

/// Store events as JSON text. A subscriber that falls behind skips the
/// events it missed and keeps going.
fn event_feed(rx: broadcast::Receiver<StoreEvent>) -> impl Stream<Item = String> + Send {
    BroadcastStream::new(rx).filter_map(|message| async move {
        match message {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Some(json),
                Err(err) => {
                    warn!(error = %err, "failed to serialize store event");
                    None
                }
            },
            Err(err) => {
                warn!(error = %err, "event subscriber lagged");
                None
            }
        }
    })
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let feed = event_feed(state.events_tx.subscribe());

    info!("websocket client connected");

    let mut send_task = tokio::spawn(async move {
        let mut feed = std::pin::pin!(feed);
        while let Some(json) = feed.next().await {
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("websocket client disconnected");
}

/// Same change feed as `/ws`, as server-sent events.
pub async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = event_feed(state.events_tx.subscribe())
        .map(|json| Ok(Event::default().event("store").data(json)));

    Sse::new(stream).keep_alive(KeepAlive::default())
}
