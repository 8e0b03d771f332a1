//! HTTP feed of the conversation for remote viewers.
//!
//! - `GET /api/messages` – every entry so far, in publish order.
//! - `GET /api/messages/stream` – SSE: all entries from the beginning, then live.
//! - `GET /api/turn` – current turn state.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tower_http::cors::CorsLayer;
use tracing::warn;
use yoko_core::{LogEntry, MessageLog};
use yoko_voice::TurnSnapshot;

#[derive(Clone)]
struct ViewerState {
    log: MessageLog,
    turn: watch::Receiver<TurnSnapshot>,
}

pub fn router(log: MessageLog, turn: watch::Receiver<TurnSnapshot>) -> Router {
    Router::new()
        .route("/api/messages", get(list_messages))
        .route("/api/messages/stream", get(message_stream))
        .route("/api/turn", get(turn_state))
        .layer(CorsLayer::permissive())
        .with_state(ViewerState { log, turn })
}

async fn list_messages(
    State(state): State<ViewerState>,
) -> Result<Json<Vec<LogEntry>>, (StatusCode, String)> {
    state.log.entries().map(Json).map_err(|e| {
        warn!(error = %e, "Message snapshot failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

async fn message_stream(
    State(state): State<ViewerState>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    use async_stream::stream;

    let (tx, mut rx) = mpsc::unbounded_channel::<LogEntry>();
    let subscription = state.log.subscribe_from_beginning(move |entry| {
        let _ = tx.send(entry);
    });

    let stream = stream! {
        // Lives as long as the client stays connected.
        let _subscription = subscription;
        while let Some(entry) = rx.recv().await {
            yield Ok(Event::default()
                .event("message")
                .id(entry.key.to_string())
                .json_data(&entry)
                .unwrap_or_else(|_| Event::default().data("{}")));
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

async fn turn_state(State(state): State<ViewerState>) -> Json<TurnSnapshot> {
    Json(*state.turn.borrow())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use yoko_core::Message;
    use yoko_voice::TurnMachine;

    fn idle_turn() -> watch::Receiver<TurnSnapshot> {
        let (_tx, rx) = watch::channel(TurnMachine::new().snapshot());
        rx
    }

    #[tokio::test]
    async fn snapshot_lists_entries_in_order() {
        let log = MessageLog::temporary().unwrap();
        log.publish(Message::user("おはよう").unwrap()).await.unwrap();
        log.publish(Message::ai("おはよう、おかあちゃん。").unwrap())
            .await
            .unwrap();

        let response = router(log, idle_turn())
            .oneshot(Request::get("/api/messages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["sender"], "user");
        assert_eq!(entries[0]["text"], "おはよう");
        assert_eq!(entries[1]["sender"], "ai");
    }

    #[tokio::test]
    async fn turn_endpoint_reports_state() {
        let response = router(MessageLog::temporary().unwrap(), idle_turn())
            .oneshot(Request::get("/api/turn").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["suppressed"], false);
    }

    #[tokio::test]
    async fn stream_is_server_sent_events() {
        let response = router(MessageLog::temporary().unwrap(), idle_turn())
            .oneshot(
                Request::get("/api/messages/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );
    }
}
