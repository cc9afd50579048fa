//! SSE + HTTP POST transport.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use bifrost_lsp::Provider;
use futures::stream::{self, Stream, StreamExt};
use rmcp::model::{ErrorCode, ErrorData};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::protocol::{SESSION_NOT_FOUND, error_response};
use crate::session::{Delivery, Frame, SessionManager};

const OUTBOUND_BUFFER: usize = 64;

pub(crate) struct HttpState<P> {
    pub(crate) manager: Arc<SessionManager<P>>,
    pub(crate) base_path: String,
    pub(crate) project_name: String,
    pub(crate) description: String,
}

/// Routes under `base_path` (empty for the root).
pub(crate) fn router<P: Provider>(state: Arc<HttpState<P>>) -> axum::Router {
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    let base_path = state.base_path.clone();
    let routes = axum::Router::new()
        .route("/sse", get(sse::<P>))
        .route("/message", post(message::<P>))
        .route("/health", get(health::<P>))
        .with_state(state);
    let app = if base_path.is_empty() {
        routes
    } else {
        axum::Router::new().nest(&base_path, routes)
    };
    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn session_error(status: StatusCode, id: Value, err: &SessionError) -> Response {
    let body = error_response(id, ErrorData::new(SESSION_NOT_FOUND, err.to_string(), None));
    (status, Json(body)).into_response()
}

/// Closes the session when the event stream is dropped.
struct SessionGuard<P: Provider> {
    manager: Arc<SessionManager<P>>,
    id: String,
}

impl<P: Provider> Drop for SessionGuard<P> {
    fn drop(&mut self) {
        debug!("event stream for session {} dropped", self.id);
        self.manager.close(&self.id);
    }
}

fn event_stream<P: Provider>(
    endpoint: String,
    frames: mpsc::Receiver<Frame>,
    guard: SessionGuard<P>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let first = Event::default().event("endpoint").data(endpoint);
    let rest = stream::unfold((frames, guard), |(mut frames, guard)| async move {
        let event = match frames.recv().await? {
            Frame::Message(message) => Event::default().event("message").data(message.to_string()),
            Frame::Heartbeat => Event::default().comment("heartbeat"),
        };
        Some((Ok(event), (frames, guard)))
    });
    stream::once(async move { Ok(first) }).chain(rest)
}

async fn sse<P: Provider>(State(state): State<Arc<HttpState<P>>>) -> Response {
    let refuse = |err: SessionError| {
        warn!("refusing event stream: {err}");
        session_error(StatusCode::SERVICE_UNAVAILABLE, Value::Null, &err)
    };

    let id = match state.manager.open_session() {
        Ok(id) => id,
        Err(err) => return refuse(err),
    };
    let guard = SessionGuard {
        manager: state.manager.clone(),
        id: id.clone(),
    };
    let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
    if let Err(err) = state.manager.attach(&id, tx).await {
        return refuse(err);
    }

    let endpoint = format!("{}/message?sessionId={id}", state.base_path);
    Sse::new(event_stream(endpoint, rx, guard)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageQuery {
    session_id: Option<String>,
}

async fn message<P: Provider>(
    State(state): State<Arc<HttpState<P>>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let message: Value = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(err) => {
            let error = ErrorData::new(ErrorCode::PARSE_ERROR, format!("Parse error: {err}"), None);
            return (StatusCode::BAD_REQUEST, Json(error_response(Value::Null, error))).into_response();
        }
    };
    let id = message.get("id").cloned().unwrap_or(Value::Null);
    let session_id = query.session_id.unwrap_or_default();

    match state.manager.deliver(&session_id, message).await {
        Ok(Delivery::Queued) => {
            (StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))).into_response()
        }
        Ok(Delivery::Response(None)) => StatusCode::ACCEPTED.into_response(),
        Ok(Delivery::Response(Some(response))) => (StatusCode::OK, Json(response)).into_response(),
        Err(err @ SessionError::NotFound(_)) => session_error(StatusCode::NOT_FOUND, id, &err),
        Err(err) => {
            warn!("message for session {session_id} failed: {err}");
            session_error(StatusCode::INTERNAL_SERVER_ERROR, id, &err)
        }
    }
}

async fn health<P: Provider>(State(state): State<Arc<HttpState<P>>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "project": state.project_name,
        "description": state.description,
    }))
}
