//! HTTP handlers
//!
//! Stream endpoint plus the publishing and administration endpoints.

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::connection::ChannelTransport;
use crate::events::{Event, EventData, Payload};
use crate::protocol::LAST_EVENT_ID;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use sse_common::AppError;
use std::time::Duration;
use uuid::Uuid;

/// Response header carrying the CID a stream was registered under
pub const CONSUMER_ID_HEADER: &str = "X-Consumer-Id";

/// Flushed chunks buffered between a delivery loop and the response body
const STREAM_BUFFER: usize = 16;

/// Query string of the stream endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub cid: Option<String>,
}

/// Open an event stream
pub async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let cid = query
        .cid
        .filter(|cid| !cid.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let last_event_id = headers
        .get(LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let (transport, stream) = ChannelTransport::new(STREAM_BUFFER);
    // detached: the stream ends when the client goes away or the hub closes
    let _subscription = state
        .hub()
        .connect(cid.clone(), transport, last_event_id)?;

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(CONSUMER_ID_HEADER, cid.as_str());
    for (name, value) in stream.headers() {
        response = response.header(name, value);
    }

    response
        .body(stream.into_body())
        .map_err(ApiError::internal)
}

/// Event submitted over HTTP
///
/// At most one of `only`, `except` and `recover` may be set; none means
/// broadcast.
#[derive(Debug, Default, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub id: String,
    /// Send `data` as one `data:` line even if it contains newlines
    #[serde(default)]
    pub raw: bool,
    pub only: Option<Vec<String>>,
    pub except: Option<Vec<String>>,
    /// CID whose recovery queue receives the event
    pub recover: Option<String>,
}

impl PublishRequest {
    /// Convert into a hub event
    pub fn into_event(self) -> Result<Event<String>, AppError> {
        let data = if self.raw {
            EventData::raw(self.data)
        } else {
            EventData::new(self.data)
        };
        let payload = Payload::new(data).event(self.event).id(self.id);

        match (self.only, self.except, self.recover) {
            (None, None, None) => Ok(Event::Broadcast(payload)),
            (Some(cids), None, None) => Ok(Event::Targeted { cids, payload }),
            (None, Some(cids), None) => Ok(Event::Excluded { cids, payload }),
            (None, None, Some(cid)) => Ok(Event::Recovery { cid, payload }),
            _ => Err(AppError::invalid_input(
                "only one of `only`, `except` and `recover` may be set",
            )),
        }
    }
}

/// Submit an event
pub async fn publish_handler(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> ApiResult<StatusCode> {
    let event = request.into_event()?;
    tracing::debug!(kind = event.kind(), "Event submitted over HTTP");

    state.hub().send(event).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub retry_ms: u64,
}

/// Change the reconnect delay and announce it to every consumer
pub async fn retry_handler(
    State(state): State<AppState>,
    Json(request): Json<RetryRequest>,
) -> ApiResult<StatusCode> {
    let retry = Duration::from_millis(request.retry_ms);
    state.hub().send(Event::Retry(retry)).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Disconnect a consumer
pub async fn remove_consumer_handler(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> ApiResult<StatusCode> {
    if state.hub().remove_consumer(&cid) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("consumer {cid}")).into())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub consumers: usize,
    pub retry_ms: u64,
}

/// Hub statistics
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let hub = state.hub();
    Json(StatsResponse {
        consumers: hub.count_consumers(),
        retry_ms: u64::try_from(hub.retry().as_millis()).unwrap_or(u64::MAX),
    })
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}
