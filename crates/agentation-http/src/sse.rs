use std::convert::Infallible;
use std::time::Duration;

use agentation_bus::SubscriptionHandle;
use agentation_core::{CoreError, Event as DomainEvent};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::Receiver;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use crate::error::ApiError;
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
const REPLAY_BATCH: usize = 500;

fn to_sse_event(event: &DomainEvent) -> Result<SseEvent, Infallible> {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "null".to_string());
    Ok(SseEvent::default()
        .event(event.event_type.as_str())
        .id(event.sequence.to_string())
        .data(data))
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text(": ping")
}

fn connected_comment() -> Result<SseEvent, Infallible> {
    Ok(SseEvent::default().comment("connected"))
}

/// `host:port` authority for domain matching, mirroring JS `URL.host` (which
/// includes a non-default port) rather than `URL.hostname`. Two sessions on
/// the same host but different ports must be distinguishable by a caller
/// subscribing with `domain=host:port`.
fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

fn last_event_id(headers: &HeaderMap) -> u64 {
    headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Replay the backlog, then forward live events, without a gap or a
/// duplicate. The receiver was subscribed *before* the replay query ran, so
/// any event published during that query is both in the replay result and
/// waiting in the channel; dropping live events whose sequence is no greater
/// than the last replayed sequence removes exactly those duplicates.
/// `handle` is moved into the returned stream so the subscription stays
/// alive until the stream itself is dropped (client disconnect).
fn replay_then_live(
    replay: Vec<DomainEvent>,
    live: Receiver<DomainEvent>,
    handle: SubscriptionHandle,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    let max_replayed = replay.last().map(|e| e.sequence).unwrap_or(0);
    let replay_stream = stream::iter(replay);

    let live_stream = ReceiverStream::new(live)
        .filter(move |event| {
            let keep = event.sequence > max_replayed;
            async move { keep }
        })
        .map(move |event| {
            let _keep_alive = &handle;
            event
        });

    replay_stream.chain(live_stream).map(|event| to_sse_event(&event))
}

pub async fn session_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if state.store.get_session(&session_id).await?.is_none() {
        return Err(ApiError::from(CoreError::not_found("session", session_id)));
    }

    let bus = state.store.bus().clone();
    let (handle, live) = bus.subscribe_session(session_id.clone());
    let since = last_event_id(&headers);
    let replay = bus.replay_since(&session_id, since, REPLAY_BATCH).await?;

    let connected = stream::once(async { connected_comment() });
    let stream = connected.chain(replay_then_live(replay, live, handle));

    Ok(Sse::new(stream).keep_alive(keep_alive()))
}

#[derive(Deserialize)]
pub struct DomainQuery {
    pub domain: Option<String>,
}

/// No replay: the per-domain stream has no single owning session to query a
/// backlog for, so it is live-only from the moment of subscription, exactly
/// like `subscribe()` on the bus itself.
pub async fn domain_events(
    State(state): State<AppState>,
    Query(query): Query<DomainQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let Some(domain) = query.domain.filter(|d| !d.is_empty()) else {
        return Err(ApiError::from(CoreError::validation(
            "domain query parameter is required",
        )));
    };

    let bus = state.store.bus().clone();
    let (handle, live) = bus.subscribe();
    let store = state.store.clone();

    let filtered = ReceiverStream::new(live).filter_map(move |event| {
        let store = store.clone();
        let domain = domain.clone();
        async move {
            let session = store.get_session(&event.session_id).await.ok().flatten()?;
            let session_authority = Url::parse(&session.url).ok().and_then(|u| authority(&u))?;
            (session_authority == domain).then_some(event)
        }
    });

    let stream = filtered
        .map(move |event| {
            let _keep_alive = &handle;
            event
        })
        .map(|event| to_sse_event(&event));

    let connected = stream::once(async { connected_comment() });

    Ok(Sse::new(connected.chain(stream)).keep_alive(keep_alive()))
}
