//! Push stream: `GET /sse/{user_id}`.
//!
//! Server-sent events fed from a hub queue. The first event is `sse_hello`.
//! After that each iteration waits for the next queued payload for at most
//! the keepalive interval and sends a comment when nothing arrived. A peer
//! that goes away stops the body from being polled; dropping the stream
//! drops its [`Registration`] and closes the queue. Server shutdown ends
//! every open stream so graceful shutdown does not wait on idle clients.

use crate::handlers::AppState;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::registration::Registration;
use axum::{
    extract::{Path, State},
    http::{header, HeaderName},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
};
use futures_util::stream::{self, Stream};
use hubbub_core::{clock, PushSubscription};
use hubbub_protocol::{codec, ServerFrame};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// SSE handler.
pub async fn sse_handler(
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let keepalive = Duration::from_millis(state.config.sse.keepalive_ms);
    let metrics_guard = ConnectionMetricsGuard::new("sse");
    let (registration, subscription) = Registration::push(Arc::clone(&state), &user_id);

    debug!(user = %user_id, subscriber = subscription.id(), "Push stream connected");

    let events = PushLoop {
        subscription,
        keepalive,
        shutdown: state.shutdown.subscribe(),
        greeted: false,
        _registration: registration,
        _metrics_guard: metrics_guard,
    }
    .into_stream();

    (
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    )
}

/// State of one push stream. Dropping it ends the subscription.
struct PushLoop {
    subscription: PushSubscription,
    keepalive: Duration,
    shutdown: watch::Receiver<bool>,
    greeted: bool,
    _registration: Registration,
    _metrics_guard: ConnectionMetricsGuard,
}

impl PushLoop {
    fn into_stream(self) -> impl Stream<Item = Result<Event, Infallible>> {
        stream::unfold(self, |mut push| async move {
            let event = push.next_event().await?;
            Some((Ok(event), push))
        })
    }

    /// Produce the next event, or `None` to end the stream.
    async fn next_event(&mut self) -> Option<Event> {
        if !self.greeted {
            self.greeted = true;
            return match codec::encode(&ServerFrame::sse_hello(clock::utc_now())) {
                Ok(text) => Some(Event::default().data(text)),
                Err(e) => {
                    warn!(error = %e, "Failed to encode sse_hello");
                    None
                }
            };
        }

        if *self.shutdown.borrow() {
            return None;
        }

        let subscriber = self.subscription.id();
        let next = tokio::select! {
            _ = self.shutdown.changed() => {
                debug!(subscriber, "Push stream stopped by shutdown");
                return None;
            }
            next = tokio::time::timeout(self.keepalive, self.subscription.recv()) => next,
        };

        match next {
            Ok(Some(payload)) => {
                metrics::record_message(payload.len(), "outbound");
                Some(Event::default().data(payload.as_ref()))
            }
            Ok(None) => {
                debug!(subscriber, "Push queue closed");
                None
            }
            Err(_) => {
                trace!(subscriber, "Push keepalive");
                Some(Event::default().comment(format!("keepalive {}", clock::utc_now())))
            }
        }
    }
}
