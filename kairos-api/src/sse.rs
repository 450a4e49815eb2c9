use axum::{
    extract::{Extension, Query},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing;

use kairos_core::AppContext;

use crate::auth;
use crate::error::ApiError;
use crate::registry::ConnectionRegistry;

#[derive(Deserialize)]
pub struct EventsQuery {
    token: String,
}

/// Long-lived delivery stream for the caller.
///
/// Emits a `connected` control event first, then forwards every event
/// published on the user's channel in publish order. Keep-alive comments
/// stop intermediaries from timing the stream out. Dropping the stream
/// (client disconnect or server error) releases the registry slot via the
/// guard.
pub async fn events_handler(
    Extension(ctx): Extension<AppContext>,
    Extension(registry): Extension<Arc<ConnectionRegistry>>,
    Query(params): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let claims = auth::verify_token(&params.token, &ctx.config.server.jwt_secret)
        .map_err(|_| ApiError::unauthorized())?;

    let (guard, rx) = registry.register(&claims.user_id);

    tracing::info!(
        "Delivery stream {} opened for user {}",
        guard.id(),
        claims.user_id
    );

    let connected = Event::default().event("connected").data(
        serde_json::json!({ "connection_id": guard.id() }).to_string(),
    );

    let events = stream::once(async move { connected }).chain(stream::unfold(
        (rx, guard),
        |(mut rx, guard)| async move {
            let payload = rx.recv().await?;
            let event = Event::default().event("notification").data(payload);
            Some((event, (rx, guard)))
        },
    ));

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(ctx.config.stream.keep_alive_secs))
        .text("keep-alive");

    Ok(Sse::new(events.map(Ok::<_, Infallible>)).keep_alive(keep_alive))
}
