//! Broker ingress and response streaming

use crate::api::rest::state::AppState;
use crate::broker::Publication;
use crate::error::{ApiError, ApiResult};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

/// Publish a raw worker envelope onto the inbound routing key
pub async fn submit_message(State(state): State<AppState>, body: Bytes) -> ApiResult<StatusCode> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty message body".to_string()));
    }

    let context = &state.context;
    context
        .broker
        .publish(
            &context.exchange,
            &context.inbound_key,
            Publication::transient(body.to_vec()),
        )
        .await?;

    Ok(StatusCode::ACCEPTED)
}

/// Stream every worker response via SSE
pub async fn stream_responses(
    State(state): State<AppState>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let deliveries = state
        .context
        .broker
        .subscribe(&state.context.exchange, "output.worker.#")
        .await?;

    let stream = deliveries.map(|delivery| {
        let data = String::from_utf8_lossy(&delivery.body).into_owned();
        Ok::<_, Infallible>(Event::default().event("response").data(data))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}
