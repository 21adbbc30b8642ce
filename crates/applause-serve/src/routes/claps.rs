//! Clap endpoints used by the theme widget.

use std::sync::Arc;

use applause_core::ClapState;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, HeaderName, header};
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

/// Response header telling the widget whether the caller's clap is counted.
pub const X_HAS_CLAPPED: HeaderName = HeaderName::from_static("x-has-clapped");

/// `GET /get-claps?url=<post>`: current count and the caller's membership.
pub async fn get_claps(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let raw_url = requested_url(query.as_deref(), &headers);
    let authorization = authorization(&headers);
    let applause = Arc::clone(&state.applause);

    let clap_state =
        tokio::task::spawn_blocking(move || applause.peek(&raw_url, authorization.as_deref()))
            .await
            .map_err(|err| ApiError::Internal(anyhow::Error::new(err).context("peek task")))??;

    Ok(clap_response(clap_state))
}

/// `POST /update-claps?url=<post>`: flip the caller's clap.
pub async fn update_claps(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let raw_url = requested_url(query.as_deref(), &headers);
    let authorization = authorization(&headers);
    let applause = Arc::clone(&state.applause);

    let clap_state =
        tokio::task::spawn_blocking(move || applause.toggle(&raw_url, authorization.as_deref()))
            .await
            .map_err(|err| ApiError::Internal(anyhow::Error::new(err).context("toggle task")))??;

    Ok(clap_response(clap_state))
}

/// The post URL: the `url` query parameter, else the `Referer` header, else
/// empty (which canonicalizes to nothing and yields a zero response).
fn requested_url(query: Option<&str>, headers: &HeaderMap) -> String {
    let from_query = query.and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "url")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    });

    from_query
        .or_else(|| {
            headers
                .get(header::REFERER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        })
        .unwrap_or_default()
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn clap_response(state: ClapState) -> Response {
    let flag = if state.has_clapped { "1" } else { "0" };
    ([(X_HAS_CLAPPED, flag)], state.count.to_string()).into_response()
}
