//! API route definitions.

mod claps;
mod health;
mod home;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;

pub use self::claps::X_HAS_CLAPPED;

use crate::rate_limit::enforce_rate_limit;
use crate::state::{AppState, Config};

/// Largest request body accepted. The toggle carries no body.
const MAX_BODY_BYTES: usize = 64;

/// Content-Security-Policy for everything served here. Only the 404 page is
/// HTML, and it carries nothing but an inline stylesheet.
const CSP_HEADER: &str = "default-src 'self'; base-uri 'self'; font-src 'self' https: data:; form-action 'self'; frame-ancestors 'self'; img-src 'self' data:; object-src 'none'; script-src 'self'; script-src-attr 'none'; style-src 'self' https: 'unsafe-inline'; upgrade-insecure-requests";

/// Build the complete API router.
///
/// # Route Structure
///
/// ## Not rate limited
/// - `GET /health` - Health check
///
/// ## Rate limited per client
/// - `GET /` - 404 page linking to the blog
/// - `GET /get-claps?url=` - Count plus `X-Has-Clapped`
/// - `POST /update-claps?url=` - Toggle the caller's clap (member token required)
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let limited = Router::new()
        .route("/", get(home::not_found_page))
        .route("/get-claps", get(claps::get_claps))
        .route("/update-claps", post(claps::update_claps))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_rate_limit,
        ));

    let app = Router::new()
        .route("/health", get(health::health_check))
        .merge(limited)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    with_security_headers(app).layer(cors).with_state(state)
}

/// Hardening headers sent on every response. Cross-Origin-Resource-Policy is
/// left out so the blog can read responses cross-origin.
fn security_headers() -> [(HeaderName, HeaderValue); 10] {
    [
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CSP_HEADER),
        ),
        (
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        ),
        (
            HeaderName::from_static("origin-agent-cluster"),
            HeaderValue::from_static("?1"),
        ),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
        (
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ),
        (
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
        (header::X_DNS_PREFETCH_CONTROL, HeaderValue::from_static("off")),
        (
            HeaderName::from_static("x-download-options"),
            HeaderValue::from_static("noopen"),
        ),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (
            HeaderName::from_static("x-permitted-cross-domain-policies"),
            HeaderValue::from_static("none"),
        ),
    ]
}

fn with_security_headers(router: Router<AppState>) -> Router<AppState> {
    security_headers()
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(name, value))
        })
}

/// Only the blog's own pages may call the API from a browser.
fn cors_layer(config: &Config) -> CorsLayer {
    let origin = config.allowed_origin();
    let allow_origin = match HeaderValue::from_str(&origin) {
        Ok(value) => AllowOrigin::list([value]),
        Err(err) => {
            tracing::warn!(origin = %origin, error = %err, "unusable CORS origin");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([X_HAS_CLAPPED])
}
