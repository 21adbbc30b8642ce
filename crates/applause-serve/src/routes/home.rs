//! Landing page for visitors who open the API host in a browser.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use maud::{DOCTYPE, PreEscaped, html};

use crate::state::AppState;

const NOT_FOUND_CSS: &str = r#"
*{margin:0;padding:0;box-sizing:border-box}
body{font-family:-apple-system,BlinkMacSystemFont,"Segoe UI",Roboto,Oxygen,Ubuntu,Cantarell,"Fira Sans","Droid Sans","Helvetica Neue",sans-serif;display:flex;justify-content:center;align-items:center;min-height:100vh;background:#fff;color:#15212a;padding:1rem}
.error-message{text-align:center;margin:15px}
.error-code{color:#c5d2d9;font-size:10vw;font-weight:600;line-height:.9em;letter-spacing:-.4vw}
.error-description{color:#54666d;font-size:2.3rem;font-weight:300;line-height:1.3em}
.error-link{display:inline-block;font-size:1.4rem;line-height:1;margin:8px 0;color:#15171a}
@media(prefers-color-scheme:dark){
body{background:#15171a;color:#e0e0e8}
.error-link{color:#c5d2d9}
}
"#;

/// `GET /`: the service has no page of its own, so point readers back at
/// the blog.
pub async fn not_found_page(State(state): State<AppState>) -> Response {
    let front_page = state.config.ghost_url.as_str();

    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "404 - Page not found" }
                meta name="robots" content="noindex";
                style { (PreEscaped(NOT_FOUND_CSS)) }
            }
            body {
                main role="main" {
                    section class="error-message" {
                        h1 class="error-code" { "404" }
                        h2 class="error-description" { "Page not found" }
                        a class="error-link" href=(front_page) { "Go to the front page →" }
                    }
                }
            }
        }
    };

    (StatusCode::NOT_FOUND, markup).into_response()
}
