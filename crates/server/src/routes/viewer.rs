//! `GET /` viewer page.

use axum::response::Html;

const VIEWER_HTML: &str = include_str!("../../assets/viewer.html");

pub async fn index() -> Html<&'static str> {
    Html(VIEWER_HTML)
}
