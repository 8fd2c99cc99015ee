//! Version endpoint

use axum::{extract::State, routing::get, Router};

use crate::state::{AppState, VersionInfo};

/// Plain-text template for `GET /version`
pub const VERSION_TEMPLATE: &str = include_str!("../../resources/version.txt");

/// Fill the `%%VERSION%%`, `%%BUILD%%` and `%%APPLICATION%%` placeholders.
pub fn render(template: &str, info: &VersionInfo) -> String {
    template
        .replace("%%VERSION%%", &info.version)
        .replace("%%BUILD%%", &info.build)
        .replace("%%APPLICATION%%", &info.application)
}

/// GET /version
async fn version(State(state): State<AppState>) -> String {
    tracing::debug!("version requested");
    render(VERSION_TEMPLATE, state.version())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/version", get(version))
}
