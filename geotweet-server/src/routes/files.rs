//! Static front-end files
//!
//! `/` redirects to `/index.html`; every other unmatched path is served from
//! the web root. File responses carry `Last-Modified` and honor
//! `If-Modified-Since`, with a short revalidating cache lifetime. Missing
//! files get an HTML 404 page built from the web root's `404.html`.

use std::path::{Path, PathBuf};

use axum::{
    handler::HandlerWithoutStateExt,
    http::{header, HeaderValue, StatusCode, Uri},
    middleware,
    response::{Html, Redirect, Response},
    routing::get,
    Router,
};
use tower_http::services::ServeDir;

use crate::state::AppState;

const CACHE_CONTROL: &str = "max-age=5, must-revalidate";

const FALLBACK_404: &str =
    "<html><body><h1>404 Not Found: %%REQUESTPATH%%</h1></body></html>";

/// GET / - temporary redirect to the map page
async fn home() -> Redirect {
    Redirect::temporary("/index.html")
}

async fn cache_control(mut response: Response) -> Response {
    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_MODIFIED {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    }
    response
}

/// Render the 404 page for `path`, HTML-escaped.
pub async fn not_found_page(web_root: &Path, path: &str) -> Html<String> {
    let template = match tokio::fs::read_to_string(web_root.join("404.html")).await {
        Ok(template) => template,
        Err(e) => {
            tracing::debug!(error = %e, "no 404.html in web root, using built-in page");
            FALLBACK_404.to_string()
        }
    };
    Html(template.replace("%%REQUESTPATH%%", &escape_html(path)))
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Static file routes. The file service is installed as the router's
/// fallback, so it must be merged last.
pub fn router(web_root: impl Into<PathBuf>) -> Router<AppState> {
    let web_root = web_root.into();

    let missing_root = web_root.clone();
    let missing = move |uri: Uri| {
        let web_root = missing_root.clone();
        async move {
            tracing::debug!(path = %uri.path(), "404");
            not_found_page(&web_root, uri.path()).await
        }
    };

    let files = ServeDir::new(web_root).not_found_service(missing.into_service());

    Router::new()
        .route("/", get(home))
        .fallback_service(files)
        .layer(middleware::map_response(cache_control))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("/<script>alert('x')</script>&"),
            "/&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;&amp;"
        );
        assert_eq!(escape_html("/plain/path.html"), "/plain/path.html");
    }

    #[tokio::test]
    async fn missing_template_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let Html(page) = not_found_page(dir.path(), "/a&b").await;
        assert_eq!(
            page,
            "<html><body><h1>404 Not Found: /a&amp;b</h1></body></html>"
        );
    }
}
