use axum::{extract::State, response::Html, Json};
use serde::Serialize;

use super::form::UploadForm;
use super::AppState;
use crate::error::AppError;
use crate::feed::FeedSource;
use crate::service::TimelineResponse;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>OPML2JSON</title></head>
<body>
<h1>Welcome to the OPML2JSON Service</h1>
<p>Please upload an OPML file, provide a URL, or specify a cursor for pagination.</p>
<form action="/upload_opml" method="post" enctype="multipart/form-data">
    <label for="file">Choose an OPML file:</label>
    <input type="file" id="file" name="file" accept=".opml,.xml">
    <br><br>
    <label for="url">Or provide a URL to an OPML file:</label>
    <input type="url" id="url" name="url" placeholder="https://example.com/feeds.opml">
    <br><br>
    <label for="cursor">Cursor (Timestamp for Pagination):</label>
    <input type="text" id="cursor" name="cursor" placeholder="1698790400.0">
    <br><br>
    <label for="limit">Limit (Number of Results):</label>
    <input type="number" id="limit" name="limit" value="20" min="1">
    <br><br>
    <button type="submit">Submit</button>
</form>
</body>
</html>
"#;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /
///
/// Minimal upload form for manual use.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /upload_opml
///
/// Accepts an OPML upload or URL plus optional `cursor`/`limit`, and returns
/// one page of the merged timeline.
pub async fn upload_opml<S>(
    State(state): State<AppState<S>>,
    form: UploadForm,
) -> Result<Json<TimelineResponse>, AppError>
where
    S: FeedSource + 'static,
{
    let request = form.into_request(state.limits)?;
    tracing::debug!(
        cursor = ?request.cursor,
        limit = request.limit.get(),
        "Timeline request"
    );

    let response = state.timeline.page(request).await?;
    Ok(Json(response))
}
