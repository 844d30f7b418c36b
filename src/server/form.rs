//! `POST /upload_opml` request body.
//!
//! Browsers submit the upload form as `multipart/form-data`; scripted clients
//! that only pass a URL may send `application/x-www-form-urlencoded`. Both
//! decode into the same [`UploadForm`].

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Form,
};
use serde::Deserialize;
use std::num::NonZeroUsize;

use crate::error::AppError;
use crate::service::{OpmlSource, TimelineRequest};

/// Largest page served unless configured otherwise.
pub const MAX_LIMIT: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(n) => n,
    None => unreachable!(),
};

/// Page size bounds applied to the `limit` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default: NonZeroUsize,
    pub max: NonZeroUsize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default: crate::feed::DEFAULT_LIMIT,
            max: MAX_LIMIT,
        }
    }
}

/// Raw form fields. Empty strings are already folded into `None`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UploadForm {
    pub file: Option<Vec<u8>>,
    pub url: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UrlEncodedFields {
    url: Option<String>,
    cursor: Option<String>,
    limit: Option<String>,
}

impl UploadForm {
    /// Validates the fields into a service request.
    ///
    /// An uploaded file takes precedence over a URL. `limit` above the
    /// configured maximum is clamped rather than rejected.
    pub fn into_request(self, limits: PageLimits) -> Result<TimelineRequest, AppError> {
        let cursor = self.cursor.as_deref().map(parse_cursor).transpose()?;
        let limit = match self.limit.as_deref() {
            Some(raw) => parse_limit(raw)?,
            None => limits.default,
        }
        .min(limits.max);

        let source = match (self.file, self.url) {
            (Some(bytes), _) => Some(OpmlSource::Upload(bytes)),
            (None, Some(url)) => Some(OpmlSource::Url(url)),
            (None, None) => None,
        };

        Ok(TimelineRequest {
            source,
            cursor,
            limit,
        })
    }
}

fn parse_cursor(raw: &str) -> Result<f64, AppError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|c| c.is_finite())
        .ok_or_else(|| {
            AppError::BadRequest(format!("Invalid cursor '{raw}': expected a Unix timestamp"))
        })
}

fn parse_limit(raw: &str) -> Result<NonZeroUsize, AppError> {
    raw.trim().parse::<NonZeroUsize>().map_err(|_| {
        AppError::BadRequest(format!("Invalid limit '{raw}': expected a positive integer"))
    })
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[async_trait]
impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let Some(content_type) = content_type else {
            // Bodyless POST: nothing was submitted
            return Ok(UploadForm::default());
        };

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            read_multipart(multipart).await
        } else {
            let Form(fields) = Form::<UrlEncodedFields>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(UploadForm {
                file: None,
                url: fields.url.and_then(non_empty),
                cursor: fields.cursor.and_then(non_empty),
                limit: fields.limit.and_then(non_empty),
            })
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let bad_field = |e: axum::extract::multipart::MultipartError| AppError::BadRequest(e.body_text());
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_field)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                // A file input left empty still sends a part, without a filename
                let named = field.file_name().is_some_and(|n| !n.is_empty());
                let bytes = field.bytes().await.map_err(bad_field)?;
                if named || !bytes.is_empty() {
                    form.file = Some(bytes.to_vec());
                }
            }
            "url" => form.url = non_empty(field.text().await.map_err(bad_field)?),
            "cursor" => form.cursor = non_empty(field.text().await.map_err(bad_field)?),
            "limit" => form.limit = non_empty(field.text().await.map_err(bad_field)?),
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}
