//! Share links that unfurl in chat apps.
//!
//! `GET /share/{id}` answers three kinds of clients from the same URL:
//! link-preview crawlers get an HTML page carrying Open Graph and Twitter
//! Card tags, browsers are redirected to the raw image, and everything else
//! gets a JSON summary. Crawlers must be detected before the redirect
//! because they read the meta tags of the page they fetched and do not
//! follow redirects to images.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use maud::{html, Markup, DOCTYPE};
use pixshare_common::{format_bytes, format_timestamp, ImageId};
use pixshare_db::models::ImageRecord;

use super::routes_images::{image_url, share_url, ShareSummary};
use super::{ApiError, AppContext};
use crate::config::{ServerConfig, ShareConfig};

const SHARE_CACHE_CONTROL: &str = "public, max-age=3600";

pub fn share_routes() -> Router<AppContext> {
    Router::new()
        .route("/share", get(missing_id))
        .route("/share/", get(missing_id))
        .route("/share/:id", get(share))
}

/// How a share request will be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareResponse {
    PreviewPage,
    Redirect,
    Summary,
}

impl ShareResponse {
    pub fn classify(headers: &HeaderMap, crawler_agents: &[String]) -> Self {
        let user_agent = header_str(headers, header::USER_AGENT);
        let accept = header_str(headers, header::ACCEPT);

        if is_crawler(user_agent, crawler_agents) {
            Self::PreviewPage
        } else if accepts_html(accept) {
            Self::Redirect
        } else {
            Self::Summary
        }
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> &str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// Case-insensitive substring match against the crawler list.
pub fn is_crawler(user_agent: &str, crawler_agents: &[String]) -> bool {
    if user_agent.is_empty() {
        return false;
    }
    let user_agent = user_agent.to_ascii_lowercase();
    crawler_agents
        .iter()
        .any(|agent| user_agent.contains(&agent.to_ascii_lowercase()))
}

pub fn accepts_html(accept: &str) -> bool {
    accept.to_ascii_lowercase().contains("text/html")
}

async fn missing_id() -> ApiError {
    ApiError::bad_request("Invalid image ID")
}

async fn share(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::bad_request("Invalid image ID"));
    }

    // Malformed ids cannot name a record
    let image_id = id
        .parse::<ImageId>()
        .map_err(|_| ApiError::not_found("Image not found"))?;
    let record = ctx.images.get(image_id)?;

    let server = &ctx.config.server;
    let base_url = server.base_url();
    let outcome = ShareResponse::classify(&headers, &ctx.config.share.crawler_agents);

    tracing::debug!(image_id = %record.id, ?outcome, "Share link requested");

    let response = match outcome {
        ShareResponse::PreviewPage => {
            let page = render_preview(&record, server, &ctx.config.share);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                    (header::CACHE_CONTROL, SHARE_CACHE_CONTROL),
                ],
                page.into_string(),
            )
                .into_response()
        }
        ShareResponse::Redirect => (
            StatusCode::FOUND,
            [(header::LOCATION, image_url(base_url, record.id))],
        )
            .into_response(),
        ShareResponse::Summary => Json(ShareSummary::from_record(&record, base_url)).into_response(),
    };

    Ok(response)
}

/// HTML page whose meta tags drive link previews.
pub fn render_preview(record: &ImageRecord, server: &ServerConfig, share: &ShareConfig) -> Markup {
    let base_url = server.base_url();
    let image = image_url(base_url, record.id);
    let page = share_url(base_url, record.id);
    let description = format!(
        "Upload #{} | {} | {}",
        record.upload_number,
        format_bytes(record.byte_size),
        format_timestamp(&record.created_at)
    );

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (record.file_name) " - " (server.site_name) }

                meta property="og:type" content="website";
                meta property="og:site_name" content=(server.site_name);
                meta property="og:title" content=(record.file_name);
                meta property="og:description" content=(description);
                meta property="og:url" content=(page);
                meta property="og:image" content=(image);
                meta property="og:image:type" content=(record.mime_type);
                meta property="og:image:width" content=(record.width);
                meta property="og:image:height" content=(record.height);

                meta name="twitter:card" content="summary_large_image";
                meta name="twitter:title" content=(record.file_name);
                meta name="twitter:description" content=(description);
                meta name="twitter:image" content=(image);

                @if let Some(color) = &share.theme_color {
                    meta name="theme-color" content=(color);
                }
            }
            body {
                a href=(image) {
                    img src=(image) alt=(record.file_name) width=(record.width) height=(record.height);
                }
                p { (description) }
            }
        }
    }
}
