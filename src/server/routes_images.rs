//! Image upload, listing, deletion and raw serving routes.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use pixshare_common::{format_bytes, ImageId};
use pixshare_db::models::ImageRecord;
use serde::{Deserialize, Serialize};

use super::auth::CurrentUser;
use super::{ApiError, AppContext};

/// Public raw image route.
pub fn raw_routes() -> Router<AppContext> {
    Router::new().route("/images/:image_id/raw", get(serve_raw))
}

/// Authenticated image management routes, nested under `/api`.
pub fn image_routes() -> Router<AppContext> {
    Router::new()
        .route("/images", post(upload).get(list_images))
        .route("/images/url", post(upload_from_url))
        .route("/images/:image_id", delete(delete_image))
}

/// URL serving the stored payload.
pub fn image_url(base_url: &str, id: ImageId) -> String {
    format!("{}/images/{}/raw", base_url, id)
}

/// URL of the share page.
pub fn share_url(base_url: &str, id: ImageId) -> String {
    format!("{}/share/{}", base_url, id)
}

/// Summary returned to API clients by the share endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareSummary {
    pub id: ImageId,
    pub name: String,
    pub url: String,
    pub size: u64,
    pub formatted_size: String,
    pub upload_number: u32,
    pub created_at: DateTime<Utc>,
}

impl ShareSummary {
    pub fn from_record(record: &ImageRecord, base_url: &str) -> Self {
        Self {
            id: record.id,
            name: record.file_name.clone(),
            url: image_url(base_url, record.id),
            size: record.byte_size,
            formatted_size: format_bytes(record.byte_size),
            upload_number: record.upload_number,
            created_at: record.created_at,
        }
    }
}

/// Gallery entry: the share summary plus display metadata.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    #[serde(flatten)]
    pub summary: ShareSummary,
    pub share_url: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl ImageView {
    pub fn from_record(record: &ImageRecord, base_url: &str) -> Self {
        Self {
            summary: ShareSummary::from_record(record, base_url),
            share_url: share_url(base_url, record.id),
            mime_type: record.mime_type.clone(),
            width: record.width,
            height: record.height,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Original file name; defaults to "image".
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UrlUploadRequest {
    pub url: String,
}

fn parse_image_id(raw: &str) -> Result<ImageId, ApiError> {
    raw.parse::<ImageId>()
        .map_err(|_| ApiError::not_found("Image not found"))
}

/// Serve the stored payload with its MIME type.
///
/// Payloads never change once stored, so they are cached indefinitely.
async fn serve_raw(
    State(ctx): State<AppContext>,
    Path(image_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_image_id(&image_id)?;
    let record = ctx.images.get(id)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, record.mime_type),
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000, immutable".to_string(),
            ),
        ],
        record.payload,
    ))
}

/// Upload raw image bytes from the request body.
async fn upload(
    State(ctx): State<AppContext>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("Request body is empty"));
    }

    let name = query.name.unwrap_or_default();
    let record = ctx
        .images
        .upload(current.user.id, &name, body.to_vec())
        .await?;

    let view = ImageView::from_record(&record, ctx.config.server.base_url());
    Ok((StatusCode::CREATED, Json(view)))
}

/// Download an image from a URL and store it.
async fn upload_from_url(
    State(ctx): State<AppContext>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<UrlUploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = ctx
        .images
        .upload_from_url(current.user.id, &payload.url)
        .await?;

    let view = ImageView::from_record(&record, ctx.config.server.base_url());
    Ok((StatusCode::CREATED, Json(view)))
}

/// The caller's images, newest first.
async fn list_images(
    State(ctx): State<AppContext>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<ImageView>>, ApiError> {
    let base_url = ctx.config.server.base_url();
    let views = ctx
        .images
        .list_for_owner(current.user.id)?
        .iter()
        .map(|record| ImageView::from_record(record, base_url))
        .collect();

    Ok(Json(views))
}

/// Delete one of the caller's images (any image for admins).
async fn delete_image(
    State(ctx): State<AppContext>,
    Extension(current): Extension<CurrentUser>,
    Path(image_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_image_id(&image_id)?;
    ctx.images.delete(id, current.requester())?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixshare_common::UserId;

    fn record() -> ImageRecord {
        ImageRecord {
            id: ImageId::new(),
            owner_id: UserId::new(),
            file_name: "sunset.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            byte_size: 1536,
            width: 640,
            height: 480,
            upload_number: 7,
            payload: vec![0; 1536],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_image_view_json_shape() {
        let record = record();
        let json =
            serde_json::to_value(ImageView::from_record(&record, "https://pix.example")).unwrap();

        assert_eq!(json["id"], record.id.to_string());
        assert_eq!(json["name"], "sunset.jpg");
        assert_eq!(
            json["url"],
            format!("https://pix.example/images/{}/raw", record.id)
        );
        assert_eq!(
            json["shareUrl"],
            format!("https://pix.example/share/{}", record.id)
        );
        assert_eq!(json["size"], 1536);
        assert_eq!(json["formattedSize"], "1.5 KB");
        assert_eq!(json["uploadNumber"], 7);
        assert_eq!(json["mimeType"], "image/jpeg");
        assert_eq!(json["width"], 640);
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn test_bad_id_is_not_found() {
        let err = parse_image_id("not-a-uuid").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
