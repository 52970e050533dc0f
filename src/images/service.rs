//! Image service coordinating the encoder with the record store.
//!
//! Provides the upload paths (raw bytes and URL download) and the
//! owner-scoped read and delete operations used by the HTTP layer.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use pixshare_common::{Error, ImageId, UserId};
use pixshare_db::models::{ImageRecord, NewImage, StorageStats};

use super::encoder::{encode_for_inline, EncodeError, EncoderPolicy};
use super::store::ImageStore;
use crate::config::UploadConfig;

const MAX_FILE_NAME_LEN: usize = 255;
const MAX_REDIRECTS: usize = 5;

/// Errors from the upload paths.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Store(#[from] Error),

    /// The remote image could not be downloaded.
    #[error("Failed to fetch image: {0}")]
    Fetch(String),
}

/// Who is asking, for ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
    pub is_admin: bool,
}

/// High-level image service shared by all handlers.
pub struct ImageService {
    store: Arc<dyn ImageStore>,
    policy: EncoderPolicy,
    upload: UploadConfig,
    http: reqwest::Client,
}

impl ImageService {
    /// Create a new `ImageService`.
    ///
    /// # Arguments
    ///
    /// * `store` - Record store for image records
    /// * `policy` - Encoder thresholds applied to every upload
    /// * `upload` - Upload size and download limits
    pub fn new(
        store: Arc<dyn ImageStore>,
        policy: EncoderPolicy,
        upload: UploadConfig,
    ) -> pixshare_common::Result<Self> {
        // Redirects are followed by hand so every hop passes the host check
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            store,
            policy,
            upload,
            http,
        })
    }

    /// Encode and persist an uploaded image.
    ///
    /// Encoding runs on the blocking pool. Nothing is written unless the
    /// encoder succeeds, so a failed upload never leaves a partial record.
    pub async fn upload(
        &self,
        owner: UserId,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<ImageRecord, UploadError> {
        if data.len() > self.upload.max_upload_bytes {
            return Err(EncodeError::PayloadTooLarge {
                size: data.len() as u64,
                limit: self.upload.max_upload_bytes as u64,
            }
            .into());
        }

        let input_bytes = data.len();
        let policy = self.policy.clone();
        let encoded = tokio::task::spawn_blocking(move || encode_for_inline(&data, &policy))
            .await
            .map_err(|e| Error::internal(format!("Encoder task failed: {}", e)))??;

        let record = self.store.put(NewImage {
            owner_id: owner,
            file_name: sanitize_file_name(file_name),
            mime_type: encoded.mime_type,
            width: encoded.width,
            height: encoded.height,
            payload: encoded.bytes,
        })?;

        tracing::info!(
            image_id = %record.id,
            owner = %owner,
            input_bytes,
            stored_bytes = record.byte_size,
            reencoded = encoded.tier.is_some(),
            "Stored image"
        );

        Ok(record)
    }

    /// Download an image from a URL and store it.
    ///
    /// Only `http` and `https` URLs are accepted, and unless
    /// `allow_private_hosts` is set every hop must resolve to a public
    /// address. The body is read in chunks and abandoned as soon as it
    /// passes `max_upload_bytes`. The file name is the last non-empty path
    /// segment of the URL.
    pub async fn upload_from_url(&self, owner: UserId, url: &str) -> Result<ImageRecord, UploadError> {
        let parsed = reqwest::Url::parse(url.trim())
            .map_err(|e| Error::invalid_input(format!("Invalid URL: {}", e)))?;
        ensure_http_scheme(&parsed)?;

        let file_name = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or_default()
            .to_string();

        let mut response = self.fetch(parsed).await?;

        let limit = self.upload.max_upload_bytes;
        let too_large = |size: u64| EncodeError::PayloadTooLarge {
            size,
            limit: limit as u64,
        };

        if let Some(len) = response.content_length() {
            if len > limit as u64 {
                return Err(too_large(len).into());
            }
        }

        let mut data = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| UploadError::Fetch(e.to_string()))?
        {
            let received = data.len() + chunk.len();
            if received > limit {
                tracing::debug!(url = %response.url(), received, limit, "Abandoned oversized download");
                return Err(too_large(received as u64).into());
            }
            data.extend_from_slice(&chunk);
        }

        tracing::debug!(url = %response.url(), bytes = data.len(), "Downloaded image");

        self.upload(owner, &file_name, data).await
    }

    /// GET `url`, following up to `MAX_REDIRECTS` redirects.
    async fn fetch(&self, mut url: reqwest::Url) -> Result<reqwest::Response, UploadError> {
        let timeout = Duration::from_secs(self.upload.fetch_timeout_secs);

        for _ in 0..=MAX_REDIRECTS {
            if !self.upload.allow_private_hosts {
                ensure_public_host(&url).await?;
            }

            let response = self
                .http
                .get(url.clone())
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| UploadError::Fetch(e.to_string()))?;

            if !response.status().is_redirection() {
                return response
                    .error_for_status()
                    .map_err(|e| UploadError::Fetch(e.to_string()));
            }

            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| UploadError::Fetch("Redirect without a Location header".to_string()))?;
            url = url
                .join(location)
                .map_err(|e| UploadError::Fetch(format!("Invalid redirect target: {}", e)))?;
            ensure_http_scheme(&url)?;
        }

        Err(UploadError::Fetch("Too many redirects".to_string()))
    }

    pub fn get(&self, id: ImageId) -> pixshare_common::Result<ImageRecord> {
        self.store.get(id)
    }

    /// The owner's images, newest first.
    pub fn list_for_owner(&self, owner: UserId) -> pixshare_common::Result<Vec<ImageRecord>> {
        self.store.list_for_owner(owner)
    }

    /// Delete an image. Admins may delete any image, everyone else only
    /// their own.
    pub fn delete(&self, id: ImageId, requester: Requester) -> pixshare_common::Result<()> {
        let owner = (!requester.is_admin).then_some(requester.user_id);
        self.store.delete(id, owner)?;
        tracing::info!(image_id = %id, by = %requester.user_id, "Deleted image");
        Ok(())
    }

    pub fn stats(&self) -> pixshare_common::Result<StorageStats> {
        self.store.stats()
    }
}

fn ensure_http_scheme(url: &reqwest::Url) -> Result<(), Error> {
    if matches!(url.scheme(), "http" | "https") {
        Ok(())
    } else {
        Err(Error::invalid_input("Only http and https URLs are supported"))
    }
}

/// Resolve the URL's host and reject it if any address is not public.
async fn ensure_public_host(url: &reqwest::Url) -> Result<(), UploadError> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::invalid_input("URL has no host"))?
        .trim_start_matches('[')
        .trim_end_matches(']');
    let port = url.port_or_known_default().unwrap_or(80);

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| UploadError::Fetch(format!("Could not resolve {}: {}", host, e)))?;

    for addr in addrs {
        if !is_public_address(addr.ip()) {
            tracing::warn!(host, addr = %addr.ip(), "Refused URL upload to non-public address");
            return Err(Error::invalid_input(format!("{} is not a public address", host)).into());
        }
    }

    Ok(())
}

fn is_public_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => {
                let first = v6.segments()[0];
                !(v6.is_loopback()
                    || v6.is_unspecified()
                    || v6.is_multicast()
                    || (first & 0xfe00) == 0xfc00
                    || (first & 0xffc0) == 0xfe80)
            }
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        || a == 0
        || (a == 100 && (64..128).contains(&b)))
}

/// Strip any directory part and control characters; empty names become
/// `"image"`.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILE_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}
