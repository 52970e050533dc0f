//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a config and the
//! full [`AppContext`], and drives the router with `oneshot`.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use pixshare::config::Config;
use pixshare::images::ImageStore;
use pixshare::server::{create_router, AppContext};
use pixshare_common::{Error, ImageId, Result, UserId};
use pixshare_db::models::{ImageRecord, NewImage, StorageStats, User};
use pixshare_db::pool::{init_memory_pool, DbPool};
use pixshare_db::queries::{auth_tokens, users};
use tower::ServiceExt;

/// Test harness wrapping an [`AppContext`] backed by an in-memory database.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let ctx = AppContext::new(config, db.clone()).expect("failed to create context");
        Self { ctx, db }
    }

    /// Harness whose image store is replaced by `store`.
    pub fn with_store(store: Arc<dyn ImageStore>) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let ctx = AppContext::with_store(Config::default(), db.clone(), store)
            .expect("failed to create context");
        Self { ctx, db }
    }

    /// Send one request through a fresh router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        create_router(self.ctx.clone())
            .oneshot(request)
            .await
            .unwrap()
    }

    /// Insert a user with a known password and return a bearer token for it.
    pub fn user_with_token(&self, username: &str, is_admin: bool) -> (User, String) {
        let conn = self.db.get().unwrap();
        let hash = bcrypt::hash("password123", 4).unwrap();
        let user = users::create_user(&conn, username, &hash, is_admin).unwrap();
        let token = format!("token-{}", username);
        auth_tokens::create_token(&conn, user.id, &token).unwrap();
        (user, token)
    }

    /// Upload `data` as `owner` through the API and return the response JSON.
    pub async fn upload(&self, token: &str, name: &str, data: Vec<u8>) -> serde_json::Value {
        let response = self
            .send(
                Request::post(format!("/api/images?name={}", name))
                    .header("authorization", format!("Bearer {}", token))
                    .header("content-type", "application/octet-stream")
                    .body(Body::from(data))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), 201, "upload failed");
        body_json(response).await
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// A small PNG that passes through the encoder unchanged.
pub fn small_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Store whose every operation fails with a fixed error.
pub struct FailingStore {
    pub kind: fn() -> Error,
}

impl ImageStore for FailingStore {
    fn get(&self, _id: ImageId) -> Result<ImageRecord> {
        Err((self.kind)())
    }

    fn put(&self, _image: NewImage) -> Result<ImageRecord> {
        Err((self.kind)())
    }

    fn delete(&self, _id: ImageId, _owner: Option<UserId>) -> Result<()> {
        Err((self.kind)())
    }

    fn list_for_owner(&self, _owner: UserId) -> Result<Vec<ImageRecord>> {
        Err((self.kind)())
    }

    fn stats(&self) -> Result<StorageStats> {
        Err((self.kind)())
    }
}
