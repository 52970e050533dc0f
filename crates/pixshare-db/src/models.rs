//! Internal Rust models matching the database schema.
//!
//! This module provides strongly-typed Rust structures that map to database tables.
//! All models use the typed IDs from pixshare-common.

use chrono::{DateTime, Utc};
use pixshare_common::{ImageId, UserId};
use serde::{Deserialize, Serialize};

/// User account model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Bearer token issued at login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthToken {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// A stored image together with its inline payload.
///
/// `byte_size` always equals `payload.len()`; the store derives it from the
/// payload at insert time and never accepts it from callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: ImageId,
    pub owner_id: UserId,
    pub file_name: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    /// 1-based position of this upload among the owner's uploads.
    pub upload_number: u32,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the uploader when creating an image record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub owner_id: UserId,
    pub file_name: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub payload: Vec<u8>,
}

/// Aggregate storage usage across all images.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageStats {
    pub total_size: u64,
    pub file_count: u64,
}
