//! Pixshare-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across pixshare:
//!
//! - **Typed IDs**: Type-safe UUID wrappers for users and images
//! - **Formatting**: Human readable byte sizes and timestamps
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use pixshare_common::{format::format_bytes, Error, ImageId, Result};
//!
//! let image_id = ImageId::new();
//! assert!(!image_id.to_string().is_empty());
//!
//! assert_eq!(format_bytes(1536), "1.5 KB");
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("image"))
//! }
//! assert!(example().is_err());
//! ```

pub mod error;
pub mod format;
pub mod ids;

pub use error::{Error, Result};
pub use format::{format_bytes, format_timestamp};
pub use ids::*;
