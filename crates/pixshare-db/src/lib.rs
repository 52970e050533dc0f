//! Pixshare-DB: Database schema, migrations, and query operations
//!
//! This crate provides the single persistence backend for pixshare using
//! SQLite with rusqlite and r2d2 connection pooling. Image payloads are
//! stored inline as BLOBs next to their metadata.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching database schema
//! - `queries` - Database query operations
//!
//! # Example
//!
//! ```no_run
//! use pixshare_db::pool::{init_pool, get_conn};
//! use pixshare_db::queries::users;
//!
//! let pool = init_pool("/var/lib/pixshare/pixshare.db").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let user = users::create_user(&conn, "alice", "hash", false).unwrap();
//! println!("Created user: {}", user.username);
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
