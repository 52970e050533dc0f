//! Admin API routes.

use axum::{extract::State, routing::get, Json, Router};
use pixshare_common::format_bytes;
use pixshare_db::pool::get_conn;
use pixshare_db::queries::users;
use serde::{Deserialize, Serialize};

use super::{ApiError, AppContext};

/// Create admin routes. Callers add the admin check.
pub fn admin_routes() -> Router<AppContext> {
    Router::new().route("/admin/stats", get(get_stats))
}

/// Storage usage across all users.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_size: u64,
    pub formatted_total_size: String,
    pub file_count: u64,
    pub user_count: u64,
}

async fn get_stats(State(ctx): State<AppContext>) -> Result<Json<StatsResponse>, ApiError> {
    let user_count = {
        let conn = get_conn(&ctx.db_pool)?;
        users::count_users(&conn)?
    };
    let stats = ctx.images.stats()?;

    Ok(Json(StatsResponse {
        total_size: stats.total_size,
        formatted_total_size: format_bytes(stats.total_size),
        file_count: stats.file_count,
        user_count,
    }))
}
