//! Account registration, login and bearer-token authentication.

use crate::images::Requester;
use crate::server::{ApiError, AppContext};
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeader,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use pixshare_common::UserId;
use pixshare_db::models::User;
use pixshare_db::pool::get_conn;
use pixshare_db::queries::{auth_tokens, users};
use serde::{Deserialize, Serialize};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 32;

/// Routes reachable without a token.
pub fn public_routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

/// Routes that act on the caller's own session.
pub fn session_routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
}

/// The authenticated caller, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub is_admin: bool,
    pub token: String,
}

impl CurrentUser {
    pub fn requester(&self) -> Requester {
        Requester {
            user_id: self.user.id,
            is_admin: self.is_admin,
        }
    }

    fn view(&self) -> UserView {
        UserView {
            id: self.user.id,
            username: self.user.username.clone(),
            is_admin: self.is_admin,
            created_at: self.user.created_at,
        }
    }
}

fn user_view(ctx: &AppContext, user: &User) -> UserView {
    UserView {
        id: user.id,
        username: user.username.clone(),
        is_admin: is_admin(ctx, user),
        created_at: user.created_at,
    }
}

fn is_admin(ctx: &AppContext, user: &User) -> bool {
    user.is_admin || ctx.config.auth.is_admin_username(&user.username)
}

/// Reject requests without a valid, unexpired bearer token.
pub async fn require_auth(
    State(ctx): State<AppContext>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return Err(ApiError::unauthorized());
    };
    let token = bearer.token();

    let conn = get_conn(&ctx.db_pool)?;
    let Some((auth_token, user)) = auth_tokens::get_token_with_user(&conn, token)? else {
        return Err(ApiError::unauthorized());
    };

    let ttl = Duration::hours(ctx.config.auth.token_ttl_hours as i64);
    if Utc::now() - auth_token.last_activity > ttl {
        tracing::debug!(user = %user.username, "Token expired");
        auth_tokens::delete_token(&conn, token)?;
        return Err(ApiError::unauthorized());
    }

    auth_tokens::update_token_activity(&conn, token)?;
    drop(conn);

    let current = CurrentUser {
        is_admin: is_admin(&ctx, &user),
        user,
        token: token.to_string(),
    };
    request.extensions_mut().insert(current);

    Ok(next.run(request).await)
}

/// Must run inside [`require_auth`].
pub async fn require_admin(
    Extension(current): Extension<CurrentUser>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if !current.is_admin {
        return Err(ApiError::forbidden("Admin access required"));
    }
    Ok(next.run(request).await)
}

/// Create an account
async fn register(
    State(ctx): State<AppContext>,
    Json(payload): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    if !ctx.config.auth.allow_registration {
        return Err(ApiError::forbidden("Registration is disabled"));
    }

    let username = payload.username.trim();
    validate_username(username)?;
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let hash = hash_password(&payload.password)
        .map_err(|e| pixshare_common::Error::internal(e.to_string()))?;

    let conn = get_conn(&ctx.db_pool)?;
    let user = users::create_user(&conn, username, &hash, false)?;

    tracing::info!(user = %user.username, "Registered user");

    Ok((StatusCode::CREATED, Json(user_view(&ctx, &user))))
}

/// Exchange credentials for a bearer token
async fn login(
    State(ctx): State<AppContext>,
    Json(payload): Json<Credentials>,
) -> Result<Json<LoginResponse>, ApiError> {
    let conn = get_conn(&ctx.db_pool)?;

    let user = users::get_user_by_username(&conn, payload.username.trim())?
        .filter(|user| bcrypt::verify(&payload.password, &user.password_hash).unwrap_or(false))
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid credentials",
            )
        })?;

    let token = auth_tokens::create_token(&conn, user.id, &generate_token())?;

    tracing::info!(user = %user.username, "User logged in");

    Ok(Json(LoginResponse {
        token: token.token,
        user: user_view(&ctx, &user),
    }))
}

/// Revoke the token used for this request
async fn logout(
    State(ctx): State<AppContext>,
    Extension(current): Extension<CurrentUser>,
) -> Result<StatusCode, ApiError> {
    let conn = get_conn(&ctx.db_pool)?;
    auth_tokens::delete_token(&conn, &current.token)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(Extension(current): Extension<CurrentUser>) -> Json<UserView> {
    Json(current.view())
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if username.is_empty() || username.len() > MAX_USERNAME_LEN || !valid_chars {
        return Err(ApiError::bad_request(format!(
            "Username must be 1-{} characters of letters, digits, '_', '-' or '.'",
            MAX_USERNAME_LEN
        )));
    }
    Ok(())
}

/// Generate a bcrypt password hash
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

/// Generate a random bearer token
pub fn generate_token() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    URL_SAFE_NO_PAD.encode(bytes)
}
