use crate::server::{Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use quill_common::{
    form::SignupForm,
    model::{
        Id,
        session::{Session, SessionToken, hash_password, verify_password},
        user::{User, UserMarker},
    },
};
use quill_db::client::{DbClient, DbError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Sessions issued at signup/login expire after this long.
const SESSION_TTL: Duration = Duration::days(30);

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(signup)
        .typed_post(login)
        .typed_post(logout)
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct SessionResponse {
    token: String,
    user: User,
}

async fn issue_session(db: &DbClient, user_id: Id<UserMarker>) -> Result<String> {
    let token = SessionToken::generate_random(user_id);
    let now = OffsetDateTime::now_utc();

    let session = Session {
        user: user_id,
        token_hash: token.hash()?,
        created_at: now,
        expires_at: Some(now + SESSION_TTL),
    };
    db.create_session(&session).await?;

    Ok(token.as_token_str())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/signup", rejection(ServerError))]
struct SignupPath();

/// Creates the account and logs it straight in: the response already
/// carries a usable session token.
async fn signup(
    SignupPath(): SignupPath,
    State(db): State<Arc<DbClient>>,
    Json(form): Json<SignupForm>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let valid = form.validate().map_err(ServerError::InvalidSignup)?;
    let password_hash = hash_password(&valid.password)?;

    let user = db
        .create_user(&valid.username, &password_hash)
        .await
        .map_err(|err| match err {
            DbError::UniqueViolation => ServerError::UsernameTaken(valid.username.clone()),
            other => other.into(),
        })?;

    let token = issue_session(&db, user.id).await?;

    Ok((StatusCode::CREATED, Json(SessionResponse { token, user })))
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/login", rejection(ServerError))]
struct LoginPath();

async fn login(
    LoginPath(): LoginPath,
    State(db): State<Arc<DbClient>>,
    Json(form): Json<LoginForm>,
) -> Result<Json<SessionResponse>> {
    let credentials = db
        .fetch_credentials(&form.username)
        .await?
        .ok_or(ServerError::IncorrectCredentials)?;

    if !verify_password(&form.password, &credentials.password_hash)? {
        return Err(ServerError::IncorrectCredentials);
    }

    let token = issue_session(&db, credentials.user.id).await?;

    Ok(Json(SessionResponse {
        token,
        user: credentials.user,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/logout", rejection(ServerError))]
struct LogoutPath();

/// Revokes the session the request authenticated with.
async fn logout(
    LogoutPath(): LogoutPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    db.delete_session(user.token_hash()).await?;

    Ok(StatusCode::NO_CONTENT)
}
