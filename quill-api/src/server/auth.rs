use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use quill_common::model::{
    Id,
    session::{SessionToken, SessionTokenHash},
    user::UserMarker,
};
use quill_db::client::DbClient;
use std::sync::Arc;
use time::OffsetDateTime;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The resolved principal of a request. Handlers take this by value; there
/// is no ambient "current user" anywhere else.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
    token_hash: SessionTokenHash,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.id
    }

    /// Hash of the session the principal authenticated with, so logout can
    /// revoke exactly that session.
    #[must_use]
    pub fn token_hash(&self) -> &SessionTokenHash {
        &self.token_hash
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let request_token: SessionToken = AuthorizationHeader::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidAuthorizationHeader)?
            .token()
            .parse()?;

        let token_hash = request_token.hash()?;

        let session = Arc::<DbClient>::from_ref(state)
            .fetch_session(&token_hash)
            .await?
            .ok_or(ServerError::InvalidSession)?;

        if session.is_expired(OffsetDateTime::now_utc()) {
            return Err(ServerError::InvalidSession);
        }

        Ok(Self {
            id: session.user,
            token_hash,
        })
    }
}
