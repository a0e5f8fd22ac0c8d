use crate::media::{MediaError, MediaStore};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        multipart::MultipartError,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use quill_common::{
    form::{PostFormErrors, SignupFormErrors},
    model::{
        post::Slug,
        session::{PasswordHashError, SessionTokenDecodeError, SessionTokenHashError},
        user::Username,
    },
};
use quill_db::client::{DbClient, DbError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

mod auth;
mod json;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub media_store: Arc<dyn MediaStore>,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Incoming multipart form rejected: {0}")]
    Multipart(#[from] MultipartError),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided session token could not be decoded: {0}")]
    InvalidSessionToken(#[from] SessionTokenDecodeError),
    #[error("The session token could not be hashed: {0}")]
    SessionTokenHash(#[from] SessionTokenHashError),
    #[error("The session is unknown or expired")]
    InvalidSession,
    #[error("Incorrect username or password")]
    IncorrectCredentials,
    #[error("Post with slug {0} was not found.")]
    PostNotFound(Slug),
    #[error("A post with slug {0} already exists.")]
    SlugTaken(Slug),
    #[error("The username {} is already taken.", .0.get())]
    UsernameTaken(Username),
    #[error("The submitted post was invalid")]
    InvalidPost(PostFormErrors),
    #[error("The signup submission was invalid")]
    InvalidSignup(SignupFormErrors),
    #[error("Password hashing failed: {0}")]
    PasswordHash(#[from] PasswordHashError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Database(#[from] DbError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(rejection) if rejection.is_missing() => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::InvalidSession | ServerError::IncorrectCredentials => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::JsonRejection(_)
            | ServerError::Multipart(_)
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidSessionToken(_) => StatusCode::BAD_REQUEST,
            ServerError::SlugTaken(_) | ServerError::UsernameTaken(_) => StatusCode::CONFLICT,
            ServerError::InvalidPost(_) | ServerError::InvalidSignup(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServerError::Media(_) => StatusCode::BAD_GATEWAY,
            ServerError::JsonResponse(_)
            | ServerError::SessionTokenHash(_)
            | ServerError::PasswordHash(_)
            | ServerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<serde_json::Value>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let fields = match &self {
            ServerError::InvalidPost(errors) => serde_json::to_value(errors).ok(),
            ServerError::InvalidSignup(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        };

        let error_response = ErrorResponse {
            status: status.as_u16(),
            message: self.to_string(),
            fields,
        };
        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use crate::server::ServerError;
    use axum::http::StatusCode;
    use quill_common::{
        form::{FieldError, PostForm, PostFormErrors},
        model::post::Slug,
    };

    #[test]
    fn errors_map_to_their_statuses() {
        let not_found = ServerError::PostNotFound(Slug::derive("Gone"));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let collision = ServerError::SlugTaken(Slug::derive("Hello World"));
        assert_eq!(collision.status(), StatusCode::CONFLICT);

        let invalid = PostForm::default().validate().unwrap_err();
        assert_eq!(
            ServerError::InvalidPost(invalid).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        assert_eq!(
            ServerError::InvalidSession.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::IncorrectCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn validation_body_carries_field_errors() {
        let errors = PostFormErrors {
            title: Some(FieldError::Required),
            ..PostFormErrors::default()
        };

        let value = serde_json::to_value(&errors).unwrap();
        assert_eq!(value["title"], "This field is required");
        assert!(value.get("content").is_none());
    }
}
