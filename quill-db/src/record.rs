//! Row shapes as they come out of Postgres, converted into domain types
//! before they leave this crate.

use quill_common::model::{
    ModelValidationError,
    post::{MediaAsset, Post, PostStatus, Slug},
    session::Session,
    user::{User, Username},
};
use sqlx::FromRow;
use std::str::FromStr;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_id: i64,
    pub username: String,
}

/// A user row together with its password hash, for credential checks only.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct CredentialsRecord {
    pub user_id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct PostRecord {
    pub post_id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub image_url: Option<String>,
    pub image_public_id: Option<String>,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub user_id: i64,
    pub username: String,
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct SessionRecord {
    pub user_id: i64,
    pub token_hash: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_id.into(),
            username: Username::new(value.username)?,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        // Both image columns are written together; a row with only one of
        // them set has no usable asset.
        let featured_image = value
            .image_url
            .zip(value.image_public_id)
            .map(|(url, public_id)| MediaAsset { url, public_id });

        Ok(Self {
            id: value.post_id.into(),
            title: value.title,
            slug: Slug::new(value.slug)?,
            author: User {
                id: value.user_id.into(),
                username: Username::new(value.username)?,
            },
            content: value.content,
            featured_image,
            status: PostStatus::from_str(&value.status)?,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl TryFrom<SessionRecord> for Session {
    type Error = ModelValidationError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user_id.into(),
            token_hash: value.token_hash.into_boxed_slice().try_into()?,
            created_at: value.created_at,
            expires_at: value.expires_at,
        })
    }
}
