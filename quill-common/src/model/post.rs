use crate::model::{
    Id,
    user::{User, UserMarker},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub title: String,
    pub slug: Slug,
    pub author: User,
    pub content: String,
    pub featured_image: Option<MediaAsset>,
    pub status: PostStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A validated draft ready for insertion. `created_at` and `updated_at`
/// are assigned by the database.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewPost {
    pub title: String,
    pub slug: Slug,
    pub author: Id<UserMarker>,
    pub content: String,
    pub featured_image: Option<MediaAsset>,
    pub status: PostStatus,
}

/// The mutable subset of a post. The author and `created_at` never change
/// after creation.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostChanges {
    pub title: String,
    pub slug: Slug,
    pub content: String,
    pub featured_image: Option<MediaAsset>,
    pub status: PostStatus,
}

/// Reference to an image held by the external media service: a
/// dereferenceable URL plus the service's identifier for later deletion.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct MediaAsset {
    pub url: String,
    pub public_id: String,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Unknown post status: {0}")]
pub struct UnknownStatusError(String);

impl PostStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }
}

impl FromStr for PostStatus {
    type Err = UnknownStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            other => Err(UnknownStatusError(other.to_owned())),
        }
    }
}

impl Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URL-safe post identifier: lowercase ASCII alphanumerics separated by
/// single hyphens.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Slug(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The slug is invalid: {0}")]
pub struct InvalidSlugError(String);

impl Slug {
    pub fn new(slug: String) -> Result<Self, InvalidSlugError> {
        let legal_chars = slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

        if legal_chars && !slug.starts_with('-') && !slug.ends_with('-') && !slug.contains("--") {
            Ok(Slug(slug))
        } else {
            Err(InvalidSlugError(slug))
        }
    }

    /// Canonical derivation from a title: lowercased, runs of
    /// non-alphanumeric characters collapsed to single hyphens, leading and
    /// trailing hyphens stripped.
    #[must_use]
    pub fn derive(title: &str) -> Self {
        let mut slug = String::with_capacity(title.len());

        for c in title.to_lowercase().chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c);
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }

        while slug.ends_with('-') {
            slug.pop();
        }

        Slug(slug)
    }

    /// The save rule: keep the stored slug only while it still matches the
    /// canonical derivation of the current title.
    #[must_use]
    pub fn reconcile(self, title: &str) -> Self {
        if self.0.is_empty() || Self::derive(title) != self {
            Self::derive(title)
        } else {
            self
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Slug::new(inner).map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Slug"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::post::{PostStatus, Slug};
    use std::str::FromStr;

    #[test]
    fn derivation_is_lowercase_hyphenated() {
        let cases = [
            ("Hello World", "hello-world"),
            ("Hello, World!", "hello-world"),
            ("  ---Rust 2024!!  ", "rust-2024"),
            ("already-a-slug", "already-a-slug"),
            ("CamelCase", "camelcase"),
            ("a__b", "a-b"),
            ("!!!", ""),
        ];

        for (title, expected) in cases {
            assert_eq!(Slug::derive(title).get(), expected, "{title:?}");
        }
    }

    #[test]
    fn equal_canonicalizations_collide() {
        assert_eq!(Slug::derive("Hello World"), Slug::derive("hello, world?"));
    }

    #[test]
    fn reconcile_recomputes_stale_slugs() {
        let stored = Slug::derive("Old Title");
        assert_eq!(stored.clone().reconcile("New Title"), Slug::derive("New Title"));
        assert_eq!(stored.clone().reconcile("Old Title"), stored);
    }

    #[test]
    fn reconcile_replaces_empty_slugs() {
        let empty = Slug::new(String::new()).unwrap();
        assert_eq!(empty.reconcile("Hello"), Slug::derive("Hello"));
    }

    #[test]
    fn slug_validation() {
        for legal in ["hello-world", "a", "rust-2024", ""] {
            assert!(Slug::new(legal.to_owned()).is_ok(), "{legal:?}");
        }
        for illegal in ["Hello", "-leading", "trailing-", "dou--ble", "with space", "émile"] {
            assert!(Slug::new(illegal.to_owned()).is_err(), "{illegal:?}");
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [PostStatus::Draft, PostStatus::Published] {
            assert_eq!(PostStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(PostStatus::from_str("archived").is_err());
    }
}
