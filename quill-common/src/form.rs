//! Submission-side validation. Raw field values come straight from the
//! request body and are checked here before anything touches the database
//! or the media service.

use crate::model::{
    post::{PostStatus, Slug},
    session::PASSWORD_MIN_LEN,
    user::{USERNAME_MAX_LEN, Username},
};
use serde::{Deserialize, Serialize, Serializer};
use std::str::FromStr;
use thiserror::Error;

pub const TITLE_MAX_LEN: usize = 200;

/// A single field-level complaint, serialized as its message text.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum FieldError {
    #[error("This field is required")]
    Required,
    #[error("Must be at most {max} characters")]
    TooLong { max: usize },
    #[error("Must be at least {min} characters")]
    TooShort { min: usize },
    #[error("Must be one of: draft, published")]
    UnknownStatus,
    #[error("Must contain at least one letter or digit")]
    NoAlphanumerics,
    #[error("Only letters, digits and underscores are allowed")]
    IllegalCharacters,
    #[error("The two password fields do not match")]
    PasswordMismatch,
}

impl Serialize for FieldError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Raw post submission as received over the wire.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct PostForm {
    pub title: String,
    pub content: String,
    pub status: String,
}

/// A post form whose fields all passed validation.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct ValidPostForm {
    pub title: String,
    pub content: String,
    pub status: PostStatus,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Serialize, Error)]
#[error("The submitted post was invalid")]
pub struct PostFormErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FieldError>,
}

impl PostFormErrors {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.status.is_none()
    }
}

impl PostForm {
    /// Checks every field and reports all failures at once, so the client
    /// can re-render the whole form.
    pub fn validate(self) -> Result<ValidPostForm, PostFormErrors> {
        let mut errors = PostFormErrors::default();

        let title = self.title.trim().to_owned();
        if title.is_empty() {
            errors.title = Some(FieldError::Required);
        } else if title.chars().count() > TITLE_MAX_LEN {
            errors.title = Some(FieldError::TooLong { max: TITLE_MAX_LEN });
        } else if Slug::derive(&title).get().is_empty() {
            // An all-punctuation title would derive the empty slug, leaving
            // the post unaddressable by any slug route.
            errors.title = Some(FieldError::NoAlphanumerics);
        }

        let content = self.content.trim().to_owned();
        if content.is_empty() {
            errors.content = Some(FieldError::Required);
        }

        // An absent status falls back to the model default.
        let status = if self.status.is_empty() {
            PostStatus::default()
        } else {
            match PostStatus::from_str(&self.status) {
                Ok(status) => status,
                Err(_) => {
                    errors.status = Some(FieldError::UnknownStatus);
                    PostStatus::default()
                }
            }
        };

        if errors.is_empty() {
            Ok(ValidPostForm {
                title,
                content,
                status,
            })
        } else {
            Err(errors)
        }
    }
}

/// Raw signup submission: a username and the password typed twice.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct ValidSignupForm {
    pub username: Username,
    pub password: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Serialize, Error)]
#[error("The signup submission was invalid")]
pub struct SignupFormErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_confirm: Option<FieldError>,
}

impl SignupFormErrors {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.password_confirm.is_none()
    }
}

impl SignupForm {
    pub fn validate(self) -> Result<ValidSignupForm, SignupFormErrors> {
        let mut errors = SignupFormErrors::default();

        let username = match Username::new(self.username.trim().to_owned()) {
            Ok(username) => Some(username),
            Err(_) if self.username.trim().is_empty() => {
                errors.username = Some(FieldError::Required);
                None
            }
            Err(_) if self.username.trim().chars().count() > USERNAME_MAX_LEN => {
                errors.username = Some(FieldError::TooLong {
                    max: USERNAME_MAX_LEN,
                });
                None
            }
            Err(_) => {
                errors.username = Some(FieldError::IllegalCharacters);
                None
            }
        };

        if self.password.chars().count() < PASSWORD_MIN_LEN {
            errors.password = Some(FieldError::TooShort {
                min: PASSWORD_MIN_LEN,
            });
        }

        if self.password_confirm != self.password {
            errors.password_confirm = Some(FieldError::PasswordMismatch);
        }

        match username {
            Some(username) if errors.is_empty() => Ok(ValidSignupForm {
                username,
                password: self.password,
            }),
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::form::{FieldError, PostForm, SignupForm, TITLE_MAX_LEN};
    use crate::model::post::PostStatus;

    fn post_form(title: &str, content: &str, status: &str) -> PostForm {
        PostForm {
            title: title.to_owned(),
            content: content.to_owned(),
            status: status.to_owned(),
        }
    }

    #[test]
    fn well_formed_posts_pass() {
        let valid = post_form("Hello World", "Some content.", "published")
            .validate()
            .unwrap();

        assert_eq!(valid.title, "Hello World");
        assert_eq!(valid.status, PostStatus::Published);
    }

    #[test]
    fn absent_status_defaults_to_draft() {
        let valid = post_form("Hello", "Content", "").validate().unwrap();
        assert_eq!(valid.status, PostStatus::Draft);
    }

    #[test]
    fn every_broken_field_is_reported() {
        let errors = post_form("  ", "", "archived").validate().unwrap_err();

        assert_eq!(errors.title, Some(FieldError::Required));
        assert_eq!(errors.content, Some(FieldError::Required));
        assert_eq!(errors.status, Some(FieldError::UnknownStatus));
    }

    #[test]
    fn overlong_titles_are_rejected() {
        let errors = post_form(&"x".repeat(TITLE_MAX_LEN + 1), "Content", "draft")
            .validate()
            .unwrap_err();

        assert_eq!(errors.title, Some(FieldError::TooLong { max: TITLE_MAX_LEN }));
        assert!(errors.content.is_none());
    }

    #[test]
    fn titles_without_slug_material_are_rejected() {
        for title in ["!!!", "¿¿??", "- - -"] {
            let errors = post_form(title, "Content", "draft").validate().unwrap_err();
            assert_eq!(errors.title, Some(FieldError::NoAlphanumerics), "{title:?}");
        }

        assert!(post_form("Hello!", "Content", "draft").validate().is_ok());
    }

    #[test]
    fn title_at_the_limit_is_fine() {
        assert!(
            post_form(&"x".repeat(TITLE_MAX_LEN), "Content", "draft")
                .validate()
                .is_ok()
        );
    }

    fn signup_form(username: &str, password: &str, confirm: &str) -> SignupForm {
        SignupForm {
            username: username.to_owned(),
            password: password.to_owned(),
            password_confirm: confirm.to_owned(),
        }
    }

    #[test]
    fn matching_credentials_pass() {
        let valid = signup_form("alice", "ComplexPass123!", "ComplexPass123!")
            .validate()
            .unwrap();

        assert_eq!(valid.username.get(), "alice");
    }

    #[test]
    fn mismatched_confirmation_fails() {
        let errors = signup_form("alice", "ComplexPass123!", "DifferentPass456!")
            .validate()
            .unwrap_err();

        assert_eq!(errors.password_confirm, Some(FieldError::PasswordMismatch));
        assert!(errors.username.is_none());
    }

    #[test]
    fn short_passwords_fail() {
        let errors = signup_form("alice", "short", "short").validate().unwrap_err();
        assert_eq!(errors.password, Some(FieldError::TooShort { min: 8 }));
    }

    #[test]
    fn bad_usernames_fail() {
        let errors = signup_form("has space", "ComplexPass123!", "ComplexPass123!")
            .validate()
            .unwrap_err();
        assert_eq!(errors.username, Some(FieldError::IllegalCharacters));

        let errors = signup_form("", "ComplexPass123!", "ComplexPass123!")
            .validate()
            .unwrap_err();
        assert_eq!(errors.username, Some(FieldError::Required));
    }
}
