use crate::{
    media::MediaStore,
    server::{Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json},
};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
};
use axum_extra::routing::{RouterExt, TypedPath};
use quill_common::{
    form::PostForm,
    model::post::{MediaAsset, NewPost, Post, PostChanges, Slug},
};
use quill_db::client::{DbClient, DbError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_get(my_posts)
        .typed_get(post_detail)
        .typed_post(create_post)
        .typed_get(edit_form)
        .typed_post(edit_post)
        .typed_get(delete_confirm)
        .typed_post(delete_post)
}

/// An image file pulled out of the multipart body.
struct ImageUpload {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

struct PostUpload {
    form: PostForm,
    image: Option<ImageUpload>,
    remove_image: bool,
}

/// Drains the multipart body into the raw form plus the optional image.
/// Unknown fields are skipped; an empty file part counts as no image.
async fn read_post_upload(mut multipart: Multipart) -> Result<PostUpload> {
    let mut form = PostForm::default();
    let mut image = None;
    let mut remove_image = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(ToOwned::to_owned);

        match name.as_deref() {
            Some("title") => form.title = field.text().await?,
            Some("content") => form.content = field.text().await?,
            Some("status") => form.status = field.text().await?,
            Some("remove_image") => remove_image = checkbox_checked(&field.text().await?),
            Some("featured_image") => {
                let filename = field.file_name().unwrap_or("upload").to_owned();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                let bytes = field.bytes().await?.to_vec();

                if !bytes.is_empty() {
                    image = Some(ImageUpload {
                        filename,
                        content_type,
                        bytes,
                    });
                }
            }
            _ => {}
        }
    }

    Ok(PostUpload {
        form,
        image,
        remove_image,
    })
}

/// HTML checkbox conventions: the field is either absent or carries one of
/// the truthy markers.
fn checkbox_checked(value: &str) -> bool {
    matches!(value, "true" | "on" | "1")
}

/// A submitted file replaces the current image, the remove flag clears it,
/// and otherwise the current asset is kept.
fn resolve_featured_image(
    current: Option<MediaAsset>,
    replacement: Option<MediaAsset>,
    remove: bool,
) -> Option<MediaAsset> {
    match (replacement, remove) {
        (Some(new), _) => Some(new),
        (None, true) => None,
        (None, false) => current,
    }
}

/// Best-effort removal of an asset that is no longer referenced. The post
/// write already went through (or never happened), so a leftover asset only
/// costs storage; failures are logged, not surfaced.
async fn discard_asset(media: &dyn MediaStore, asset: &MediaAsset) {
    if let Err(err) = media.delete(&asset.public_id).await {
        warn!(error = %err, public_id = %asset.public_id, "Failed to delete media asset");
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct ListPostsPath();

async fn list_posts(
    ListPostsPath(): ListPostsPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Vec<Post>>> {
    let posts = db.fetch_published_posts().await?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/my-posts", rejection(ServerError))]
struct MyPostsPath();

/// The principal's own posts, drafts included.
async fn my_posts(
    MyPostsPath(): MyPostsPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Post>>> {
    let posts = db.fetch_posts_by_author(user.user_id()).await?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{slug}", rejection(ServerError))]
struct PostDetailPath {
    slug: Slug,
}

async fn post_detail(
    PostDetailPath { slug }: PostDetailPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Post>> {
    let post = db
        .fetch_published_post(&slug)
        .await?
        .ok_or(ServerError::PostNotFound(slug))?;

    Ok(Json(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/new", rejection(ServerError))]
struct CreatePostPath();

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<dyn MediaStore>>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Post>)> {
    let upload = read_post_upload(multipart).await?;
    let valid = upload.form.validate().map_err(ServerError::InvalidPost)?;

    // Upload first, persist second. A media failure aborts before any row
    // is written; a failed insert afterwards cleans the asset back up.
    let featured_image = match upload.image {
        Some(image) => Some(
            media
                .upload(&image.filename, &image.content_type, image.bytes)
                .await?,
        ),
        None => None,
    };

    let new_post = NewPost {
        slug: Slug::derive(&valid.title),
        title: valid.title,
        author: user.user_id(),
        content: valid.content,
        featured_image,
        status: valid.status,
    };

    match db.create_post(&new_post).await {
        Ok(post) => Ok((StatusCode::CREATED, Json(post))),
        Err(err) => {
            if let Some(asset) = &new_post.featured_image {
                discard_asset(media.as_ref(), asset).await;
            }
            Err(match err {
                DbError::UniqueViolation => ServerError::SlugTaken(new_post.slug),
                other => other.into(),
            })
        }
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{slug}/edit", rejection(ServerError))]
struct EditPostPath {
    slug: Slug,
}

/// Form prefill: the current post, only visible to its author.
async fn edit_form(
    EditPostPath { slug }: EditPostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<Post>> {
    let post = db
        .fetch_post_owned_by(&slug, user.user_id())
        .await?
        .ok_or(ServerError::PostNotFound(slug))?;

    Ok(Json(post))
}

async fn edit_post(
    EditPostPath { slug }: EditPostPath,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<dyn MediaStore>>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<Post>> {
    let post = db
        .fetch_post_owned_by(&slug, user.user_id())
        .await?
        .ok_or_else(|| ServerError::PostNotFound(slug.clone()))?;

    let upload = read_post_upload(multipart).await?;
    let valid = upload.form.validate().map_err(ServerError::InvalidPost)?;

    let replacement = match upload.image {
        Some(image) => Some(
            media
                .upload(&image.filename, &image.content_type, image.bytes)
                .await?,
        ),
        None => None,
    };

    let changes = PostChanges {
        slug: post.slug.clone().reconcile(&valid.title),
        title: valid.title,
        content: valid.content,
        featured_image: resolve_featured_image(
            post.featured_image.clone(),
            replacement.clone(),
            upload.remove_image,
        ),
        status: valid.status,
    };

    match db.update_post(post.id, &changes).await {
        Ok(Some(updated)) => {
            // The old asset is unreferenced once replaced or removed.
            if let Some(old) = &post.featured_image
                && changes.featured_image.as_ref() != Some(old)
            {
                discard_asset(media.as_ref(), old).await;
            }
            Ok(Json(updated))
        }
        // The row vanished between the ownership check and the update.
        Ok(None) => {
            if let Some(asset) = &replacement {
                discard_asset(media.as_ref(), asset).await;
            }
            Err(ServerError::PostNotFound(slug))
        }
        Err(err) => {
            if let Some(asset) = &replacement {
                discard_asset(media.as_ref(), asset).await;
            }
            Err(match err {
                DbError::UniqueViolation => ServerError::SlugTaken(changes.slug),
                other => other.into(),
            })
        }
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{slug}/delete", rejection(ServerError))]
struct DeletePostPath {
    slug: Slug,
}

/// Confirmation step: echoes the post that a follow-up POST would delete.
async fn delete_confirm(
    DeletePostPath { slug }: DeletePostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<Post>> {
    let post = db
        .fetch_post_owned_by(&slug, user.user_id())
        .await?
        .ok_or(ServerError::PostNotFound(slug))?;

    Ok(Json(post))
}

async fn delete_post(
    DeletePostPath { slug }: DeletePostPath,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<dyn MediaStore>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    let post = db
        .fetch_post_owned_by(&slug, user.user_id())
        .await?
        .ok_or(ServerError::PostNotFound(slug))?;

    db.delete_post(post.id).await?;

    if let Some(asset) = &post.featured_image {
        discard_asset(media.as_ref(), asset).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::server::routes::posts::{checkbox_checked, resolve_featured_image};
    use quill_common::model::post::MediaAsset;

    fn asset(public_id: &str) -> MediaAsset {
        MediaAsset {
            url: format!("https://media.example/{public_id}.png"),
            public_id: public_id.to_owned(),
        }
    }

    #[test]
    fn a_new_file_replaces_the_current_image() {
        let resolved = resolve_featured_image(Some(asset("old")), Some(asset("new")), false);
        assert_eq!(resolved, Some(asset("new")));

        // A file together with the remove flag still means "use the file".
        let resolved = resolve_featured_image(Some(asset("old")), Some(asset("new")), true);
        assert_eq!(resolved, Some(asset("new")));
    }

    #[test]
    fn the_remove_flag_clears_the_image() {
        assert_eq!(resolve_featured_image(Some(asset("old")), None, true), None);
        assert_eq!(resolve_featured_image(None, None, true), None);
    }

    #[test]
    fn an_absent_file_keeps_the_current_image() {
        let resolved = resolve_featured_image(Some(asset("old")), None, false);
        assert_eq!(resolved, Some(asset("old")));

        assert_eq!(resolve_featured_image(None, None, false), None);
    }

    #[test]
    fn checkbox_markers() {
        for truthy in ["true", "on", "1"] {
            assert!(checkbox_checked(truthy), "{truthy:?}");
        }
        for falsy in ["", "false", "0", "yes", "TRUE"] {
            assert!(!checkbox_checked(falsy), "{falsy:?}");
        }
    }
}
