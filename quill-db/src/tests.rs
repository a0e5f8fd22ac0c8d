//! Query tests against a real Postgres. They are ignored by default; point
//! `DATABASE_URL` at a scratch database and run `cargo test -- --ignored`.

use crate::client::{DbClient, DbError};
use quill_common::model::{
    Id,
    post::{NewPost, PostStatus, Slug},
    user::{User, UserMarker, Username},
};
use std::env;
use time::OffsetDateTime;

async fn connected_client() -> DbClient {
    let url = env::var("DATABASE_URL").expect("DATABASE_URL must be set for database tests");
    let client = DbClient::connect(&url)
        .await
        .expect("connecting to Postgres failed");
    client
        .run_migrations()
        .await
        .expect("running migrations failed");

    client
}

fn unique_suffix() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos()
}

async fn sample_user(db: &DbClient) -> User {
    let username = Username::new(format!("author_{}", unique_suffix())).unwrap();
    db.create_user(&username, "not-a-real-hash").await.unwrap()
}

fn sample_post(title: &str, author: Id<UserMarker>, status: PostStatus) -> NewPost {
    NewPost {
        slug: Slug::derive(title),
        title: title.to_owned(),
        author,
        content: "Some content.".to_owned(),
        featured_image: None,
        status,
    }
}

#[tokio::test]
#[ignore = "needs a configured DATABASE_URL"]
async fn drafts_stay_out_of_the_public_views() {
    let db = connected_client().await;
    let author = sample_user(&db).await;

    let draft = db
        .create_post(&sample_post(
            &format!("Quiet Draft {}", unique_suffix()),
            author.id,
            PostStatus::Draft,
        ))
        .await
        .unwrap();
    let published = db
        .create_post(&sample_post(
            &format!("Loud Launch {}", unique_suffix()),
            author.id,
            PostStatus::Published,
        ))
        .await
        .unwrap();

    let listed = db.fetch_published_posts().await.unwrap();
    assert!(listed.iter().any(|post| post.id == published.id));
    assert!(listed.iter().all(|post| post.id != draft.id));

    assert!(db.fetch_published_post(&draft.slug).await.unwrap().is_none());
    assert!(
        db.fetch_published_post(&published.slug)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
#[ignore = "needs a configured DATABASE_URL"]
async fn only_the_author_passes_the_ownership_gate() {
    let db = connected_client().await;
    let author = sample_user(&db).await;
    let stranger = sample_user(&db).await;

    let post = db
        .create_post(&sample_post(
            &format!("Private Notes {}", unique_suffix()),
            author.id,
            PostStatus::Draft,
        ))
        .await
        .unwrap();

    assert!(
        db.fetch_post_owned_by(&post.slug, author.id)
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        db.fetch_post_owned_by(&post.slug, stranger.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[ignore = "needs a configured DATABASE_URL"]
async fn deleted_posts_are_gone_for_good() {
    let db = connected_client().await;
    let author = sample_user(&db).await;

    let post = db
        .create_post(&sample_post(
            &format!("Short Lived {}", unique_suffix()),
            author.id,
            PostStatus::Published,
        ))
        .await
        .unwrap();

    db.delete_post(post.id).await.unwrap();

    assert!(db.fetch_published_post(&post.slug).await.unwrap().is_none());
    assert!(
        db.fetch_post_owned_by(&post.slug, author.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[ignore = "needs a configured DATABASE_URL"]
async fn duplicate_slugs_are_refused() {
    let db = connected_client().await;
    let author = sample_user(&db).await;

    let title = format!("Same Slug {}", unique_suffix());
    db.create_post(&sample_post(&title, author.id, PostStatus::Draft))
        .await
        .unwrap();

    let second = db
        .create_post(&sample_post(&title, author.id, PostStatus::Draft))
        .await;
    assert!(matches!(second, Err(DbError::UniqueViolation)));
}
