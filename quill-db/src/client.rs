use crate::record::{CredentialsRecord, PostRecord, SessionRecord};
use quill_common::model::{
    Id, ModelValidationError,
    post::{NewPost, Post, PostChanges, PostMarker, Slug},
    session::{Session, SessionTokenHash},
    user::{User, UserMarker, Username},
};
use sqlx::PgPool;
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("A uniqueness constraint was violated")]
    UniqueViolation,
    #[error("Error running migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// A user row joined with its password hash, for login checks.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct StoredCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug)]
pub struct DbClient {
    pool: PgPool,
}

const POST_COLUMNS: &str = "
    posts.post_id, posts.title, posts.slug, posts.content,
    posts.image_url, posts.image_public_id, posts.status,
    posts.created_at, posts.updated_at,
    users.user_id, users.username
";

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn create_user(&self, username: &Username, password_hash: &str) -> Result<User> {
        let user_id: i64 = sqlx::query_scalar(
            "
            INSERT INTO users.users (username, password_hash)
            VALUES ($1, $2)
            RETURNING user_id
            ",
        )
        .bind(username.get())
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(constraint_mapped)?;

        Ok(User {
            id: user_id.into(),
            username: username.clone(),
        })
    }

    pub async fn fetch_credentials(&self, username: &str) -> Result<Option<StoredCredentials>> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "
            SELECT users.user_id, users.username, users.password_hash
            FROM users.users
            WHERE users.username = $1
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record
            .map(|record| {
                Ok::<_, ModelValidationError>(StoredCredentials {
                    user: User {
                        id: record.user_id.into(),
                        username: Username::new(record.username)?,
                    },
                    password_hash: record.password_hash,
                })
            })
            .transpose()?;
        Ok(credentials)
    }

    pub async fn create_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "
            INSERT INTO users.sessions (token_hash, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&session.token_hash.0[..])
        .bind(session.user.get())
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "
            SELECT sessions.user_id, sessions.token_hash, sessions.created_at, sessions.expires_at
            FROM users.sessions sessions
            WHERE sessions.token_hash = $1
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        let session = record.map(Session::try_from).transpose()?;
        Ok(session)
    }

    pub async fn delete_session(&self, token_hash: &SessionTokenHash) -> Result<()> {
        sqlx::query("DELETE FROM users.sessions WHERE token_hash = $1")
            .bind(&token_hash.0[..])
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let record = sqlx::query_as::<_, PostRecord>(
            "
            WITH inserted AS (
                INSERT INTO posts.posts
                    (title, slug, author_id, content, image_url, image_public_id, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
            )
            SELECT
                inserted.post_id, inserted.title, inserted.slug, inserted.content,
                inserted.image_url, inserted.image_public_id, inserted.status,
                inserted.created_at, inserted.updated_at,
                users.user_id, users.username
            FROM inserted JOIN users.users ON users.user_id = inserted.author_id
            ",
        )
        .bind(&post.title)
        .bind(post.slug.get())
        .bind(post.author.get())
        .bind(&post.content)
        .bind(post.featured_image.as_ref().map(|asset| asset.url.as_str()))
        .bind(
            post.featured_image
                .as_ref()
                .map(|asset| asset.public_id.as_str()),
        )
        .bind(post.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(constraint_mapped)?;

        Ok(record.try_into()?)
    }

    pub async fn fetch_published_posts(&self) -> Result<Vec<Post>> {
        let records = sqlx::query_as::<_, PostRecord>(&format!(
            "
            SELECT {POST_COLUMNS}
            FROM posts.posts JOIN users.users ON users.user_id = posts.author_id
            WHERE posts.status = 'published'
            ORDER BY posts.created_at DESC
            "
        ))
        .fetch_all(&self.pool)
        .await?;

        collect_posts(records)
    }

    pub async fn fetch_published_post(&self, slug: &Slug) -> Result<Option<Post>> {
        let record = sqlx::query_as::<_, PostRecord>(&format!(
            "
            SELECT {POST_COLUMNS}
            FROM posts.posts JOIN users.users ON users.user_id = posts.author_id
            WHERE posts.slug = $1 AND posts.status = 'published'
            "
        ))
        .bind(slug.get())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    /// The ownership-gated lookup: only returns the post when `author` owns
    /// it, whatever its status.
    pub async fn fetch_post_owned_by(
        &self,
        slug: &Slug,
        author: Id<UserMarker>,
    ) -> Result<Option<Post>> {
        let record = sqlx::query_as::<_, PostRecord>(&format!(
            "
            SELECT {POST_COLUMNS}
            FROM posts.posts JOIN users.users ON users.user_id = posts.author_id
            WHERE posts.slug = $1 AND posts.author_id = $2
            "
        ))
        .bind(slug.get())
        .bind(author.get())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    pub async fn fetch_posts_by_author(&self, author: Id<UserMarker>) -> Result<Vec<Post>> {
        let records = sqlx::query_as::<_, PostRecord>(&format!(
            "
            SELECT {POST_COLUMNS}
            FROM posts.posts JOIN users.users ON users.user_id = posts.author_id
            WHERE posts.author_id = $1
            ORDER BY posts.created_at DESC
            "
        ))
        .bind(author.get())
        .fetch_all(&self.pool)
        .await?;

        collect_posts(records)
    }

    pub async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        changes: &PostChanges,
    ) -> Result<Option<Post>> {
        let record = sqlx::query_as::<_, PostRecord>(
            "
            WITH updated AS (
                UPDATE posts.posts
                SET title = $2, slug = $3, content = $4,
                    image_url = $5, image_public_id = $6, status = $7,
                    updated_at = now()
                WHERE post_id = $1
                RETURNING *
            )
            SELECT
                updated.post_id, updated.title, updated.slug, updated.content,
                updated.image_url, updated.image_public_id, updated.status,
                updated.created_at, updated.updated_at,
                users.user_id, users.username
            FROM updated JOIN users.users ON users.user_id = updated.author_id
            ",
        )
        .bind(post_id.get())
        .bind(&changes.title)
        .bind(changes.slug.get())
        .bind(&changes.content)
        .bind(
            changes
                .featured_image
                .as_ref()
                .map(|asset| asset.url.as_str()),
        )
        .bind(
            changes
                .featured_image
                .as_ref()
                .map(|asset| asset.public_id.as_str()),
        )
        .bind(changes.status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(constraint_mapped)?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<()> {
        sqlx::query("DELETE FROM posts.posts WHERE post_id = $1")
            .bind(post_id.get())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn collect_posts(records: Vec<PostRecord>) -> Result<Vec<Post>> {
    records
        .into_iter()
        .map(|record| Post::try_from(record).map_err(DbError::from))
        .collect()
}

/// Postgres reports duplicate slugs and usernames through the unique
/// indexes; everything else stays a plain sqlx error.
fn constraint_mapped(err: sqlx::Error) -> DbError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => DbError::UniqueViolation,
        _ => DbError::Sqlx(err),
    }
}
