use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, QueryBuilder};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{NewPost, NewUser, Post, PostPatch, Session, User, UserPatch},
};

/// Repository Trait
///
/// The storage collaborator. Actions only talk to this contract, never to SQL.
/// Lookups an action depends on fail with `NotFound`; uniqueness of emails and
/// refresh tokens is the implementation's job (constraints, not checks in actions).
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across
/// axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn list_users(&self, page: i64, limit: i64) -> Result<Vec<User>, AppError>;
    async fn get_user(&self, id: i64) -> Result<User, AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn is_email_taken(&self, email: &str) -> Result<bool, AppError>;
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<User, AppError>;
    async fn remove_user(&self, id: i64) -> Result<(), AppError>;

    // --- Posts ---
    async fn list_posts(
        &self,
        page: i64,
        limit: i64,
        user_id: Option<i64>,
    ) -> Result<Vec<Post>, AppError>;
    async fn get_post(&self, id: i64) -> Result<Post, AppError>;
    async fn create_post(&self, post: NewPost) -> Result<Post, AppError>;
    async fn update_post(&self, id: i64, patch: PostPatch) -> Result<Post, AppError>;
    async fn remove_post(&self, id: i64) -> Result<(), AppError>;

    // --- Sessions ---
    async fn get_session_by_refresh_token(&self, token: Uuid) -> Result<Session, AppError>;
    async fn create_session(&self, session: Session) -> Result<Session, AppError>;
    /// Returns the number of removed rows (0 or 1).
    async fn remove_session_by_refresh_token(&self, token: Uuid) -> Result<u64, AppError>;
    async fn remove_user_sessions(&self, user_id: i64) -> Result<u64, AppError>;
    async fn count_user_sessions(&self, user_id: i64) -> Result<i64, AppError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

fn not_found(entity: &str) -> AppError {
    AppError::not_found(format!("{entity} not found"))
}

/// Row offset of a page. Overflow is reported as a validation failure.
fn offset(page: i64, limit: i64) -> Result<i64, AppError> {
    page.checked_mul(limit)
        .ok_or_else(|| AppError::validation("Invalid 'query.page' field. Page is out of range"))
}

// --- Postgres ---

const USER_COLUMNS: &str =
    "id, name, username, email, role, password_hash, is_email_confirmed, created_at, updated_at";
const POST_COLUMNS: &str = "id, user_id, title, content, created_at, updated_at";
const SESSION_COLUMNS: &str =
    "id, user_id, refresh_token, fingerprint, ip, ua, expires_at, created_at";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Queries are checked at
/// runtime so the crate builds without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_users(&self, page: i64, limit: i64) -> Result<Vec<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT $1 OFFSET $2");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .bind(offset(page, limit)?)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_user(&self, id: i64) -> Result<User, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("User"))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn is_email_taken(&self, email: &str) -> Result<bool, AppError> {
        Ok(
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (name, username, email, role, password_hash) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user.name)
            .bind(user.username)
            .bind(user.email)
            .bind(user.role)
            .bind(user.password_hash)
            .fetch_one(&self.pool)
            .await?)
    }

    /// COALESCE keeps untouched columns as they are.
    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                username = COALESCE($3, username), \
                email = COALESCE($4, email), \
                is_email_confirmed = COALESCE($5, is_email_confirmed), \
                password_hash = COALESCE($6, password_hash), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(patch.name)
            .bind(patch.username)
            .bind(patch.email)
            .bind(patch.is_email_confirmed)
            .bind(patch.password_hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("User"))
    }

    async fn remove_user(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        match result.rows_affected() {
            0 => Err(not_found("User")),
            _ => Ok(()),
        }
    }

    async fn list_posts(
        &self,
        page: i64,
        limit: i64,
        user_id: Option<i64>,
    ) -> Result<Vec<Post>, AppError> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts"));
        if let Some(user_id) = user_id {
            builder.push(" WHERE user_id = ");
            builder.push_bind(user_id);
        }
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset(page, limit)?);

        Ok(builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_post(&self, id: i64) -> Result<Post, AppError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("Post"))
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, AppError> {
        let sql = format!(
            "INSERT INTO posts (user_id, title, content) VALUES ($1, $2, $3) \
             RETURNING {POST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(post.user_id)
            .bind(post.title)
            .bind(post.content)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_post(&self, id: i64, patch: PostPatch) -> Result<Post, AppError> {
        let sql = format!(
            "UPDATE posts SET \
                title = COALESCE($2, title), \
                content = COALESCE($3, content), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {POST_COLUMNS}"
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(patch.title)
            .bind(patch.content)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("Post"))
    }

    async fn remove_post(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        match result.rows_affected() {
            0 => Err(not_found("Post")),
            _ => Ok(()),
        }
    }

    async fn get_session_by_refresh_token(&self, token: Uuid) -> Result<Session, AppError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_token = $1");
        sqlx::query_as::<_, Session>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("Session"))
    }

    async fn create_session(&self, session: Session) -> Result<Session, AppError> {
        let sql = format!(
            "INSERT INTO sessions (id, user_id, refresh_token, fingerprint, ip, ua, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {SESSION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Session>(&sql)
            .bind(session.id)
            .bind(session.user_id)
            .bind(session.refresh_token)
            .bind(session.fingerprint)
            .bind(session.ip)
            .bind(session.ua)
            .bind(session.expires_at)
            .bind(session.created_at)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn remove_session_by_refresh_token(&self, token: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn remove_user_sessions(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_user_sessions(&self, user_id: i64) -> Result<i64, AppError> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

// --- In-memory ---

#[derive(Default)]
struct Tables {
    users: HashMap<i64, User>,
    posts: HashMap<i64, Post>,
    sessions: HashMap<Uuid, Session>,
    next_user_id: i64,
    next_post_id: i64,
}

/// InMemoryRepository
///
/// A process-local `Repository` used by the test-suite and for running the API
/// without Postgres. Enforces the same uniqueness rules as the SQL schema.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page_of<T>(rows: Vec<T>, page: i64, limit: i64) -> Vec<T> {
    let skip = usize::try_from(page.saturating_mul(limit)).unwrap_or(usize::MAX);
    let take = usize::try_from(limit).unwrap_or(0);
    rows.into_iter().skip(skip).take(take).collect()
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_users(&self, page: i64, limit: i64) -> Result<Vec<User>, AppError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(page_of(users, page, limit))
    }

    async fn get_user(&self, id: i64) -> Result<User, AppError> {
        self.tables
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("User"))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn is_email_taken(&self, email: &str) -> Result<bool, AppError> {
        Ok(self.find_user_by_email(email).await?.is_some())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(AppError::EmailAlreadyTaken);
        }
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(AppError::Conflict("Username is already taken".to_string()));
        }
        tables.next_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: tables.next_user_id,
            name: user.name,
            username: user.username,
            email: user.email,
            role: user.role,
            password_hash: user.password_hash,
            is_email_confirmed: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &patch.email {
            if tables.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(AppError::EmailAlreadyTaken);
            }
        }
        if let Some(username) = &patch.username {
            if tables
                .users
                .values()
                .any(|u| u.id != id && &u.username == username)
            {
                return Err(AppError::Conflict("Username is already taken".to_string()));
            }
        }
        let user = tables.users.get_mut(&id).ok_or_else(|| not_found("User"))?;
        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(confirmed) = patch.is_email_confirmed {
            user.is_email_confirmed = confirmed;
        }
        if let Some(hash) = patch.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn remove_user(&self, id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.users.remove(&id).ok_or_else(|| not_found("User"))?;
        // Mirrors ON DELETE CASCADE.
        tables.posts.retain(|_, p| p.user_id != id);
        tables.sessions.retain(|_, s| s.user_id != id);
        Ok(())
    }

    async fn list_posts(
        &self,
        page: i64,
        limit: i64,
        user_id: Option<i64>,
    ) -> Result<Vec<Post>, AppError> {
        let tables = self.tables.read().await;
        let mut posts: Vec<Post> = tables
            .posts
            .values()
            .filter(|p| user_id.is_none_or(|owner| p.user_id == owner))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page_of(posts, page, limit))
    }

    async fn get_post(&self, id: i64) -> Result<Post, AppError> {
        self.tables
            .read()
            .await
            .posts
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Post"))
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&post.user_id) {
            return Err(not_found("User"));
        }
        tables.next_post_id += 1;
        let now = Utc::now();
        let created = Post {
            id: tables.next_post_id,
            user_id: post.user_id,
            title: post.title,
            content: post.content,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_post(&self, id: i64, patch: PostPatch) -> Result<Post, AppError> {
        let mut tables = self.tables.write().await;
        let post = tables.posts.get_mut(&id).ok_or_else(|| not_found("Post"))?;
        if let Some(title) = patch.title {
            post.title = title;
        }
        if let Some(content) = patch.content {
            post.content = content;
        }
        post.updated_at = Utc::now();
        Ok(post.clone())
    }

    async fn remove_post(&self, id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables
            .posts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("Post"))
    }

    async fn get_session_by_refresh_token(&self, token: Uuid) -> Result<Session, AppError> {
        self.tables
            .read()
            .await
            .sessions
            .get(&token)
            .cloned()
            .ok_or_else(|| not_found("Session"))
    }

    async fn create_session(&self, session: Session) -> Result<Session, AppError> {
        let mut tables = self.tables.write().await;
        if tables.sessions.contains_key(&session.refresh_token) {
            return Err(AppError::Conflict("Refresh token already exists".to_string()));
        }
        tables
            .sessions
            .insert(session.refresh_token, session.clone());
        Ok(session)
    }

    async fn remove_session_by_refresh_token(&self, token: Uuid) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        Ok(tables.sessions.remove(&token).map_or(0, |_| 1))
    }

    async fn remove_user_sessions(&self, user_id: i64) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn count_user_sessions(&self, user_id: i64) -> Result<i64, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .count() as i64)
    }
}
