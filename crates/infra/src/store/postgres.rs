//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | nick or email already taken |
//! | Database (foreign key violation) | `23503` | `NotFound` | follow / publish for an absent user |
//! | Database (other) | Any other | `Database` | |
//! | PoolClosed | N/A | `Database` | connection pool was closed |
//! | Other | N/A | `Database` | network errors, connection failures, etc. |
//!
//! Ids are `BIGSERIAL`; a `u64` id above `i64::MAX` cannot exist in the table
//! and is treated as absent without a round trip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;

use devbook_core::{
    NewUserRecord, PasswordDigest, Publication, PublicationDraft, PublicationEdit, PublicationId,
    User, UserId, UserProfile,
};

use super::{PublicationStore, StoreError, StoreResult, UserStore};

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, PgArguments>;

const SCHEMA: &str = include_str!("../../schema.sql");

const USER_COLUMNS: &str = "u.id, u.name, u.nick, u.email, u.created_at";

const PUBLICATION_SELECT: &str = r#"
    SELECT p.id, p.title, p.content, p.author_id, u.nick AS author_nick, p.likes, p.created_at
    FROM publications p
    JOIN users u ON u.id = p.author_id
"#;

/// `sqlx` connection pool shared by every request.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool and bring the schema up to date.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn users(&self, operation: &str, sql: &str, id: i64) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter()
            .map(user_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn publications(
        &self,
        operation: &str,
        sql: &str,
        id: i64,
    ) -> StoreResult<Vec<Publication>> {
        let rows = sqlx::query(sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter()
            .map(publication_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error(operation, e))
    }

    /// Run a single-row mutation; zero affected rows means the row is absent.
    async fn mutate_one(&self, operation: &str, query: PgQuery<'_>) -> StoreResult<()> {
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    #[instrument(skip(self, record), err)]
    async fn create(&self, record: NewUserRecord) -> StoreResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users AS u (name, nick, email, password)
            VALUES ($1, $2, $3, $4)
            RETURNING u.id, u.name, u.nick, u.email, u.created_at
            "#,
        )
        .bind(record.profile.name())
        .bind(record.profile.nick())
        .bind(record.profile.email())
        .bind(record.password_hash.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;

        user_from_row(&row).map_err(|e| map_sqlx_error("create_user", e))
    }

    #[instrument(skip(self), err)]
    async fn search(&self, filter: &str) -> StoreResult<Vec<User>> {
        let pattern = format!("%{}%", escape_like(filter));
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.name ILIKE $1 OR u.nick ILIKE $1 ORDER BY u.id"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("search_users", e))?;

        rows.iter()
            .map(user_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("search_users", e))
    }

    async fn get(&self, id: UserId) -> StoreResult<Option<User>> {
        let Some(id) = db_id(id.get()) else {
            return Ok(None);
        };
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_user", e))
    }

    #[instrument(skip(self, profile), err)]
    async fn update(&self, id: UserId, profile: &UserProfile) -> StoreResult<()> {
        let id = db_id(id.get()).ok_or(StoreError::NotFound)?;
        let query = sqlx::query("UPDATE users SET name = $1, nick = $2, email = $3 WHERE id = $4")
            .bind(profile.name())
            .bind(profile.nick())
            .bind(profile.email())
            .bind(id);
        self.mutate_one("update_user", query).await
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, id: UserId) -> StoreResult<()> {
        let id = db_id(id.get()).ok_or(StoreError::NotFound)?;
        let query = sqlx::query("DELETE FROM users WHERE id = $1").bind(id);
        self.mutate_one("delete_user", query).await
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<(UserId, PasswordDigest)>> {
        let row = sqlx::query("SELECT id, password FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_credentials", e))?;

        row.map(|row| -> Result<_, sqlx::Error> {
            let id: i64 = row.try_get("id")?;
            let password: String = row.try_get("password")?;
            Ok((user_id(id), PasswordDigest::new(password)))
        })
        .transpose()
        .map_err(|e| map_sqlx_error("find_credentials", e))
    }

    async fn password_digest(&self, id: UserId) -> StoreResult<Option<PasswordDigest>> {
        let Some(id) = db_id(id.get()) else {
            return Ok(None);
        };
        let password: Option<String> = sqlx::query_scalar("SELECT password FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("password_digest", e))?;
        Ok(password.map(PasswordDigest::new))
    }

    #[instrument(skip(self, digest), err)]
    async fn update_password(&self, id: UserId, digest: &PasswordDigest) -> StoreResult<()> {
        let id = db_id(id.get()).ok_or(StoreError::NotFound)?;
        let query = sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
            .bind(digest.as_str())
            .bind(id);
        self.mutate_one("update_password", query).await
    }

    #[instrument(skip(self), err)]
    async fn follow(&self, followee: UserId, follower: UserId) -> StoreResult<()> {
        let followee = db_id(followee.get()).ok_or(StoreError::NotFound)?;
        let follower = db_id(follower.get()).ok_or(StoreError::NotFound)?;
        sqlx::query(
            "INSERT INTO followers (user_id, follower_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(followee)
        .bind(follower)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("follow", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn unfollow(&self, followee: UserId, follower: UserId) -> StoreResult<()> {
        let (Some(followee), Some(follower)) = (db_id(followee.get()), db_id(follower.get())) else {
            return Ok(());
        };
        sqlx::query("DELETE FROM followers WHERE user_id = $1 AND follower_id = $2")
            .bind(followee)
            .bind(follower)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("unfollow", e))?;
        Ok(())
    }

    async fn followers(&self, id: UserId) -> StoreResult<Vec<User>> {
        let Some(id) = db_id(id.get()) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN followers f ON f.follower_id = u.id \
             WHERE f.user_id = $1 ORDER BY u.id"
        );
        self.users("followers", &sql, id).await
    }

    async fn following(&self, id: UserId) -> StoreResult<Vec<User>> {
        let Some(id) = db_id(id.get()) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN followers f ON f.user_id = u.id \
             WHERE f.follower_id = $1 ORDER BY u.id"
        );
        self.users("following", &sql, id).await
    }
}

#[async_trait]
impl PublicationStore for PgStore {
    #[instrument(skip(self, draft), fields(author_id = %draft.author_id), err)]
    async fn create(&self, draft: PublicationDraft) -> StoreResult<Publication> {
        let author_id = db_id(draft.author_id.get()).ok_or(StoreError::NotFound)?;
        let row = sqlx::query(
            r#"
            WITH p AS (
                INSERT INTO publications (title, content, author_id)
                VALUES ($1, $2, $3)
                RETURNING id, title, content, author_id, likes, created_at
            )
            SELECT p.id, p.title, p.content, p.author_id, u.nick AS author_nick, p.likes, p.created_at
            FROM p
            JOIN users u ON u.id = p.author_id
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_publication", e))?;

        publication_from_row(&row).map_err(|e| map_sqlx_error("create_publication", e))
    }

    async fn get(&self, id: PublicationId) -> StoreResult<Option<Publication>> {
        let Some(id) = db_id(id.get()) else {
            return Ok(None);
        };
        let row = sqlx::query(&format!("{PUBLICATION_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_publication", e))?;

        row.as_ref()
            .map(publication_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_publication", e))
    }

    async fn feed(&self, user: UserId) -> StoreResult<Vec<Publication>> {
        let Some(user) = db_id(user.get()) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "{PUBLICATION_SELECT} WHERE p.author_id = $1 \
             OR p.author_id IN (SELECT f.user_id FROM followers f WHERE f.follower_id = $1) \
             ORDER BY p.id DESC"
        );
        self.publications("feed", &sql, user).await
    }

    async fn by_author(&self, author: UserId) -> StoreResult<Vec<Publication>> {
        let Some(author) = db_id(author.get()) else {
            return Ok(Vec::new());
        };
        let sql = format!("{PUBLICATION_SELECT} WHERE p.author_id = $1 ORDER BY p.id DESC");
        self.publications("publications_by_author", &sql, author).await
    }

    #[instrument(skip(self, edit), err)]
    async fn update(&self, id: PublicationId, edit: &PublicationEdit) -> StoreResult<()> {
        let id = db_id(id.get()).ok_or(StoreError::NotFound)?;
        let query = sqlx::query("UPDATE publications SET title = $1, content = $2 WHERE id = $3")
            .bind(&edit.title)
            .bind(&edit.content)
            .bind(id);
        self.mutate_one("update_publication", query).await
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, id: PublicationId) -> StoreResult<()> {
        let id = db_id(id.get()).ok_or(StoreError::NotFound)?;
        let query = sqlx::query("DELETE FROM publications WHERE id = $1").bind(id);
        self.mutate_one("delete_publication", query).await
    }

    #[instrument(skip(self), err)]
    async fn like(&self, id: PublicationId) -> StoreResult<()> {
        let id = db_id(id.get()).ok_or(StoreError::NotFound)?;
        let query = sqlx::query("UPDATE publications SET likes = likes + 1 WHERE id = $1").bind(id);
        self.mutate_one("like", query).await
    }

    #[instrument(skip(self), err)]
    async fn unlike(&self, id: PublicationId) -> StoreResult<()> {
        let id = db_id(id.get()).ok_or(StoreError::NotFound)?;
        let query = sqlx::query(
            "UPDATE publications SET likes = CASE WHEN likes > 0 THEN likes - 1 ELSE 0 END WHERE id = $1",
        )
        .bind(id);
        self.mutate_one("unlike", query).await
    }
}

fn db_id(id: u64) -> Option<i64> {
    i64::try_from(id).ok()
}

fn user_id(id: i64) -> UserId {
    UserId::new(id.unsigned_abs())
}

/// Escape `%`, `_` and `\` so the filter matches literally inside `ILIKE`.
fn escape_like(filter: &str) -> String {
    let mut out = String::with_capacity(filter.len());
    for c in filter.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: user_id(row.try_get("id")?),
        name: row.try_get("name")?,
        nick: row.try_get("nick")?,
        email: row.try_get("email")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn publication_from_row(row: &PgRow) -> Result<Publication, sqlx::Error> {
    let id: i64 = row.try_get("id")?;
    let likes: i64 = row.try_get("likes")?;
    Ok(Publication {
        id: PublicationId::new(id.unsigned_abs()),
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        author_id: user_id(row.try_get("author_id")?),
        author_nick: row.try_get("author_nick")?,
        likes: u64::try_from(likes).unwrap_or_default(),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(unique_violation_message(db_err.constraint())),
                Some("23503") => StoreError::NotFound,
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn unique_violation_message(constraint: Option<&str>) -> String {
    match constraint {
        Some(c) if c.contains("nick") => "nick is already taken".to_string(),
        Some(c) if c.contains("email") => "email is already taken".to_string(),
        _ => "record already exists".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("ann"), "ann");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn oversized_ids_never_reach_the_database() {
        assert_eq!(db_id(7), Some(7));
        assert_eq!(db_id(u64::MAX), None);
    }

    #[test]
    fn unique_violations_name_the_column() {
        assert_eq!(unique_violation_message(Some("users_nick_key")), "nick is already taken");
        assert_eq!(unique_violation_message(Some("users_email_key")), "email is already taken");
        assert_eq!(unique_violation_message(None), "record already exists");
    }

    #[test]
    fn pool_closed_maps_to_database_error() {
        let err = map_sqlx_error("get_user", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Database(msg) if msg.contains("get_user")));
    }

    #[test]
    fn schema_creates_all_tables() {
        for table in ["users", "followers", "publications"] {
            assert!(SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")));
        }
    }
}
