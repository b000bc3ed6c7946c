//! PostgreSQL-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::Instrument;
use uuid::Uuid;

use super::{SessionStore, StoreError, UserStore};
use crate::models::{
    CodePurpose, NewOneTimeCode, NewSession, NewUser, OneTimeCode, Profile, Session, User,
    UserListFilter,
};
use crate::types::{PrincipalId, SessionId};

const SESSION_COLUMNS: &str =
    "id, principal_id, refresh_token, expires_at, client_id, client_name, created_at, updated_at";
const USER_COLUMNS: &str = "id, name, email, password_hash, email_verified, created_at, updated_at";
const PROFILE_COLUMNS: &str = "user_id, picture, gender, education, birthdate, locale, timezone";
const CODE_COLUMNS: &str = "id, user_id, code_hash, failed_attempts, created_at";
const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_key";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_user_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() && db_err.constraint() == Some(EMAIL_UNIQUE_CONSTRAINT) {
            return StoreError::EmailTaken;
        }
    }
    StoreError::from(err)
}

/// `%term%` with LIKE wildcards in the term taken literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn apply_user_search(builder: &mut QueryBuilder<'_, Postgres>, filter: &UserListFilter) {
    let Some(search) = filter.search.as_deref() else {
        return;
    };
    let pattern = like_pattern(search);
    builder.push(" WHERE (");
    let columns = [
        "u.name",
        "u.email",
        "p.timezone",
        "p.gender",
        "p.locale",
        "p.education",
        "p.birthdate::text",
    ];
    for (index, column) in columns.iter().enumerate() {
        if index > 0 {
            builder.push(" OR ");
        }
        builder
            .push(*column)
            .push(" ILIKE ")
            .push_bind(pattern.clone());
    }
    builder.push(")");
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, session: NewSession) -> Result<Session, StoreError> {
        let span = tracing::debug_span!("pg_insert_session", principal_id = %session.principal_id);
        let row = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (principal_id, refresh_token, expires_at, client_id, client_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.principal_id)
        .bind(&session.refresh_token)
        .bind(session.expires_at)
        .bind(&session.client_id)
        .bind(&session.client_name)
        .fetch_one(&self.pool)
        .instrument(span)
        .await?;
        Ok(row)
    }

    async fn find_session_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_token = $1"
        ))
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_session_by_id(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_sessions_for_principal(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE principal_id = $1 ORDER BY id DESC"
        ))
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn session_ids_oldest_first(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<SessionId>, StoreError> {
        let ids = sqlx::query_scalar::<_, SessionId>(
            "SELECT id FROM sessions WHERE principal_id = $1 ORDER BY id ASC",
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn rotate_refresh_token(
        &self,
        id: SessionId,
        current: &str,
        replacement: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let span = tracing::debug_span!("pg_rotate_refresh_token", session_id = id);
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET refresh_token = $1,
                expires_at = $2,
                updated_at = NOW()
            WHERE id = $3 AND refresh_token = $4
            "#,
        )
        .bind(replacement)
        .bind(expires_at)
        .bind(id)
        .bind(current)
        .execute(&self.pool)
        .instrument(span)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_sessions(&self, ids: &[SessionId]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM sessions WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(PrincipalId::new())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_user_write_error)
    }

    async fn find_user_by_id(&self, id: PrincipalId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = $1,
                email = $2,
                email_verified = $3,
                password_hash = $4,
                updated_at = NOW()
            WHERE id = $5
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.password_hash)
        .bind(user.id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_user_write_error)
    }

    async fn list_users(&self, filter: &UserListFilter) -> Result<(Vec<User>, i64), StoreError> {
        const FROM: &str = " FROM users u LEFT JOIN profiles p ON p.user_id = u.id";

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT u.id, u.name, u.email, u.password_hash, u.email_verified, u.created_at, \
             u.updated_at",
        );
        builder.push(FROM);
        apply_user_search(&mut builder, filter);
        let direction = filter.direction.as_sql();
        builder.push(format!(
            " ORDER BY u.{} {}, u.id {}",
            filter.sort.column(),
            direction,
            direction
        ));
        builder
            .push(" LIMIT ")
            .push_bind(filter.page.page_size)
            .push(" OFFSET ")
            .push_bind(filter.page.offset());
        let users = builder.build_query_as::<User>().fetch_all(&self.pool).await?;

        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*)");
        count_builder.push(FROM);
        apply_user_search(&mut count_builder, filter);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok((users, total))
    }

    async fn find_profile(&self, user_id: PrincipalId) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile, StoreError> {
        let row = sqlx::query_as::<_, Profile>(&format!(
            r#"
            INSERT INTO profiles (user_id, picture, gender, education, birthdate, locale, timezone)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE
            SET picture = EXCLUDED.picture,
                gender = EXCLUDED.gender,
                education = EXCLUDED.education,
                birthdate = EXCLUDED.birthdate,
                locale = EXCLUDED.locale,
                timezone = EXCLUDED.timezone,
                updated_at = NOW()
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(profile.user_id)
        .bind(&profile.picture)
        .bind(&profile.gender)
        .bind(&profile.education)
        .bind(profile.birthdate)
        .bind(&profile.locale)
        .bind(&profile.timezone)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn latest_code(
        &self,
        user_id: PrincipalId,
        purpose: CodePurpose,
    ) -> Result<Option<OneTimeCode>, StoreError> {
        let row = sqlx::query_as::<_, OneTimeCode>(&format!(
            r#"
            SELECT {CODE_COLUMNS}
            FROM one_time_codes
            WHERE user_id = $1 AND purpose = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_code(&self, code: NewOneTimeCode) -> Result<OneTimeCode, StoreError> {
        let row = sqlx::query_as::<_, OneTimeCode>(&format!(
            r#"
            INSERT INTO one_time_codes (id, user_id, purpose, code_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {CODE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(code.user_id)
        .bind(code.purpose.as_str())
        .bind(&code.code_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn record_failed_attempt(&self, id: Uuid) -> Result<Option<i32>, StoreError> {
        let attempts = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE one_time_codes
            SET failed_attempts = failed_attempts + 1
            WHERE id = $1
            RETURNING failed_attempts
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn delete_codes(
        &self,
        user_id: PrincipalId,
        purpose: CodePurpose,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM one_time_codes WHERE user_id = $1 AND purpose = $2")
            .bind(user_id)
            .bind(purpose.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
