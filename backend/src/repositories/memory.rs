//! In-process store used when no database is configured and in tests.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

use super::{SessionStore, StoreError, UserStore};
use crate::models::{
    CodePurpose, NewOneTimeCode, NewSession, NewUser, OneTimeCode, Profile, Session,
    SortDirection, User, UserListFilter, UserSortField,
};
use crate::types::{PrincipalId, SessionId};

#[derive(Debug)]
struct CodeRow {
    purpose: CodePurpose,
    code: OneTimeCode,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<PrincipalId, User>,
    profiles: HashMap<PrincipalId, Profile>,
    sessions: BTreeMap<SessionId, Session>,
    codes: Vec<CodeRow>,
    last_session_id: SessionId,
}

/// Case-insensitive substring match over the same fields the SQL search covers.
fn user_matches(user: &User, profile: Option<&Profile>, needle: &str) -> bool {
    let hit = |value: &str| value.to_lowercase().contains(needle);
    if hit(&user.name) || hit(&user.email) {
        return true;
    }
    let Some(profile) = profile else {
        return false;
    };
    [
        profile.timezone.as_deref(),
        profile.gender.as_deref(),
        profile.locale.as_deref(),
        profile.education.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(hit)
        || profile
            .birthdate
            .map(|date| hit(&date.to_string()))
            .unwrap_or(false)
}

fn compare_users(a: &User, b: &User, sort: UserSortField) -> Ordering {
    let primary = match sort {
        UserSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        UserSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        UserSortField::Name => a.name.cmp(&b.name),
        UserSortField::Email => a.email.cmp(&b.email),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

/// Every operation takes one lock, so each call is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend(anyhow!("memory store lock poisoned")))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: NewSession) -> Result<Session, StoreError> {
        let mut tables = self.lock()?;
        if tables
            .sessions
            .values()
            .any(|s| s.refresh_token == session.refresh_token)
        {
            return Err(StoreError::Backend(anyhow!("duplicate refresh token")));
        }
        tables.last_session_id += 1;
        let now = Utc::now();
        let row = Session {
            id: tables.last_session_id,
            principal_id: session.principal_id,
            refresh_token: session.refresh_token,
            expires_at: session.expires_at,
            client_id: session.client_id,
            client_name: session.client_name,
            created_at: now,
            updated_at: now,
        };
        tables.sessions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_session_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.refresh_token == refresh_token)
            .cloned())
    }

    async fn find_session_by_id(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.lock()?.sessions.get(&id).cloned())
    }

    async fn list_sessions_for_principal(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<Session>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .sessions
            .values()
            .rev()
            .filter(|s| s.principal_id == principal_id)
            .cloned()
            .collect())
    }

    async fn session_ids_oldest_first(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<SessionId>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .sessions
            .values()
            .filter(|s| s.principal_id == principal_id)
            .map(|s| s.id)
            .collect())
    }

    async fn rotate_refresh_token(
        &self,
        id: SessionId,
        current: &str,
        replacement: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables.sessions.get_mut(&id) {
            Some(session) if session.refresh_token == current => {
                session.refresh_token = replacement.to_string();
                session.expires_at = expires_at;
                session.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        Ok(self.lock()?.sessions.remove(&id).is_some())
    }

    async fn delete_sessions(&self, ids: &[SessionId]) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let removed = ids
            .iter()
            .filter(|id| tables.sessions.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.lock()?;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::EmailTaken);
        }
        let now = Utc::now();
        let row = User {
            id: PrincipalId::new(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            email_verified: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_user_by_id(&self, id: PrincipalId) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let mut tables = self.lock()?;
        if tables
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::EmailTaken);
        }
        let row = tables
            .users
            .get_mut(&user.id)
            .ok_or_else(|| StoreError::Backend(anyhow!("user {} not found", user.id)))?;
        row.name = user.name.clone();
        row.email = user.email.clone();
        row.email_verified = user.email_verified;
        row.password_hash = user.password_hash.clone();
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn list_users(&self, filter: &UserListFilter) -> Result<(Vec<User>, i64), StoreError> {
        let tables = self.lock()?;
        let needle = filter.search.as_deref().map(str::to_lowercase);
        let mut matched: Vec<&User> = tables
            .users
            .values()
            .filter(|user| match needle.as_deref() {
                Some(needle) => user_matches(user, tables.profiles.get(&user.id), needle),
                None => true,
            })
            .collect();
        matched.sort_by(|a, b| {
            let ordering = compare_users(a, b, filter.sort);
            match filter.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(filter.page.offset() as usize)
            .take(filter.page.page_size as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn find_profile(&self, user_id: PrincipalId) -> Result<Option<Profile>, StoreError> {
        Ok(self.lock()?.profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile, StoreError> {
        let mut tables = self.lock()?;
        tables.profiles.insert(profile.user_id, profile.clone());
        Ok(profile.clone())
    }

    async fn latest_code(
        &self,
        user_id: PrincipalId,
        purpose: CodePurpose,
    ) -> Result<Option<OneTimeCode>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .codes
            .iter()
            .filter(|row| row.purpose == purpose && row.code.user_id == user_id)
            .map(|row| &row.code)
            .max_by_key(|code| code.created_at)
            .cloned())
    }

    async fn insert_code(&self, code: NewOneTimeCode) -> Result<OneTimeCode, StoreError> {
        let row = OneTimeCode {
            id: Uuid::new_v4(),
            user_id: code.user_id,
            code_hash: code.code_hash,
            failed_attempts: 0,
            created_at: Utc::now(),
        };
        self.lock()?.codes.push(CodeRow {
            purpose: code.purpose,
            code: row.clone(),
        });
        Ok(row)
    }

    async fn record_failed_attempt(&self, id: Uuid) -> Result<Option<i32>, StoreError> {
        let mut tables = self.lock()?;
        Ok(tables
            .codes
            .iter_mut()
            .find(|row| row.code.id == id)
            .map(|row| {
                row.code.failed_attempts += 1;
                row.code.failed_attempts
            }))
    }

    async fn delete_codes(
        &self,
        user_id: PrincipalId,
        purpose: CodePurpose,
    ) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let before = tables.codes.len();
        tables
            .codes
            .retain(|row| !(row.purpose == purpose && row.code.user_id == user_id));
        Ok((before - tables.codes.len()) as u64)
    }
}
