//! Principals, their profiles, and the request/response payloads that touch them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::pagination::{PageMetadata, PageRequest, SortDirection};
use crate::types::PrincipalId;
use crate::validation::rules;

#[derive(Debug, Clone, FromRow)]
/// Database representation of a principal.
pub struct User {
    pub id: PrincipalId,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public-facing user data; also the shape kept in the identity cache.
pub struct UserResponse {
    pub id: PrincipalId,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            email_verified: user.email_verified,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub user_id: PrincipalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Profile {
    pub fn empty(user_id: PrincipalId) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    /// Applies only the fields present in the update.
    pub fn apply(&mut self, changes: &UpdateUserRequest) -> Result<(), chrono::ParseError> {
        if let Some(picture) = &changes.picture {
            self.picture = Some(picture.clone());
        }
        if let Some(gender) = &changes.gender {
            self.gender = Some(gender.clone());
        }
        if let Some(education) = &changes.education {
            self.education = Some(education.clone());
        }
        if let Some(birthdate) = &changes.birthdate {
            self.birthdate = Some(NaiveDate::parse_from_str(birthdate, "%Y-%m-%d")?);
        }
        if let Some(locale) = &changes.locale {
            self.locale = Some(locale.clone());
        }
        if let Some(timezone) = &changes.timezone {
            self.timezone = Some(timezone.clone());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(length(min = 3, max = 64))]
    pub name: String,
    #[validate(email, length(min = 5, max = 64))]
    pub email: String,
    #[validate(custom(function = "rules::validate_password_strength"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email, length(min = 5, max = 64))]
    pub email: String,
    #[validate(length(min = 1, max = 64))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignOutRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email, length(min = 5, max = 64))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordConfirmRequest {
    #[validate(email, length(min = 5, max = 64))]
    pub email: String,
    #[validate(length(min = 1))]
    pub code: String,
    #[validate(custom(function = "rules::validate_password_strength"))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
/// Partial update of the caller's name and profile.
pub struct UpdateUserRequest {
    #[validate(length(min = 2, max = 50))]
    pub name: Option<String>,
    #[validate(length(max = 2048))]
    pub picture: Option<String>,
    #[validate(custom(function = "rules::validate_gender"))]
    pub gender: Option<String>,
    #[validate(custom(function = "rules::validate_birthdate"))]
    pub birthdate: Option<String>,
    #[validate(length(max = 128))]
    pub education: Option<String>,
    #[validate(length(max = 16))]
    pub locale: Option<String>,
    #[validate(length(max = 64))]
    pub timezone: Option<String>,
}

impl UpdateUserRequest {
    pub fn touches_profile(&self) -> bool {
        self.picture.is_some()
            || self.gender.is_some()
            || self.birthdate.is_some()
            || self.education.is_some()
            || self.locale.is_some()
            || self.timezone.is_some()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangeEmailRequest {
    #[validate(email, length(min = 5, max = 64))]
    pub email: String,
    #[validate(length(min = 1, max = 64))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, max = 64))]
    pub current_password: String,
    #[validate(custom(function = "rules::validate_password_strength"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyTokenRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyEmailRequest {
    #[validate(length(min = 6, max = 6))]
    pub code: String,
}

/// Columns a user listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    Email,
}

impl UserSortField {
    /// Unknown fields fall back to `created_at`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("updated_at") => UserSortField::UpdatedAt,
            Some("name") => UserSortField::Name,
            Some("email") => UserSortField::Email,
            _ => UserSortField::CreatedAt,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            UserSortField::CreatedAt => "created_at",
            UserSortField::UpdatedAt => "updated_at",
            UserSortField::Name => "name",
            UserSortField::Email => "email",
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    #[validate(length(max = 64))]
    pub search: Option<String>,
    pub order_by: Option<String>,
    pub order: Option<String>,
}

impl ListUsersQuery {
    pub fn into_filter(self) -> UserListFilter {
        UserListFilter {
            search: self
                .search
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            sort: UserSortField::parse(self.order_by.as_deref()),
            direction: SortDirection::parse(self.order.as_deref()),
            page: PageRequest::new(self.page, self.page_size),
        }
    }
}

/// Store-level listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserListFilter {
    /// Case-insensitive substring matched against name, email and profile fields.
    pub search: Option<String>,
    pub sort: UserSortField,
    pub direction: SortDirection,
    pub page: PageRequest,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub pagination: PageMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
}
