//! Typed ID wrappers for compile-time type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier of a principal (end-user account).
///
/// Carried as the `sub` claim of access credentials and stored as a native
/// `UUID` column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    /// Creates a new random ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for PrincipalId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<PrincipalId> for Uuid {
    fn from(id: PrincipalId) -> Self {
        id.0
    }
}

/// Numeric primary key of a persisted session row.
pub type SessionId = i64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_id_parses_its_display_form() {
        let id = PrincipalId::new();
        let parsed: PrincipalId = id.to_string().parse().expect("parse id");
        assert_eq!(parsed, id);
    }

    #[test]
    fn principal_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<PrincipalId>().is_err());
    }

    #[test]
    fn principal_id_serializes_as_plain_string() {
        let id = PrincipalId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id));
    }
}
