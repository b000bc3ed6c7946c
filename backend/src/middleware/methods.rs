//! Which methods require an access credential.

use std::collections::HashMap;

pub const AUTH_SIGN_UP: &str = "auth.sign_up";
pub const AUTH_SIGN_IN: &str = "auth.sign_in";
pub const AUTH_REFRESH_TOKEN: &str = "auth.refresh_token";
pub const AUTH_RESET_PASSWORD: &str = "auth.reset_password";
pub const AUTH_RESET_PASSWORD_CONFIRM: &str = "auth.reset_password_confirm";
pub const SESSION_LIST: &str = "session.list";
pub const SESSION_DELETE: &str = "session.delete";
pub const SESSION_SIGN_OUT: &str = "session.sign_out";
pub const USER_GET: &str = "user.get";
pub const USER_GET_PROFILE: &str = "user.get_profile";
pub const USER_UPDATE: &str = "user.update";
pub const USER_CHANGE_EMAIL: &str = "user.change_email";
pub const USER_CHANGE_PASSWORD: &str = "user.change_password";
pub const USER_LIST: &str = "user.list";
pub const USER_VERIFY_TOKEN: &str = "user.verify_token";
pub const USER_SEND_VERIFICATION_CODE: &str = "user.send_verification_code";
pub const USER_VERIFY_EMAIL: &str = "user.verify_email";

const PUBLIC: &[&str] = &[
    AUTH_SIGN_UP,
    AUTH_SIGN_IN,
    AUTH_REFRESH_TOKEN,
    AUTH_RESET_PASSWORD,
    AUTH_RESET_PASSWORD_CONFIRM,
];

const PROTECTED: &[&str] = &[
    SESSION_LIST,
    SESSION_DELETE,
    SESSION_SIGN_OUT,
    USER_GET,
    USER_GET_PROFILE,
    USER_UPDATE,
    USER_CHANGE_EMAIL,
    USER_CHANGE_PASSWORD,
    USER_LIST,
    USER_VERIFY_TOKEN,
    USER_SEND_VERIFICATION_CODE,
    USER_VERIFY_EMAIL,
];

/// Method name to "authorization required". Unlisted methods require it.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    entries: HashMap<&'static str, bool>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let table = PUBLIC
            .iter()
            .fold(Self::new(), |table, method| table.public(method));
        PROTECTED
            .iter()
            .fold(table, |table, method| table.protected(method))
    }

    pub fn public(mut self, method: &'static str) -> Self {
        self.entries.insert(method, false);
        self
    }

    pub fn protected(mut self, method: &'static str) -> Self {
        self.entries.insert(method, true);
        self
    }

    pub fn requires_authorization(&self, method: &str) -> bool {
        self.entries.get(method).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_marks_auth_methods_public() {
        let table = MethodTable::standard();
        assert!(!table.requires_authorization(AUTH_SIGN_IN));
        assert!(!table.requires_authorization(AUTH_REFRESH_TOKEN));
        assert!(table.requires_authorization(SESSION_LIST));
        assert!(table.requires_authorization(USER_CHANGE_PASSWORD));
        assert!(table.requires_authorization(USER_LIST));
        assert!(table.requires_authorization(USER_VERIFY_TOKEN));
        assert!(table.requires_authorization(USER_SEND_VERIFICATION_CODE));
        assert!(table.requires_authorization(USER_VERIFY_EMAIL));
    }

    #[test]
    fn later_entries_override_earlier_ones() {
        let table = MethodTable::standard().public(USER_LIST);
        assert!(!table.requires_authorization(USER_LIST));
        assert!(table.requires_authorization(USER_GET));
    }

    #[test]
    fn unknown_methods_require_authorization() {
        assert!(MethodTable::standard().requires_authorization("admin.purge"));
        assert!(MethodTable::new().requires_authorization(AUTH_SIGN_IN));
    }
}
