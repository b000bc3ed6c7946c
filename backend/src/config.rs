use anyhow::{anyhow, Context};
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use crate::services::admission::SessionCeiling;

/// Upper bound for either token lifetime (ten years).
pub const MAX_TOKEN_TTL_SECONDS: u64 = 315_360_000;
const MAX_CODE_WINDOW_MINUTES: i64 = 525_600;
const MAX_CODE_TTL_HOURS: i64 = 8_760;

#[derive(Debug, Clone)]
pub struct Config {
    /// When unset the process runs against the in-process store.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_private_key_path: PathBuf,
    pub jwt_public_key_path: PathBuf,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
    pub max_sessions_per_principal: SessionCeiling,
    pub auth_scheme: String,
    pub client_header: String,
    pub clients_file: PathBuf,
    pub store_timeout_ms: u64,
    pub password_reset_throttle_minutes: i64,
    pub password_reset_code_ttl_hours: i64,
    pub email_verification_throttle_minutes: i64,
    pub email_verification_code_ttl_hours: i64,
    /// Wrong guesses tolerated before a one-time code is discarded.
    pub one_time_code_max_attempts: i32,
    pub cache: CacheConfig,
}

#[derive(Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub redis_url: Option<String>,
    pub redis_pool_size: u32,
    pub redis_connect_timeout: u64,
    pub encryption_key: Option<String>,
    pub user_prefix: String,
    pub profile_prefix: String,
    pub user_ttl_seconds: u64,
    pub profile_ttl_seconds: u64,
    pub timeout_ms: u64,
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("enabled", &self.enabled)
            .field("redis_url", &self.redis_url.as_deref().map(mask_secret))
            .field("redis_pool_size", &self.redis_pool_size)
            .field("redis_connect_timeout", &self.redis_connect_timeout)
            .field(
                "encryption_key",
                &self.encryption_key.as_deref().map(mask_secret),
            )
            .field("user_prefix", &self.user_prefix)
            .field("profile_prefix", &self.profile_prefix)
            .field("user_ttl_seconds", &self.user_ttl_seconds)
            .field("profile_ttl_seconds", &self.profile_ttl_seconds)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            redis_url: None,
            redis_pool_size: 10,
            redis_connect_timeout: 5,
            encryption_key: None,
            user_prefix: "user".to_string(),
            profile_prefix: "profile".to_string(),
            user_ttl_seconds: 300,
            profile_ttl_seconds: 300,
            timeout_ms: 500,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Every numeric setting that is present but unparsable is an error; the
    /// process must not boot with a silently defaulted limit.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let optional = |key: &str| -> Option<String> {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let max_sessions_raw = text("MAX_SESSIONS_PER_PRINCIPAL", "5");
        let max_sessions_per_principal = SessionCeiling::parse(&max_sessions_raw)
            .map_err(|_| {
                anyhow!(
                    "Invalid MAX_SESSIONS_PER_PRINCIPAL value: {}",
                    max_sessions_raw
                )
            })?;

        let cache = CacheConfig {
            enabled: parse_var(&lookup, "CACHE_ENABLED", false)?,
            redis_url: optional("REDIS_URL"),
            redis_pool_size: parse_var(&lookup, "REDIS_POOL_SIZE", 10)?,
            redis_connect_timeout: parse_var(&lookup, "REDIS_CONNECT_TIMEOUT", 5)?,
            encryption_key: optional("CACHE_ENCRYPTION_KEY"),
            user_prefix: text("USER_CACHE_PREFIX", "user"),
            profile_prefix: text("PROFILE_CACHE_PREFIX", "profile"),
            user_ttl_seconds: parse_var(&lookup, "USER_CACHE_TTL_SECONDS", 300)?,
            profile_ttl_seconds: parse_var(&lookup, "PROFILE_CACHE_TTL_SECONDS", 300)?,
            timeout_ms: parse_var(&lookup, "CACHE_TIMEOUT_MS", 500)?,
        };

        if cache.enabled {
            if cache.redis_url.is_none() {
                return Err(anyhow!("CACHE_ENABLED is set but REDIS_URL is missing"));
            }
            match cache.encryption_key.as_deref() {
                Some(key) if key.len() == 32 => {}
                Some(_) => return Err(anyhow!("CACHE_ENCRYPTION_KEY must be exactly 32 bytes")),
                None => {
                    return Err(anyhow!(
                        "CACHE_ENABLED is set but CACHE_ENCRYPTION_KEY is missing"
                    ))
                }
            }
        }

        let config = Config {
            database_url: optional("DATABASE_URL"),
            bind_addr: text("BIND_ADDR", "0.0.0.0:8080"),
            jwt_issuer: text("JWT_ISSUER", "usercore"),
            jwt_audience: text("JWT_AUDIENCE", "usercore-clients"),
            jwt_private_key_path: PathBuf::from(text("JWT_PRIVATE_KEY_PATH", "keys/private.pem")),
            jwt_public_key_path: PathBuf::from(text("JWT_PUBLIC_KEY_PATH", "keys/public.pem")),
            access_token_ttl_seconds: parse_var(&lookup, "ACCESS_TOKEN_TTL_SECONDS", 900)?,
            refresh_token_ttl_seconds: parse_var(&lookup, "REFRESH_TOKEN_TTL_SECONDS", 2_592_000)?,
            max_sessions_per_principal,
            auth_scheme: text("AUTH_SCHEME", "Bearer"),
            client_header: text("CLIENT_HEADER", "x-client-id").to_ascii_lowercase(),
            clients_file: PathBuf::from(text("CLIENTS_FILE", "clients.json")),
            store_timeout_ms: parse_var(&lookup, "STORE_TIMEOUT_MS", 5_000)?,
            password_reset_throttle_minutes: parse_var(
                &lookup,
                "PASSWORD_RESET_THROTTLE_MINUTES",
                15,
            )?,
            password_reset_code_ttl_hours: parse_var(&lookup, "PASSWORD_RESET_CODE_TTL_HOURS", 24)?,
            email_verification_throttle_minutes: parse_var(
                &lookup,
                "EMAIL_VERIFICATION_THROTTLE_MINUTES",
                3,
            )?,
            email_verification_code_ttl_hours: parse_var(
                &lookup,
                "EMAIL_VERIFICATION_CODE_TTL_HOURS",
                24,
            )?,
            one_time_code_max_attempts: parse_var(&lookup, "ONE_TIME_CODE_MAX_ATTEMPTS", 5)?,
            cache,
        };

        check_token_ttl("ACCESS_TOKEN_TTL_SECONDS", config.access_token_ttl_seconds)?;
        check_token_ttl("REFRESH_TOKEN_TTL_SECONDS", config.refresh_token_ttl_seconds)?;
        check_range(
            "PASSWORD_RESET_THROTTLE_MINUTES",
            config.password_reset_throttle_minutes,
            0,
            MAX_CODE_WINDOW_MINUTES,
        )?;
        check_range(
            "EMAIL_VERIFICATION_THROTTLE_MINUTES",
            config.email_verification_throttle_minutes,
            0,
            MAX_CODE_WINDOW_MINUTES,
        )?;
        check_range(
            "PASSWORD_RESET_CODE_TTL_HOURS",
            config.password_reset_code_ttl_hours,
            1,
            MAX_CODE_TTL_HOURS,
        )?;
        check_range(
            "EMAIL_VERIFICATION_CODE_TTL_HOURS",
            config.email_verification_code_ttl_hours,
            1,
            MAX_CODE_TTL_HOURS,
        )?;
        check_range(
            "ONE_TIME_CODE_MAX_ATTEMPTS",
            i64::from(config.one_time_code_max_attempts),
            1,
            100,
        )?;

        Ok(config)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn check_token_ttl(key: &str, seconds: u64) -> anyhow::Result<()> {
    if seconds == 0 {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    if seconds > MAX_TOKEN_TTL_SECONDS {
        return Err(anyhow!(
            "{} must not exceed {} seconds",
            key,
            MAX_TOKEN_TTL_SECONDS
        ));
    }
    Ok(())
}

fn check_range(key: &str, value: i64, min: i64, max: i64) -> anyhow::Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(anyhow!("{} must be between {} and {}", key, min, max))
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).map(|value| value.trim().to_string()) {
        Some(value) if !value.is_empty() => value
            .parse()
            .with_context(|| format!("Invalid {} value: {}", key, value)),
        _ => Ok(default),
    }
}

pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = Config::from_lookup(lookup_from(&[])).expect("config");
        assert_eq!(config.auth_scheme, "Bearer");
        assert_eq!(config.client_header, "x-client-id");
        assert_eq!(config.access_token_ttl_seconds, 900);
        assert_eq!(config.max_sessions_per_principal.get(), 5);
        assert!(!config.cache.enabled);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn non_numeric_session_ceiling_refuses_to_boot() {
        let err = Config::from_lookup(lookup_from(&[("MAX_SESSIONS_PER_PRINCIPAL", "lots")]))
            .expect_err("must fail");
        assert!(err.to_string().contains("MAX_SESSIONS_PER_PRINCIPAL"));
    }

    #[test]
    fn malformed_ttl_refuses_to_boot() {
        let result = Config::from_lookup(lookup_from(&[("ACCESS_TOKEN_TTL_SECONDS", "15m")]));
        assert!(result.is_err());
    }

    #[test]
    fn out_of_range_token_lifetimes_refuse_to_boot() {
        let err = Config::from_lookup(lookup_from(&[(
            "REFRESH_TOKEN_TTL_SECONDS",
            "9000000000000000",
        )]))
        .expect_err("must fail");
        assert!(err.to_string().contains("REFRESH_TOKEN_TTL_SECONDS"));

        let err = Config::from_lookup(lookup_from(&[("ACCESS_TOKEN_TTL_SECONDS", "0")]))
            .expect_err("must fail");
        assert!(err.to_string().contains("ACCESS_TOKEN_TTL_SECONDS"));

        let config = Config::from_lookup(lookup_from(&[(
            "REFRESH_TOKEN_TTL_SECONDS",
            "315360000",
        )]))
        .expect("ten years is accepted");
        assert_eq!(config.refresh_token_ttl_seconds, MAX_TOKEN_TTL_SECONDS);
    }

    #[test]
    fn code_windows_and_attempts_are_range_checked() {
        let config = Config::from_lookup(lookup_from(&[])).expect("config");
        assert_eq!(config.email_verification_throttle_minutes, 3);
        assert_eq!(config.one_time_code_max_attempts, 5);

        for (key, value) in [
            ("PASSWORD_RESET_THROTTLE_MINUTES", "-1"),
            ("EMAIL_VERIFICATION_THROTTLE_MINUTES", "9223372036854775807"),
            ("PASSWORD_RESET_CODE_TTL_HOURS", "0"),
            ("EMAIL_VERIFICATION_CODE_TTL_HOURS", "100000000"),
            ("ONE_TIME_CODE_MAX_ATTEMPTS", "0"),
        ] {
            let err = Config::from_lookup(lookup_from(&[(key, value)])).expect_err(key);
            assert!(err.to_string().contains(key), "{}", err);
        }
    }

    #[test]
    fn enabled_cache_requires_a_32_byte_key() {
        let result = Config::from_lookup(lookup_from(&[
            ("CACHE_ENABLED", "true"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
            ("CACHE_ENCRYPTION_KEY", "too-short"),
        ]));
        assert!(result.is_err());

        let config = Config::from_lookup(lookup_from(&[
            ("CACHE_ENABLED", "true"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
            ("CACHE_ENCRYPTION_KEY", "0123456789abcdef0123456789abcdef"),
        ]))
        .expect("config");
        assert!(config.cache.enabled);
    }

    #[test]
    fn cache_debug_output_masks_the_encryption_key() {
        let mut cache = CacheConfig::disabled();
        cache.encryption_key = Some("0123456789abcdef0123456789abcdef".to_string());
        let rendered = format!("{:?}", cache);
        assert!(!rendered.contains("0123456789abcdef0123456789abcdef"));
        assert!(rendered.contains("0123***"));
    }
}
