use std::env;
use std::path::PathBuf;

use crate::models::Role;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub node_env: String,
    pub cors_origins: Vec<String>,
    pub log_format: LogFormat,
    pub store: StoreConfig,
    pub jwt: JwtConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub roster: RosterConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: String,
    pub expiry_secs: i64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub failure_delay_ms: u64,
    pub users: Vec<Credential>,
}

/// A login identity. Passwords are only ever held as bcrypt hashes.
#[derive(Clone, Debug)]
pub struct Credential {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
    pub login_window_secs: u64,
    pub login_max_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct RosterConfig {
    pub recent_limit: usize,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn credential_from_env(user_key: &str, hash_key: &str, role: Role) -> Option<Credential> {
    let username = env::var(user_key).ok().filter(|s| !s.trim().is_empty())?;
    let password_hash = env::var(hash_key).ok().filter(|s| !s.trim().is_empty())?;
    Some(Credential {
        username: username.trim().to_string(),
        password_hash: password_hash.trim().to_string(),
        role,
    })
}

impl Config {
    pub fn from_env() -> Self {
        let users = [
            credential_from_env("ADMIN_USERNAME", "ADMIN_PASSWORD_HASH", Role::Admin),
            credential_from_env(
                "MANAGER_USERNAME",
                "MANAGER_PASSWORD_HASH",
                Role::MemberManager,
            ),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self {
            port: env_or_parse("PORT", 3000),
            node_env: env_or("NODE_ENV", "development"),
            cors_origins: env_or("CORS_ORIGINS", "http://localhost:3000")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            log_format: match env_or("LOG_FORMAT", "json").to_lowercase().as_str() {
                "compact" | "text" => LogFormat::Compact,
                _ => LogFormat::Json,
            },
            store: StoreConfig {
                data_dir: PathBuf::from(env_or("DATA_DIR", "./data")),
            },
            jwt: JwtConfig {
                secret: env_or("JWT_SECRET", "change-me-to-a-secure-random-string"),
                expiry_secs: parse_duration_to_secs(
                    &env_or("JWT_EXPIRY", "24h"),
                    DEFAULT_JWT_EXPIRY_SECS,
                ),
            },
            auth: AuthConfig {
                cookie_name: "admin_token".to_string(),
                failure_delay_ms: env_or_parse("LOGIN_FAILURE_DELAY_MS", 1000),
                users,
            },
            rate_limit: RateLimitConfig {
                window_secs: 60,
                max_requests: env_or_parse("RATE_LIMIT_MAX", 100),
                login_window_secs: login_window_secs(&env_or("LOGIN_RATE_LIMIT_WINDOW", "15m")),
                login_max_attempts: env_or_parse("LOGIN_RATE_LIMIT_MAX", 5),
            },
            roster: RosterConfig {
                recent_limit: env_or_parse("ROSTER_RECENT", 5),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.node_env == "production"
    }
}

const DEFAULT_JWT_EXPIRY_SECS: i64 = 24 * 3600;
const DEFAULT_LOGIN_WINDOW_SECS: u64 = 15 * 60;

/// Parses `45s`, `15m`, `24h`, `2d` or a bare number of seconds. Anything
/// unparsable, overflowing or not strictly positive yields `default`.
fn parse_duration_to_secs(s: &str, default: i64) -> i64 {
    let s = s.trim();
    let secs = match s.char_indices().last() {
        Some((split, unit @ ('s' | 'm' | 'h' | 'd'))) => {
            let scale = match unit {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                _ => 86_400,
            };
            s[..split]
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(|n| n.checked_mul(scale))
        }
        Some(_) => s.parse::<i64>().ok(),
        None => None,
    };
    match secs {
        Some(secs) if secs > 0 => secs,
        _ => default,
    }
}

fn login_window_secs(raw: &str) -> u64 {
    let default = DEFAULT_LOGIN_WINDOW_SECS as i64;
    u64::try_from(parse_duration_to_secs(raw, default)).unwrap_or(DEFAULT_LOGIN_WINDOW_SECS)
}
