//! Process configuration, read from environment variables.
//!
//! ```bash
//! BIND_ADDR=0.0.0.0:8080
//! PUBLIC_BASE_URL=https://app.example.com   # accept links point here
//! DATABASE_URL=postgres://...               # unset: in-memory stores
//! SESSION_SECRET=...                        # HS256 secret of session tokens
//! INVITATION_TTL_DAYS=7                     # 1..=365
//! INVITATION_RESEND_COOLDOWN_SECS=60        # 0..=86400
//! NOTIFIER_TIMEOUT_MS=5000
//! LOG_FORMAT=json                           # or "pretty"
//! BOOTSTRAP_ADMIN_EMAIL=ops@example.com     # optional; registered as ADMIN at startup
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;

use atelier_invitations::InvitationPolicy;
use atelier_observability::LogFormat;

const DEV_SESSION_SECRET: &str = "dev-secret";

/// Upper bounds keep `now + ttl` and `sent_at + cooldown` far from chrono's range limits.
const MAX_INVITATION_TTL_DAYS: i64 = 365;
const MAX_RESEND_COOLDOWN_SECS: i64 = 86_400;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub public_base_url: String,
    pub database_url: Option<String>,
    pub session_secret: String,
    pub invitation_policy: InvitationPolicy,
    pub notifier_timeout: Duration,
    pub log_format: LogFormat,
    pub bootstrap_admin_email: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, so tests never touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(&get, "BIND_ADDR", "0.0.0.0:8080".parse().ok())?;
        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();
        let database_url = get("DATABASE_URL");

        let session_secret = get("SESSION_SECRET").unwrap_or_else(|| DEV_SESSION_SECRET.to_string());

        let ttl_days: i64 = parse_or(&get, "INVITATION_TTL_DAYS", Some(7))?;
        if !(1..=MAX_INVITATION_TTL_DAYS).contains(&ttl_days) {
            return Err(invalid(
                "INVITATION_TTL_DAYS",
                format!("must be between 1 and {MAX_INVITATION_TTL_DAYS}"),
            ));
        }
        let ttl = TimeDelta::try_days(ttl_days).ok_or_else(|| invalid("INVITATION_TTL_DAYS", "out of range"))?;

        let cooldown_secs: i64 = parse_or(&get, "INVITATION_RESEND_COOLDOWN_SECS", Some(60))?;
        if !(0..=MAX_RESEND_COOLDOWN_SECS).contains(&cooldown_secs) {
            return Err(invalid(
                "INVITATION_RESEND_COOLDOWN_SECS",
                format!("must be between 0 and {MAX_RESEND_COOLDOWN_SECS}"),
            ));
        }
        let resend_cooldown = TimeDelta::try_seconds(cooldown_secs)
            .ok_or_else(|| invalid("INVITATION_RESEND_COOLDOWN_SECS", "out of range"))?;
        let notifier_timeout_ms: u64 = parse_or(&get, "NOTIFIER_TIMEOUT_MS", Some(5000))?;

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| invalid("LOG_FORMAT", e))?,
            None => LogFormat::Json,
        };

        Ok(Self {
            bind_addr,
            public_base_url,
            database_url,
            session_secret,
            invitation_policy: InvitationPolicy { ttl, resend_cooldown },
            notifier_timeout: Duration::from_millis(notifier_timeout_ms),
            log_format,
            bootstrap_admin_email: get("BOOTSTRAP_ADMIN_EMAIL"),
        })
    }
}

impl AppConfig {
    /// True when no `SESSION_SECRET` was configured.
    pub fn uses_dev_session_secret(&self) -> bool {
        self.session_secret == DEV_SESSION_SECRET
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| invalid(key, e)),
        None => default.ok_or_else(|| invalid(key, "missing")),
    }
}

fn invalid(key: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}
