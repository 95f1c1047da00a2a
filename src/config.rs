use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// SMTP settings. Without a host, outgoing mail is only logged.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    pub owner_email: String,
    pub owner_password: String,
    pub client_email: String,
    pub client_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub seed: SeedConfig,
    pub public_base_url: String,
    pub reset_ttl_minutes: i64,
    /// When set, reassignment rejects targets that are not staff accounts.
    pub reassign_require_staff: bool,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: env_or("JWT_ISSUER", "timesheet-portal"),
            audience: env_or("JWT_AUDIENCE", "timesheet-portal-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60 * 24 * 7),
        };
        let mail = MailConfig {
            host: std::env::var("EMAIL_HOST").ok().filter(|v| !v.is_empty()),
            port: env_parse("EMAIL_PORT", 587),
            username: std::env::var("EMAIL_USER").ok(),
            password: std::env::var("EMAIL_PASS").ok(),
            from: env_or("MAIL_FROM", "no-reply@timesheet-portal.local"),
        };
        let seed = SeedConfig {
            owner_email: env_or("OWNER_EMAIL", "owner@example.com"),
            owner_password: env_or("OWNER_PASSWORD", "ownerpass"),
            client_email: env_or("SEED_CLIENT_EMAIL", "client@example.com"),
            client_password: env_or("SEED_CLIENT_PASSWORD", "clientpass"),
        };
        Ok(Self {
            database_url,
            jwt,
            mail,
            seed,
            public_base_url: env_or("PUBLIC_BASE_URL", "http://localhost:8080"),
            reset_ttl_minutes: env_parse("RESET_TTL_MINUTES", 60),
            reassign_require_staff: env_parse("REASSIGN_REQUIRE_STAFF", false),
        })
    }

    /// Link embedded in reset emails.
    pub fn reset_link(&self, token: &str) -> String {
        format!(
            "{}/reset.html?token={}",
            self.public_base_url.trim_end_matches('/'),
            token
        )
    }
}
