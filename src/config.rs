//! Application configuration, read once from the environment at startup.

use std::path::PathBuf;

use thiserror::Error;

/// Secret shipped for local development only.
pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set to a secure, unique value in production")]
    InsecureJwtSecret,
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("SMTP_HOST must be set when EMAIL_BACKEND=smtp")]
    MissingSmtpHost,
}

/// Which outgoing mail backend to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailBackendKind {
    Console,
    Smtp,
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub backend: EmailBackendKind,
    pub from_email: String,
    pub smtp: Option<SmtpSettings>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub bcrypt_cost: u32,
    pub password_min_length: usize,
    pub verification_code_minutes: i64,
    pub media_root: PathBuf,
    pub media_url: String,
    pub email: EmailSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3001,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            access_token_minutes: 15,
            refresh_token_days: 7,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            password_min_length: 8,
            verification_code_minutes: 5,
            media_root: PathBuf::from("media"),
            media_url: "/media".to_string(),
            email: EmailSettings {
                backend: EmailBackendKind::Console,
                from_email: "no-reply@example.com".to_string(),
                smtp: None,
            },
        }
    }
}

fn env_or(name: &str, fallback: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &'static str, fallback: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name, value: raw })
        }
        _ => Ok(fallback),
    }
}

impl AppConfig {
    /// Build the configuration from environment variables, falling back to
    /// development defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let environment = env_or("ENVIRONMENT", &defaults.environment);
        let jwt_secret = env_or("JWT_SECRET", DEFAULT_JWT_SECRET);
        if environment == "production" && jwt_secret == DEFAULT_JWT_SECRET {
            return Err(ConfigError::InsecureJwtSecret);
        }

        let backend = match env_or("EMAIL_BACKEND", "console").to_lowercase().as_str() {
            "console" => EmailBackendKind::Console,
            "smtp" => EmailBackendKind::Smtp,
            other => {
                return Err(ConfigError::InvalidValue {
                    name: "EMAIL_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) if !host.trim().is_empty() => Some(SmtpSettings {
                host,
                port: env_parse("SMTP_PORT", 587)?,
                username: std::env::var("SMTP_USERNAME").ok(),
                password: std::env::var("SMTP_PASSWORD").ok(),
            }),
            _ => None,
        };
        if backend == EmailBackendKind::Smtp && smtp.is_none() {
            return Err(ConfigError::MissingSmtpHost);
        }

        Ok(Self {
            environment,
            host: env_or("HOST", &defaults.host),
            port: env_parse("PORT", defaults.port)?,
            jwt_secret,
            access_token_minutes: env_parse("ACCESS_TOKEN_MINUTES", defaults.access_token_minutes)?,
            refresh_token_days: env_parse("REFRESH_TOKEN_DAYS", defaults.refresh_token_days)?,
            bcrypt_cost: env_parse("BCRYPT_COST", defaults.bcrypt_cost)?,
            password_min_length: env_parse("PASSWORD_MIN_LENGTH", defaults.password_min_length)?,
            verification_code_minutes: env_parse(
                "VERIFICATION_CODE_MINUTES",
                defaults.verification_code_minutes,
            )?,
            media_root: PathBuf::from(env_or("MEDIA_ROOT", "media")),
            media_url: env_or("MEDIA_URL", &defaults.media_url)
                .trim_end_matches('/')
                .to_string(),
            email: EmailSettings {
                backend,
                from_email: env_or("DEFAULT_FROM_EMAIL", &defaults.email.from_email),
                smtp,
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
