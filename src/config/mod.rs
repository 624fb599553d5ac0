use serde::Deserialize;
use std::env;

use crate::services::{DEFAULT_LOCK_MINUTES, DEFAULT_MAX_FAILED_ATTEMPTS};

#[derive(Debug, Clone, thiserror::Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(pub String);

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub port: u16,
    /// Public base URL used in mail links.
    pub base_url: String,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub smtp: SmtpConfig,
    pub google: OAuthProviderConfig,
    pub github: OAuthProviderConfig,
    pub lockout: LockoutConfig,
    pub session: SessionConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Hex-encoded 32-byte key for encrypting second-factor secrets at rest.
    pub encryption_key: String,
    pub allowed_origins: Vec<String>,
    /// Issuer label baked into TOTP provisioning URIs.
    pub totp_issuer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Where the callback sends the browser after a completed login.
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    pub max_failed_attempts: u32,
    pub lock_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 0 = sessions never expire on their own.
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: bool,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str.parse().map_err(ConfigError)?;
        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("fleetgate-auth"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: parse_env("PORT", Some("8080"), is_prod)?,
            base_url: get_env("BASE_URL", Some("http://localhost:8080"), is_prod)?,
            database: DatabaseConfig {
                url: get_env(
                    "DATABASE_URL",
                    Some("postgres://localhost/fleetgate_auth"),
                    is_prod,
                )?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            security: SecurityConfig {
                // Dev-only fallback; production must provide a real key.
                encryption_key: get_env(
                    "SECRET_ENCRYPTION_KEY",
                    Some("0000000000000000000000000000000000000000000000000000000000000000"),
                    is_prod,
                )?,
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                totp_issuer: get_env("TOTP_ISSUER", Some("FleetGate"), is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                port: parse_env("SMTP_PORT", Some("587"), is_prod)?,
                username: get_env("SMTP_USERNAME", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_address: get_env(
                    "SMTP_FROM_ADDRESS",
                    Some("no-reply@localhost"),
                    is_prod,
                )?,
            },
            google: OAuthProviderConfig {
                client_id: get_env("GOOGLE_CLIENT_ID", Some(""), is_prod)?,
                client_secret: get_env("GOOGLE_CLIENT_SECRET", Some(""), is_prod)?,
                redirect_uri: get_env(
                    "GOOGLE_REDIRECT_URI",
                    Some("http://localhost:8080/auth/oauth/google/callback"),
                    is_prod,
                )?,
                frontend_url: get_env("FRONTEND_URL", Some("http://localhost:3000"), is_prod)?,
            },
            github: OAuthProviderConfig {
                client_id: get_env("GITHUB_CLIENT_ID", Some(""), is_prod)?,
                client_secret: get_env("GITHUB_CLIENT_SECRET", Some(""), is_prod)?,
                redirect_uri: get_env(
                    "GITHUB_REDIRECT_URI",
                    Some("http://localhost:8080/auth/oauth/github/callback"),
                    is_prod,
                )?,
                frontend_url: get_env("FRONTEND_URL", Some("http://localhost:3000"), is_prod)?,
            },
            lockout: LockoutConfig {
                max_failed_attempts: parse_env(
                    "LOCKOUT_MAX_FAILED_ATTEMPTS",
                    Some(&DEFAULT_MAX_FAILED_ATTEMPTS.to_string()),
                    is_prod,
                )?,
                lock_minutes: parse_env(
                    "LOCKOUT_MINUTES",
                    Some(&DEFAULT_LOCK_MINUTES.to_string()),
                    is_prod,
                )?,
            },
            session: SessionConfig {
                ttl_days: parse_env("SESSION_TTL_DAYS", Some("30"), is_prod)?,
            },
            swagger: SwaggerConfig {
                enabled: parse_env("ENABLE_SWAGGER", Some("true"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError("PORT must be greater than 0".to_string()));
        }

        if self.security.encryption_key.len() != 64
            || hex::decode(&self.security.encryption_key).is_err()
        {
            return Err(ConfigError(
                "SECRET_ENCRYPTION_KEY must be 32 bytes, hex-encoded".to_string(),
            ));
        }

        if self.lockout.max_failed_attempts == 0 {
            return Err(ConfigError(
                "LOCKOUT_MAX_FAILED_ATTEMPTS must be positive".to_string(),
            ));
        }

        if self.lockout.lock_minutes <= 0 {
            return Err(ConfigError("LOCKOUT_MINUTES must be positive".to_string()));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(ConfigError(
                    "Wildcard CORS origin not allowed in production".to_string(),
                ));
            }

            if self.security.encryption_key.chars().all(|c| c == '0') {
                return Err(ConfigError(
                    "SECRET_ENCRYPTION_KEY must not be the dev placeholder in production"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(ConfigError(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(ConfigError(format!("{} is required but not set", key)))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .parse()
        .map_err(|e: T::Err| ConfigError(format!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
