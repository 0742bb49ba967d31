//! Process configuration.
//!
//! Secrets are read once at startup and handed to the adapters that need them.
//!
//! Secret sources, highest precedence first:
//! - `CLINIVAULT_<NAME>_FILE` (read from a file path)
//! - `/run/secrets/clinivault_<name>` (Docker/Compose secret default)
//! - `CLINIVAULT_<NAME>` (debug builds only)
//!
//! Plain settings come from the environment:
//! - `CLINIVAULT_DB_PATH` (default `clinivault.db`)
//! - `CLINIVAULT_TOKEN_TTL_MINUTES` (default 30, at most one week)
//! - `CLINIVAULT_MAX_UPLOAD_BYTES` (default 10 MiB)

use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::domain::{CipherKey, CryptoError, SigningSecret};

const DOCKER_SECRETS_DIR: &str = "/run/secrets";

pub const DEFAULT_DB_PATH: &str = "clinivault.db";
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;
pub const MAX_TOKEN_TTL_MINUTES: i64 = 7 * 24 * 60;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// A secret the process needs at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretName {
    SigningSecret,
    CipherKey,
}

impl SecretName {
    fn slug(self) -> &'static str {
        match self {
            Self::SigningSecret => "signing_secret",
            Self::CipherKey => "cipher_key",
        }
    }

    /// Dev-only environment variable holding the value itself.
    #[must_use]
    pub fn env_var(self) -> String {
        format!("CLINIVAULT_{}", self.slug().to_ascii_uppercase())
    }

    /// Environment variable naming a file that holds the value.
    #[must_use]
    pub fn file_env_var(self) -> String {
        format!("{}_FILE", self.env_var())
    }

    fn docker_file(self, secrets_dir: &Path) -> PathBuf {
        secrets_dir.join(format!("clinivault_{}", self.slug()))
    }
}

impl std::fmt::Display for SecretName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Error type for configuration loading. Raised at startup only.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing {name}: set {file_env} or mount {docker_path}")]
    MissingSecret {
        name: SecretName,
        file_env: String,
        docker_path: String,
    },

    #[error("Cannot read {name} from {path}: {source}")]
    SecretRead {
        name: SecretName,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is empty")]
    EmptySecret(SecretName),

    #[error("Invalid {name}: {source}")]
    InvalidSecret {
        name: SecretName,
        #[source]
        source: CryptoError,
    },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidSetting { var: &'static str, value: String },
}

/// Validated process configuration.
#[derive(Debug, Clone)]
pub struct ClinicConfig {
    pub db_path: PathBuf,
    pub token_ttl: chrono::Duration,
    pub max_upload_bytes: usize,
    pub signing_secret: SigningSecret,
    pub cipher_key: CipherKey,
}

impl ClinicConfig {
    /// Load from the process environment and `/run/secrets`.
    ///
    /// # Errors
    /// Returns `ConfigError` if a secret is missing or malformed or a setting
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(|var| std::env::var(var).ok(), Path::new(DOCKER_SECRETS_DIR))
    }

    /// Load using `lookup` for environment variables and `secrets_dir` in
    /// place of `/run/secrets`.
    ///
    /// # Errors
    /// Same as `from_env`.
    pub fn load<F>(lookup: F, secrets_dir: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("CLINIVAULT_DB_PATH")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DB_PATH), |v| PathBuf::from(v.trim()));

        let ttl_minutes = parse_setting(
            &lookup,
            "CLINIVAULT_TOKEN_TTL_MINUTES",
            DEFAULT_TOKEN_TTL_MINUTES,
        )?;
        let token_ttl = Some(ttl_minutes)
            .filter(|m| (1..=MAX_TOKEN_TTL_MINUTES).contains(m))
            .and_then(chrono::Duration::try_minutes)
            .ok_or_else(|| ConfigError::InvalidSetting {
                var: "CLINIVAULT_TOKEN_TTL_MINUTES",
                value: ttl_minutes.to_string(),
            })?;

        let max_upload_bytes = parse_setting(
            &lookup,
            "CLINIVAULT_MAX_UPLOAD_BYTES",
            DEFAULT_MAX_UPLOAD_BYTES,
        )?;
        if max_upload_bytes == 0 {
            return Err(ConfigError::InvalidSetting {
                var: "CLINIVAULT_MAX_UPLOAD_BYTES",
                value: "0".to_string(),
            });
        }

        let raw_secret = read_secret(&lookup, secrets_dir, SecretName::SigningSecret)?;
        let signing_secret =
            SigningSecret::new(raw_secret.as_bytes().to_vec()).map_err(|source| {
                ConfigError::InvalidSecret {
                    name: SecretName::SigningSecret,
                    source,
                }
            })?;

        let raw_key = read_secret(&lookup, secrets_dir, SecretName::CipherKey)?;
        let cipher_key =
            CipherKey::from_base64(&raw_key).map_err(|source| ConfigError::InvalidSecret {
                name: SecretName::CipherKey,
                source,
            })?;

        tracing::info!(
            "Configuration loaded (db={}, ttl={}m, signing={}, cipher={})",
            db_path.display(),
            ttl_minutes,
            signing_secret.fingerprint,
            cipher_key.fingerprint
        );

        Ok(Self {
            db_path,
            token_ttl,
            max_upload_bytes,
            signing_secret,
            cipher_key,
        })
    }
}

fn parse_setting<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidSetting { var, value: raw }),
    }
}

fn read_secret<F>(
    lookup: &F,
    secrets_dir: &Path,
    name: SecretName,
) -> Result<Zeroizing<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(&name.file_env_var()) {
        return read_secret_file(name, Path::new(path.trim()));
    }

    let docker_path = name.docker_file(secrets_dir);
    if docker_path.exists() {
        return read_secret_file(name, &docker_path);
    }

    if cfg!(debug_assertions) {
        if let Some(value) = lookup(&name.env_var()) {
            return non_empty(name, Zeroizing::new(value));
        }
    }

    Err(ConfigError::MissingSecret {
        name,
        file_env: name.file_env_var(),
        docker_path: docker_path.display().to_string(),
    })
}

fn read_secret_file(name: SecretName, path: &Path) -> Result<Zeroizing<String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::SecretRead {
        name,
        path: path.to_path_buf(),
        source,
    })?;
    let content = Zeroizing::new(content);
    non_empty(name, content)
}

fn non_empty(name: SecretName, value: Zeroizing<String>) -> Result<Zeroizing<String>, ConfigError> {
    let trimmed = value.trim_end_matches(['\n', '\r']);
    if trimmed.trim().is_empty() {
        return Err(ConfigError::EmptySecret(name));
    }
    Ok(Zeroizing::new(trimmed.to_string()))
}
