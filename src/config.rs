//! Configuration management for Palimpsest Server

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::document::StandardFont;
use crate::session::MAX_TTL;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub retention: RetentionConfig,
    pub patch: PatchConfig,
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub folder: PathBuf,
    /// Largest accepted request body, in bytes
    pub max_file_size: usize,
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Session lifetime granted by each upload or edit
    pub file_retention: Duration,
    /// Upper bound on how long the reaper sleeps while watching sessions
    pub cleanup_interval: Duration,
    /// Age after which an unregistered file is deleted
    pub orphan_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct PatchConfig {
    /// Font used when text insertion rejects the resolved font
    pub fallback_font: StandardFont,
    /// Longest a single edit may run on the blocking pool
    pub edit_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub enabled: bool,
    pub language: String,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            upload: UploadConfig {
                folder: PathBuf::from("uploads"),
                max_file_size: 16 * 1024 * 1024,
                allowed_extensions: vec!["pdf".to_string()],
            },
            retention: RetentionConfig {
                file_retention: Duration::from_secs(120),
                cleanup_interval: Duration::from_secs(60),
                orphan_grace: Duration::from_secs(120),
            },
            patch: PatchConfig {
                fallback_font: StandardFont::Helvetica,
                edit_timeout: Duration::from_secs(30),
            },
            ocr: OcrConfig {
                enabled: true,
                language: "eng".to_string(),
                timeout: Duration::from_secs(120),
            },
        }
    }
}

impl Config {
    /// Defaults overridden by whichever variables are set.
    ///
    /// Fails only when a variable is present but unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT")?.unwrap_or(defaults.server.port),
            },
            upload: UploadConfig {
                folder: env::var("UPLOAD_FOLDER")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.upload.folder),
                max_file_size: parse_var("MAX_FILE_SIZE")?.unwrap_or(defaults.upload.max_file_size),
                allowed_extensions: defaults.upload.allowed_extensions,
            },
            retention: RetentionConfig {
                file_retention: positive_secs_var("FILE_RETENTION_SECS")?
                    .unwrap_or(defaults.retention.file_retention),
                cleanup_interval: positive_secs_var("CLEANUP_INTERVAL_SECS")?
                    .unwrap_or(defaults.retention.cleanup_interval),
                orphan_grace: secs_var("ORPHAN_GRACE_SECS")?
                    .unwrap_or(defaults.retention.orphan_grace),
            },
            patch: PatchConfig {
                fallback_font: parse_var("FALLBACK_FONT")?.unwrap_or(defaults.patch.fallback_font),
                edit_timeout: positive_secs_var("EDIT_TIMEOUT_SECS")?.unwrap_or(defaults.patch.edit_timeout),
            },
            ocr: OcrConfig {
                enabled: parse_var("OCR_ENABLED")?.unwrap_or(defaults.ocr.enabled),
                language: env::var("OCR_LANGUAGE").unwrap_or(defaults.ocr.language),
                timeout: positive_secs_var("OCR_TIMEOUT_SECS")?.unwrap_or(defaults.ocr.timeout),
            },
        })
    }

    /// Whether `filename` carries an allowed extension
    pub fn is_allowed_file(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .map(|(_, ext)| {
                self.upload
                    .allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {name}: {value:?} ({reason})")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

fn parse_var<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => {
            let parsed = value.trim().parse::<T>();
            match parsed {
                Ok(parsed) => Ok(Some(parsed)),
                Err(e) => Err(ConfigError {
                    name,
                    reason: e.to_string(),
                    value,
                }),
            }
        }
        Err(_) => Ok(None),
    }
}

fn secs_var(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_var::<u64>(name)?.map(Duration::from_secs))
}

/// A duration in seconds that must be at least one and fit a session clock
fn positive_secs_var(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    match parse_var::<u64>(name)? {
        None => Ok(None),
        Some(0) => Err(ConfigError {
            name,
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        }),
        Some(secs) if Duration::from_secs(secs) > MAX_TTL => Err(ConfigError {
            name,
            value: secs.to_string(),
            reason: format!("must be at most {}", MAX_TTL.as_secs()),
        }),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
    }
}
