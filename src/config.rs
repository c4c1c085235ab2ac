//! Environment-driven settings for the `addnmult` driver.

use std::{borrow::Cow, env, fmt, str::FromStr};

use thiserror::Error;
use tracing::Level;

use crate::codegen::{DEFAULT_FUNCTION_NAME, DEFAULT_MODULE_NAME};

const MODULE_NAME_ENV: &str = "ADDNMULT_MODULE_NAME";
const FUNCTION_NAME_ENV: &str = "ADDNMULT_FUNCTION_NAME";
const LOG_FORMAT_ENV: &str = "ADDNMULT_LOG_FORMAT";
const LOG_LEVEL_ENV: &str = "ADDNMULT_LOG_LEVEL";

const DEFAULT_LOG_LEVEL: Level = Level::WARN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    ExplicitVar,
    Default,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionSource::ExplicitVar => write!(f, "environment"),
            ResolutionSource::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log format `{0}` (expected `text` or `json`)")]
pub struct UnknownLogFormat(pub String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(UnknownLogFormat(raw.to_string())),
        }
    }
}

/// A setting value together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ResolutionSource,
}

impl<T> Resolved<T> {
    fn explicit(value: T) -> Self {
        Self { value, source: ResolutionSource::ExplicitVar }
    }

    fn fallback(value: T) -> Self {
        Self { value, source: ResolutionSource::Default }
    }
}

/// Driver settings. Each one is taken from its environment variable when that
/// is set to something non-blank and parseable, and from the default otherwise.
#[derive(Debug, Clone)]
pub struct Settings {
    module_name: Resolved<Cow<'static, str>>,
    function_name: Resolved<Cow<'static, str>>,
    log_format: Resolved<LogFormat>,
    log_level: Resolved<Level>,
}

impl Settings {
    pub fn detect() -> Self {
        Self {
            module_name: Self::name_from_env(MODULE_NAME_ENV, DEFAULT_MODULE_NAME),
            function_name: Self::name_from_env(FUNCTION_NAME_ENV, DEFAULT_FUNCTION_NAME),
            log_format: Self::parsed_from_env(LOG_FORMAT_ENV, LogFormat::Text),
            log_level: Self::parsed_from_env(LOG_LEVEL_ENV, DEFAULT_LOG_LEVEL),
        }
    }

    pub fn module_name(&self) -> &str {
        self.module_name.value.as_ref()
    }

    pub fn function_name(&self) -> &str {
        self.function_name.value.as_ref()
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format.value
    }

    pub fn log_level(&self) -> Level {
        self.log_level.value
    }

    pub fn module_name_source(&self) -> ResolutionSource {
        self.module_name.source
    }

    pub fn function_name_source(&self) -> ResolutionSource {
        self.function_name.source
    }

    fn explicit_var(key: &str) -> Option<String> {
        env::var(key).ok().and_then(|raw| {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        })
    }

    fn name_from_env(key: &str, default: &'static str) -> Resolved<Cow<'static, str>> {
        match Self::explicit_var(key) {
            Some(name) => Resolved::explicit(Cow::Owned(name)),
            None => Resolved::fallback(Cow::Borrowed(default)),
        }
    }

    fn parsed_from_env<T: FromStr>(key: &str, default: T) -> Resolved<T> {
        Self::explicit_var(key)
            .and_then(|raw| raw.parse().ok())
            .map(Resolved::explicit)
            .unwrap_or_else(|| Resolved::fallback(default))
    }
}
