//! Structured error types shared across the MKID calibration crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`MkidError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, fingerprints, pixel ranges).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the calibration engine.
///
/// Per-pixel fit failures are not represented here: they are recorded as
/// tagged reasons inside the solution body and never abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum MkidError {
    /// Raw photon data for the requested coverage could not be read.
    #[error("data unavailable: {0}")]
    DataUnavailable(ErrorInfo),
    /// A stored solution failed a provenance or integrity re-check.
    #[error("cache inconsistency: {0}")]
    CacheInconsistency(ErrorInfo),
    /// Invalid configuration or dataset description.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Solution store index or artifact I/O failures.
    #[error("store error: {0}")]
    Store(ErrorInfo),
    /// Run-level fitter misuse (never a single bad pixel).
    #[error("fit error: {0}")]
    Fit(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl MkidError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            MkidError::DataUnavailable(info)
            | MkidError::CacheInconsistency(info)
            | MkidError::Config(info)
            | MkidError::Store(info)
            | MkidError::Fit(info)
            | MkidError::Serde(info) => info,
        }
    }

    /// Shorthand for a [`MkidError::DataUnavailable`] with a plain message.
    pub fn data_unavailable(code: &str, message: impl Into<String>) -> Self {
        MkidError::DataUnavailable(ErrorInfo::new(code, message))
    }
}
