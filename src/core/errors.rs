//! DTS-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DtsError>;

/// Coarse classification used by the outer caller and the audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Target or tool application absent from the registry.
    NotFound,
    /// Tracked state contradicts the registry or the request.
    Conflict,
    /// Version-managed application redeployed behind its symlink. Reported as
    /// a status outcome rather than raised, since it self-heals.
    StateDrift,
    /// Filesystem failure.
    Io,
    /// Registry unreachable or returned an unusable response.
    Transport,
    /// Registry sub-document failed to parse.
    Malformed,
    /// Configuration could not be loaded or is invalid.
    Config,
}

/// Top-level error type for the drift tracker.
#[derive(Debug, Error)]
pub enum DtsError {
    #[error("[DTS-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DTS-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DTS-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DTS-2001] target application not found in registry for instance {instance}")]
    TargetAppNotFound { instance: String },

    #[error("[DTS-2002] tool application not found in registry for instance {instance}")]
    ToolAppNotFound { instance: String },

    #[error("[DTS-2003] instance {instance} is not tracked")]
    InstanceNotTracked { instance: String },

    #[error("[DTS-2101] instance {instance} is already tracked")]
    InstanceAlreadyTracked { instance: String },

    #[error("[DTS-2102] app dirs do not match: resolved {resolved}, registry declares {declared}")]
    AppDirMismatch { resolved: String, declared: String },

    #[error("[DTS-2103] app names do not match: registry has {registry}, tracked as {tracked}")]
    AppNameMismatch { registry: String, tracked: String },

    #[error("[DTS-2104] instance {instance} is disabled")]
    InstanceDisabled { instance: String },

    #[error("[DTS-2105] version link is not a symlink: {path}")]
    NotASymlink { path: PathBuf },

    #[error("[DTS-2106] work tree must be a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("[DTS-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DTS-3002] snapshot store failure in {operation}: {details}")]
    Snapshot {
        operation: &'static str,
        details: String,
    },

    #[error("[DTS-4001] registry transport failure for {url}: {details}")]
    Transport { url: String, details: String },

    #[error("[DTS-4002] malformed registry document {key}: {details}")]
    Malformed { key: String, details: String },

    #[error("[DTS-4003] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },
}

impl DtsError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DTS-1001",
            Self::MissingConfig { .. } => "DTS-1002",
            Self::ConfigParse { .. } => "DTS-1003",
            Self::TargetAppNotFound { .. } => "DTS-2001",
            Self::ToolAppNotFound { .. } => "DTS-2002",
            Self::InstanceNotTracked { .. } => "DTS-2003",
            Self::InstanceAlreadyTracked { .. } => "DTS-2101",
            Self::AppDirMismatch { .. } => "DTS-2102",
            Self::AppNameMismatch { .. } => "DTS-2103",
            Self::InstanceDisabled { .. } => "DTS-2104",
            Self::NotASymlink { .. } => "DTS-2105",
            Self::NotADirectory { .. } => "DTS-2106",
            Self::Io { .. } => "DTS-3001",
            Self::Snapshot { .. } => "DTS-3002",
            Self::Transport { .. } => "DTS-4001",
            Self::Malformed { .. } => "DTS-4002",
            Self::Serialization { .. } => "DTS-4003",
        }
    }

    /// Error kind for the outer termination layer.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig { .. } | Self::MissingConfig { .. } | Self::ConfigParse { .. } => {
                ErrorKind::Config
            }
            Self::TargetAppNotFound { .. }
            | Self::ToolAppNotFound { .. }
            | Self::InstanceNotTracked { .. } => ErrorKind::NotFound,
            Self::InstanceAlreadyTracked { .. }
            | Self::AppDirMismatch { .. }
            | Self::AppNameMismatch { .. }
            | Self::InstanceDisabled { .. }
            | Self::NotASymlink { .. }
            | Self::NotADirectory { .. } => ErrorKind::Conflict,
            Self::Io { .. } | Self::Snapshot { .. } => ErrorKind::Io,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Malformed { .. } | Self::Serialization { .. } => ErrorKind::Malformed,
        }
    }

    /// Whether retrying might resolve the failure. Only transport errors qualify;
    /// data-integrity violations must fail fast.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for DtsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DtsError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
