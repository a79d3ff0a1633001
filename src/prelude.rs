//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use drift_tracker::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::env::{EnvOptions, Environment};
pub use crate::core::errors::{DtsError, ErrorKind, Result};
pub use crate::core::identity::Instance;

// Scanner
pub use crate::scanner::version::{decompose, resolve_working_tree};
pub use crate::scanner::walker::{FileClassification, FileClassifier, WalkerConfig};

// Registry
pub use crate::registry::client::{HttpRegistry, MemoryRegistry, Registry};
pub use crate::registry::model::{AppRecord, MetricJobSpec, TrackedEntry, TrackingSettings};
pub use crate::registry::tree::{AppKey, RegistryTree};

// Snapshots
pub use crate::snapshot::{DiffReport, GitSnapshotStore, SnapshotStore};

// Engine
pub use crate::engine::{Action, Engine, RunArgs, RunState, StatusOutcome};
pub use crate::metrics::format_report;

// Logging
pub use crate::logger::activity::ActivityLog;
pub use crate::logger::audit::AuditLog;
