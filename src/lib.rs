#![forbid(unsafe_code)]

//! Data Tracking System (dts): configuration drift tracking for a fleet of
//! deployed applications.
//!
//! For each monitored application instance the tool keeps a snapshot of its
//! working tree and reports how many lines changed per file since then, in
//! line protocol for a metrics collector. Which instances are tracked lives
//! in a central key-value registry.
//!
//! 1. **Identity**: an instance id is the POSIX `cksum` of the application path.
//! 2. **Reconciliation**: `init`, `status` and `deploy` cross-check the registry
//!    against the filesystem, including redeployments behind a `current` symlink.
//! 3. **Reporting**: diff counts rendered as line-protocol metrics.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use drift_tracker::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use drift_tracker::core::identity::Instance;
//! use drift_tracker::scanner::walker::{FileClassifier, WalkerConfig};
//! ```

pub mod prelude;

pub mod core;
pub mod engine;
pub mod logger;
pub mod metrics;
pub mod registry;
pub mod scanner;
pub mod snapshot;
