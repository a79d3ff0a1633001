//! Run logging: plain-text activity log and per-run JSON audit log, both
//! rotated by size when opened.

pub mod activity;
pub mod audit;
pub mod rotation;
