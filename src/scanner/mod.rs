//! Working-tree inspection: file classification and version resolution.

pub mod version;
pub mod walker;
