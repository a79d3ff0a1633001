//! Fleet registry: node-tree model, typed record views, field pushes and transport.

pub mod client;
pub mod model;
pub mod push;
pub mod tree;
