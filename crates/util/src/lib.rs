//! # Tempo Utility Crate
//!
//! Leaf helpers shared across the sequencer: 14-digit datestamp arithmetic,
//! node-path normalization, and delimiter-based token extraction. Nothing in
//! here knows about flow files, resource files, or the resolution engine.

pub mod datestamp;
pub mod paths;
pub mod tokens;

pub use datestamp::{DatestampError, day_of_week, hour_of, increment_datestamp, pad_datestamp};
pub use paths::{normalize_node_path, path_leaf, resolve_relative_path};
pub use tokens::extract_token;
