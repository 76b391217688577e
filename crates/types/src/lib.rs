//! Shared type definitions for the Tempo sequencer.
//!
//! The models defined here are the hand-off surface of a node resolution: a
//! [`NodeDescriptor`] is built once per scheduling decision by the engine and
//! returned to the caller fully populated. Ordered name/value collections use
//! `IndexMap` so that loop declaration order and dependency order survive the
//! round trip to JSON.

pub mod depends;
pub mod loop_args;
pub mod node;
pub mod validity;

pub use depends::{DependencyKind, DependencyRecord};
pub use loop_args::{LoopArgs, LoopArgsError};
pub use node::{ForEachTarget, LoopSpec, NodeDescriptor, NodeType};
pub use validity::ValidityWindow;
