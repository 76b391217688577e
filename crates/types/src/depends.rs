//! Inter-node dependency records.

use serde::{Deserialize, Serialize};

/// Kind of dependency target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Dependency on another workflow node (the default).
    #[default]
    Node,
    /// Dependency expressed against an external resource.
    External,
}

/// One resolved dependency of a node, owned by its [`NodeDescriptor`].
///
/// [`NodeDescriptor`]: crate::NodeDescriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Kind of target; defaults to `node`.
    pub kind: DependencyKind,
    /// Absolute path of the target node.
    pub node_path: String,
    /// Experiment path the target lives in; empty means the current one.
    #[serde(default)]
    pub experiment: String,
    /// Status the target must reach before this node may run.
    pub status: String,
    /// Canonical `+v1+v2...` index of the target iteration, empty when the
    /// target is not loop-indexed.
    #[serde(default)]
    pub index: String,
    /// Canonical `+v1+v2...` index of the depending iteration.
    #[serde(default)]
    pub local_index: String,
    /// Hour offset applied to the target's datestamp.
    #[serde(default)]
    pub hour: String,
    /// Additional time delta applied together with `hour`.
    #[serde(default)]
    pub time_delta: String,
    /// Inter-experiment wait protocol.
    pub protocol: String,
    /// Hour gate copied from the declaration, if any.
    #[serde(default)]
    pub valid_hour: String,
    /// Day-of-week gate copied from the declaration, if any.
    #[serde(default)]
    pub valid_dow: String,
}

impl DependencyRecord {
    /// Record with the declaration defaults applied: kind `node`, protocol
    /// `polling`, status `end`.
    pub fn with_defaults(node_path: &str) -> Self {
        Self {
            kind: DependencyKind::Node,
            node_path: node_path.to_string(),
            status: "end".to_string(),
            protocol: "polling".to_string(),
            ..Default::default()
        }
    }
}
