//! The node descriptor: the mutable accumulator built by one resolution.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{DependencyRecord, LoopArgs};

/// Type of a workflow node, as declared in the flow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    /// Grouping container.
    Family,
    /// Module boundary container backed by its own flow file.
    Module,
    /// Leaf task.
    Task,
    /// Leaf task submitted repeatedly with externally supplied indices.
    NpassTask,
    /// Iteration container.
    Loop,
    /// Branching container selected from the datestamp.
    Switch,
    /// Container iterating over another node's index set.
    ForEach,
}

impl NodeType {
    /// Map a flow-definition element tag to a node type.
    pub fn from_flow_tag(tag: &str) -> Option<Self> {
        match tag {
            "FAMILY" => Some(Self::Family),
            "MODULE" => Some(Self::Module),
            "TASK" => Some(Self::Task),
            "NPASS_TASK" => Some(Self::NpassTask),
            "LOOP" => Some(Self::Loop),
            "SWITCH" => Some(Self::Switch),
            "FOR_EACH" => Some(Self::ForEach),
            _ => None,
        }
    }

    /// True for types whose resource file is the leaf `<node>.xml` form.
    pub fn is_leaf(self) -> bool {
        matches!(self, Self::Task | Self::NpassTask)
    }
}

/// Attributes of one enclosing loop container, outermost first in
/// [`NodeDescriptor::loops`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSpec {
    /// Full node path of the loop container.
    pub node_path: String,
    /// First iteration value.
    pub start: String,
    /// Iteration step.
    pub step: String,
    /// Iteration set size.
    pub set: String,
    /// Last iteration value.
    pub end: String,
    /// Authoritative iteration expression; when non-empty the bound values
    /// above are informational only.
    #[serde(default)]
    pub expression: String,
}

impl LoopSpec {
    /// Leaf name of the loop container.
    pub fn leaf_name(&self) -> &str {
        self.node_path.rsplit('/').next().unwrap_or(&self.node_path)
    }
}

/// Target description of a for-each container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForEachTarget {
    /// Node path whose iterations drive this container.
    pub node: String,
    /// Index specification on the target.
    pub index: String,
    /// Experiment path of the target.
    pub experiment: String,
    /// Hour offset of the target.
    pub hour: String,
}

/// Complete runtime descriptor of one workflow node.
///
/// Created at the start of a resolution, mutated exclusively by the parsers
/// during that resolution, then handed off to the caller and never touched
/// again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Leaf name of the node.
    pub name: String,
    /// Full node path, normalized with a leading slash.
    pub node_path: String,
    /// Path of the enclosing container ("" for a root node).
    pub container: String,
    /// Path of the module the node belongs to.
    pub module_path: String,
    /// Experiment home directory the node was resolved in.
    pub experiment: String,
    /// Node type from the flow definition.
    pub node_type: NodeType,
    /// 14-digit datestamp; immutable once set for this resolution.
    pub datestamp: String,
    /// `+v1+v2...` extension encoding the current loop iteration indices.
    pub extension: String,
    /// Loop arguments supplied by the caller.
    pub loop_args: LoopArgs,
    /// Enclosing loop containers, outermost first. For Loop nodes the node's
    /// own attributes are appended last.
    pub loops: Vec<LoopSpec>,
    /// Node-specific attributes (loop bounds, switch data) in reading order.
    pub data: IndexMap<String, String>,

    /// Requested cpu count, raw form (`"4"` or `"4x2"`).
    pub cpu: String,
    /// MPI process count derived from `cpu` when the mpi flag is set.
    pub npex: String,
    /// Threads-per-process count derived from `cpu` when the mpi flag is set.
    pub omp: String,
    /// Multiplier applied to `cpu` by the submission layer.
    pub cpu_multiplier: String,
    /// Execution host or cluster.
    pub machine: String,
    /// Batch queue.
    pub queue: String,
    /// Memory request.
    pub memory: String,
    /// Whether the task runs under MPI.
    pub mpi: bool,
    /// Submission arguments: resource-file value first, caller override after.
    pub submit_args: String,
    /// Work queue directory.
    pub workq: String,
    /// Wallclock limit in minutes.
    pub wallclock: i32,
    /// Run in the submission shell instead of batching.
    pub immediate: bool,
    /// Catchup priority class.
    pub catchup: i32,
    /// Shell used by the task wrapper.
    pub shell: String,
    /// Path of the worker unit this node inherits resources from; empty when
    /// the node is not part of a worker unit.
    pub worker_path: String,

    /// Ordered dependency records.
    pub dependencies: Vec<DependencyRecord>,
    /// Abort action names.
    pub abort_actions: Vec<String>,
    /// Paths submitted when this node completes.
    pub submits: Vec<String>,
    /// Names of the node's siblings in the flow.
    pub siblings: Vec<String>,
    /// For-each target, populated for ForEach nodes only.
    pub for_each: Option<ForEachTarget>,
}

impl NodeDescriptor {
    /// Fresh descriptor for `node_path` (assumed normalized), with every
    /// resource field at its empty default.
    pub fn new(node_path: &str) -> Self {
        let (container, name) = split_container(node_path);
        Self {
            name,
            node_path: node_path.to_string(),
            container,
            module_path: String::new(),
            experiment: String::new(),
            node_type: NodeType::Task,
            datestamp: String::new(),
            extension: String::new(),
            loop_args: LoopArgs::new(),
            loops: Vec::new(),
            data: IndexMap::new(),
            cpu: String::new(),
            npex: String::new(),
            omp: String::new(),
            cpu_multiplier: String::new(),
            machine: String::new(),
            queue: String::new(),
            memory: String::new(),
            mpi: false,
            submit_args: String::new(),
            workq: String::new(),
            wallclock: 0,
            immediate: false,
            catchup: 0,
            shell: String::new(),
            worker_path: String::new(),
            dependencies: Vec::new(),
            abort_actions: Vec::new(),
            submits: Vec::new(),
            siblings: Vec::new(),
            for_each: None,
        }
    }

    /// Set the cpu request and, when the mpi flag is already on, derive the
    /// MPI-specific npex/omp split from it.
    pub fn set_cpu(&mut self, raw: &str) {
        self.cpu = raw.trim().to_string();
        if self.mpi {
            self.derive_mpi_cpu();
        }
    }

    /// Set the mpi flag; turning it on re-derives the npex/omp split from an
    /// already-parsed cpu value.
    pub fn set_mpi(&mut self, mpi: bool) {
        self.mpi = mpi;
        if mpi && !self.cpu.is_empty() {
            self.derive_mpi_cpu();
        }
    }

    fn derive_mpi_cpu(&mut self) {
        match self.cpu.split_once('x') {
            Some((npex, omp)) => {
                self.npex = npex.trim().to_string();
                self.omp = omp.trim().to_string();
            }
            None => {
                self.npex = self.cpu.clone();
                self.omp = "1".to_string();
            }
        }
    }

    /// Merge a resource-file `soumet_args` value with the caller-supplied
    /// override already stored: file value first, override appended, so a
    /// left-to-right consumer lets the override win.
    pub fn merge_submit_args(&mut self, file_value: &str) {
        let file_value = file_value.trim();
        if self.submit_args.is_empty() {
            self.submit_args = file_value.to_string();
        } else if !file_value.is_empty() {
            self.submit_args = format!("{} {}", file_value, self.submit_args);
        }
    }

    /// Leaf names of the enclosing loops, outermost first. This is the
    /// declaration order used for extension canonicalization.
    pub fn loop_declaration_order(&self) -> Vec<String> {
        self.loops
            .iter()
            .map(|spec| spec.leaf_name().to_string())
            .collect()
    }

    /// Recompute the extension from the caller's loop arguments, one `+value`
    /// segment per enclosing loop carrying a value, in declaration order.
    pub fn refresh_extension(&mut self) {
        let mut extension = String::new();
        for spec in &self.loops {
            if let Some(value) = self.loop_args.get(spec.leaf_name()) {
                extension.push('+');
                extension.push_str(value);
            }
        }
        self.extension = extension;
    }

    /// Append an enclosing loop's attributes.
    pub fn add_loop(&mut self, spec: LoopSpec) {
        self.loops.push(spec);
    }

    /// Append a dependency record.
    pub fn add_dependency(&mut self, record: DependencyRecord) {
        self.dependencies.push(record);
    }

    /// Append an abort action name.
    pub fn add_abort_action(&mut self, name: &str) {
        self.abort_actions.push(name.to_string());
    }

    /// Append a submit target path.
    pub fn add_submit(&mut self, path: &str) {
        self.submits.push(path.to_string());
    }

    /// Append a sibling name.
    pub fn add_sibling(&mut self, name: &str) {
        self.siblings.push(name.to_string());
    }
}

/// Split a normalized node path into (container, leaf name).
fn split_container(node_path: &str) -> (String, String) {
    match node_path.rsplit_once('/') {
        Some((container, name)) if !container.is_empty() => {
            (container.to_string(), name.to_string())
        }
        Some((_, name)) => (String::new(), name.to_string()),
        None => (String::new(), node_path.to_string()),
    }
}
