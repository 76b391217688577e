//! Node resolution orchestration.
//!
//! One resolution walks the flow definition to situate the node, then layers
//! the resource files on top: the enclosing loop containers first, the
//! node's own file after, worker-unit inheritance and experiment defaults
//! last. The result is a fully populated [`NodeDescriptor`].

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::clock::effective_datestamp;
use crate::defs::{
    DEFAULT_ABORT_ACTION_KEY, DEFAULT_MACHINE_KEY, DEFAULT_SHELL_KEY, DefStore,
};
use crate::depends::collect_dependencies;
use crate::error::{EngineError, Result};
use crate::flow;
use crate::validity::ValidityContext;
use crate::visitor::{
    ResourceVisitor, collect_abort_actions, collect_batch, collect_for_each, collect_loop_spec,
    collect_node_specifics, collect_worker_path,
};
use crate::xml::{RESOURCE_ROOT, XmlDoc, ensure_resource_file};
use tempo_types::{LoopArgs, NodeDescriptor, NodeType};
use tempo_util::{normalize_node_path, path_leaf};

/// Fallback shell when neither the resources nor the defaults name one.
const FALLBACK_SHELL: &str = "/bin/ksh";

/// Which flow-level extras a resolution collects. Everything declared in the
/// resource files (batch resources, loop attributes, dependencies, worker
/// inheritance, defaulting) is resolved on every request; filters gate only
/// what comes out of the flow definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filters {
    /// Flow-declared dependency records.
    pub dependencies: bool,
    /// Siblings and submit targets.
    pub structure: bool,
}

impl Filters {
    /// Everything on.
    pub fn all() -> Self {
        Self {
            dependencies: true,
            structure: true,
        }
    }

    /// Parse a comma-separated filter list: `all`, `res`, `dep`, `task`.
    /// Unknown words are ignored with a log line.
    pub fn parse(spec: &str) -> Self {
        let mut filters = Self::default();
        for word in spec.split(',') {
            match word.trim() {
                "" => {}
                "all" => filters = Self::all(),
                // Resources are resolved on every request.
                "res" => {}
                "dep" => filters.dependencies = true,
                "task" => filters.structure = true,
                other => debug!(filter = other, "ignoring unknown filter word"),
            }
        }
        filters
    }
}

/// Everything a resolution needs from the caller.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// Node path to resolve, in any slash form.
    pub node_path: String,
    /// Experiment home directory.
    pub exp_home: PathBuf,
    /// Explicit datestamp; `None` falls back to the environment and the
    /// experiment date file.
    pub datestamp: Option<String>,
    /// Loop iteration arguments.
    pub loop_args: LoopArgs,
    /// Submission arguments appended after any resource-file value.
    pub extra_submit_args: String,
    /// Flow-level extras to collect alongside the resources.
    pub filters: Filters,
}

impl ResolveRequest {
    /// Request with every filter on and no iteration arguments.
    pub fn new(node_path: &str, exp_home: &Path) -> Self {
        Self {
            node_path: node_path.to_string(),
            exp_home: exp_home.to_path_buf(),
            datestamp: None,
            loop_args: LoopArgs::new(),
            extra_submit_args: String::new(),
            filters: Filters::all(),
        }
    }
}

/// Resolve one node into its descriptor.
pub fn resolve(request: &ResolveRequest) -> Result<NodeDescriptor> {
    let mut visited = Vec::new();
    resolve_inner(request, &mut visited)
}

/// Resource file of a node: `<node>.xml` for leaf types, `container.xml`
/// inside the node's resource directory for containers.
pub fn resource_path(exp_home: &Path, node_path: &str, node_type: NodeType) -> PathBuf {
    let relative = node_path.trim_start_matches('/');
    if node_type.is_leaf() {
        exp_home.join(format!("resources/{relative}.xml"))
    } else {
        exp_home.join(format!("resources/{relative}/container.xml"))
    }
}

fn resolve_inner(request: &ResolveRequest, visited: &mut Vec<String>) -> Result<NodeDescriptor> {
    let node_path = normalize_node_path(&request.node_path);
    if visited.iter().any(|seen| seen == &node_path) {
        return Err(EngineError::WorkerCycle { path: node_path });
    }
    visited.push(node_path.clone());

    let mut descriptor = NodeDescriptor::new(&node_path);
    descriptor.experiment = request.exp_home.display().to_string();
    descriptor.datestamp = effective_datestamp(request.datestamp.as_deref(), &request.exp_home)?;
    descriptor.loop_args = request.loop_args.clone();
    descriptor.submit_args = request.extra_submit_args.clone();
    info!(node = %node_path, datestamp = %descriptor.datestamp, "resolving node");

    let defs = DefStore::load(&request.exp_home)?;

    let datestamp = descriptor.datestamp.clone();
    let facts = flow::populate(
        &request.exp_home,
        &mut descriptor,
        &datestamp,
        request.filters.structure,
        request.filters.dependencies,
    )?;

    // The extension must be known before any resource file is read: gates
    // inside the loop containers may reference the full iteration index.
    let mut declared_loops: Vec<String> = facts
        .loop_paths
        .iter()
        .map(|loop_path| path_leaf(loop_path).to_string())
        .collect();
    if descriptor.node_type == NodeType::Loop {
        declared_loops.push(descriptor.name.clone());
    }
    let mut extension = String::new();
    for name in &declared_loops {
        if let Some(value) = descriptor.loop_args.get(name) {
            extension.push('+');
            extension.push_str(value);
        }
    }
    descriptor.extension = extension;

    // Enclosing loops first: each container contributes its iteration
    // attributes.
    for loop_path in &facts.loop_paths {
        let path = resource_path(&request.exp_home, loop_path, NodeType::Loop);
        ensure_resource_file(&path, NodeType::Loop)?;
        let mut doc = XmlDoc::load(&path)?;
        require_resource_root(&doc)?;
        doc.resolve_variables(&defs);
        let mut visitor = ResourceVisitor::new(&doc, context_of(&descriptor));
        let spec = collect_loop_spec(&mut visitor, loop_path)?;
        descriptor.add_loop(spec);
    }

    let path = resource_path(&request.exp_home, &node_path, descriptor.node_type);
    ensure_resource_file(&path, descriptor.node_type)?;
    let mut doc = XmlDoc::load(&path)?;
    require_resource_root(&doc)?;
    doc.resolve_variables(&defs);

    let mut visitor = ResourceVisitor::new(&doc, context_of(&descriptor));
    collect_node_specifics(&mut visitor, &mut descriptor)?;
    descriptor.refresh_extension();

    let mut visitor = ResourceVisitor::new(&doc, context_of(&descriptor));
    collect_for_each(&mut visitor, &mut descriptor)?;
    let mut visitor = ResourceVisitor::new(&doc, context_of(&descriptor));
    collect_batch(&mut visitor, &mut descriptor)?;
    let mut visitor = ResourceVisitor::new(&doc, context_of(&descriptor));
    collect_worker_path(&mut visitor, &mut descriptor)?;

    let mut visitor = ResourceVisitor::new(&doc, context_of(&descriptor));
    collect_abort_actions(&mut visitor, &mut descriptor)?;
    if descriptor.abort_actions.is_empty() {
        if let Some(action) = defs.lookup(DEFAULT_ABORT_ACTION_KEY) {
            descriptor.add_abort_action(&action);
        }
    }

    let mut visitor = ResourceVisitor::new(&doc, context_of(&descriptor));
    collect_dependencies(&mut visitor, &mut descriptor)?;

    if !descriptor.worker_path.is_empty() {
        inherit_from_worker(request, &mut descriptor, visited)?;
    }
    if descriptor.machine.is_empty() {
        match defs.lookup(DEFAULT_MACHINE_KEY) {
            Some(machine) => descriptor.machine = machine,
            None => {
                return Err(EngineError::MachineUnresolved {
                    path,
                    def_path: defs.path().to_path_buf(),
                });
            }
        }
    }
    if descriptor.shell.is_empty() {
        descriptor.shell = defs
            .lookup(DEFAULT_SHELL_KEY)
            .unwrap_or_else(|| FALLBACK_SHELL.to_string());
    }

    visited.pop();
    Ok(descriptor)
}

fn context_of(descriptor: &NodeDescriptor) -> ValidityContext {
    ValidityContext {
        datestamp: descriptor.datestamp.clone(),
        extension: descriptor.extension.clone(),
        loop_order: descriptor.loop_declaration_order(),
    }
}

fn require_resource_root(doc: &XmlDoc) -> Result<()> {
    if doc.name(doc.root()) != RESOURCE_ROOT {
        return Err(EngineError::MissingElement {
            path: doc.path().to_path_buf(),
            what: format!("{RESOURCE_ROOT} root element"),
        });
    }
    Ok(())
}

/// Resolve the worker unit a node runs under and take over its batch
/// resources. The worker is resolved under the same datestamp so the result
/// is reproducible; the visited chain catches worker paths that loop back.
fn inherit_from_worker(
    request: &ResolveRequest,
    descriptor: &mut NodeDescriptor,
    visited: &mut Vec<String>,
) -> Result<()> {
    let worker_path = normalize_node_path(&descriptor.worker_path);
    debug!(worker = %worker_path, "inheriting batch resources from worker unit");
    let worker_request = ResolveRequest {
        node_path: worker_path,
        exp_home: request.exp_home.clone(),
        datestamp: Some(descriptor.datestamp.clone()),
        loop_args: LoopArgs::new(),
        extra_submit_args: String::new(),
        filters: Filters::default(),
    };
    let worker = resolve_inner(&worker_request, visited)?;
    descriptor.mpi = worker.mpi;
    descriptor.catchup = worker.catchup;
    descriptor.set_cpu(&worker.cpu);
    descriptor.cpu_multiplier = worker.cpu_multiplier.clone();
    descriptor.queue = worker.queue.clone();
    descriptor.machine = worker.machine.clone();
    descriptor.memory = worker.memory.clone();
    descriptor.submit_args = worker.submit_args.clone();
    descriptor.shell = worker.shell.clone();
    Ok(())
}
