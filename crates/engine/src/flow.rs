//! Flow-definition walking.
//!
//! The flow of an experiment lives in `EntryModule/flow.xml`, with every
//! module boundary continuing in `modules/<name>/flow.xml`. Walking a node
//! path through these files yields the node's type, its enclosing module and
//! loops, and its structural neighborhood: siblings, submit targets, and
//! flow-declared dependencies.

use std::path::Path;

use tracing::debug;

use crate::clock::switch_value;
use crate::depends::{EnclosingLoops, parse_dependency_element};
use crate::error::{EngineError, Result};
use crate::xml::{NodeId, XmlDoc};
use tempo_types::{NodeDescriptor, NodeType};
use tempo_util::path_leaf;

/// Structural facts gathered while walking the flow, needed later in the
/// resolution.
#[derive(Debug, Default)]
pub struct FlowFacts {
    /// Node paths of the enclosing loop containers, outermost first. The
    /// node's own path is not included even when the node is a loop.
    pub loop_paths: Vec<String>,
}

/// Name of the experiment's root module, from the entry flow file.
pub fn root_module_name(exp_home: &Path) -> Result<String> {
    let path = exp_home.join("EntryModule/flow.xml");
    let doc = XmlDoc::load(&path)?;
    let root = doc.root();
    if doc.name(root) != "MODULE" {
        return Err(EngineError::MissingElement {
            path: path.clone(),
            what: "MODULE root element".to_string(),
        });
    }
    doc.attribute(root, "name")
        .map(str::to_string)
        .ok_or_else(|| EngineError::MissingElement {
            path,
            what: "name attribute on the MODULE root".to_string(),
        })
}

/// Walk the descriptor's node path through the flow definition and fill in
/// its structural fields.
///
/// `collect_structure` gates siblings and submit targets;  `collect_deps`
/// gates flow-declared dependencies. Both are off for resource-only
/// resolutions.
pub fn populate(
    exp_home: &Path,
    descriptor: &mut NodeDescriptor,
    datestamp: &str,
    collect_structure: bool,
    collect_deps: bool,
) -> Result<FlowFacts> {
    let entry = exp_home.join("EntryModule/flow.xml");
    let mut doc = XmlDoc::load(&entry)?;
    let mut current = doc.root();
    if doc.name(current) != "MODULE" {
        return Err(EngineError::MissingElement {
            path: entry,
            what: "MODULE root element".to_string(),
        });
    }

    let segments: Vec<String> = descriptor
        .node_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    let not_found = || EngineError::NodeNotFound {
        path: descriptor.node_path.clone(),
    };
    let root_name = doc
        .attribute(current, "name")
        .ok_or_else(|| EngineError::MissingElement {
            path: entry.clone(),
            what: "name attribute on the MODULE root".to_string(),
        })?
        .to_string();
    if segments.first().map(String::as_str) != Some(root_name.as_str()) {
        return Err(not_found());
    }

    let mut walked = format!("/{root_name}");
    let mut module_path = walked.clone();
    let mut node_type = NodeType::Module;
    let mut facts = FlowFacts::default();
    // Scope the final segment was found in, for sibling collection.
    let mut last_scope: Option<NodeId> = None;

    for segment in &segments[1..] {
        if node_type == NodeType::Loop {
            facts.loop_paths.push(walked.clone());
        }
        let scope = if node_type == NodeType::Switch {
            chosen_switch_item(&doc, current, datestamp)?
        } else {
            current
        };
        let found = doc
            .children(scope)
            .iter()
            .copied()
            .find(|&child| {
                NodeType::from_flow_tag(doc.name(child)).is_some()
                    && doc.attribute(child, "name") == Some(segment.as_str())
            })
            .ok_or_else(not_found)?;
        node_type = NodeType::from_flow_tag(doc.name(found)).unwrap_or(NodeType::Task);
        walked.push('/');
        walked.push_str(segment);

        if node_type == NodeType::Module {
            // The module's subtree continues in its own flow file.
            let module_file = exp_home.join(format!("modules/{segment}/flow.xml"));
            doc = XmlDoc::load(&module_file)?;
            current = doc.root();
            if doc.name(current) != "MODULE" {
                return Err(EngineError::MissingElement {
                    path: module_file,
                    what: "MODULE root element".to_string(),
                });
            }
            module_path = walked.clone();
            last_scope = None;
        } else {
            current = found;
            last_scope = Some(scope);
        }
    }

    descriptor.node_type = node_type;
    descriptor.module_path = module_path;

    if node_type == NodeType::Switch {
        let switch_type = doc.attribute(current, "type").unwrap_or("").to_string();
        let value = switch_value(&switch_type, datestamp).unwrap_or_default();
        descriptor
            .data
            .insert("SWITCH_TYPE".to_string(), switch_type);
        descriptor.data.insert("VALUE".to_string(), value);
    }

    if collect_structure {
        if let Some(scope) = last_scope {
            for sibling in doc.children(scope) {
                if NodeType::from_flow_tag(doc.name(*sibling)).is_none() {
                    continue;
                }
                if let Some(name) = doc.attribute(*sibling, "name") {
                    if name != descriptor.name {
                        descriptor.add_sibling(name);
                    }
                }
            }
        }
        collect_submits(&doc, current, descriptor);
    }

    if collect_deps {
        let enclosing: EnclosingLoops = facts
            .loop_paths
            .iter()
            .map(|loop_path| (loop_path.clone(), path_leaf(loop_path).to_string()))
            .collect();
        let elements: Vec<NodeId> = doc.children_named(current, "DEPENDS_ON").collect();
        for element in elements {
            parse_dependency_element(&doc, element, descriptor, &enclosing, true)?;
        }
    }

    Ok(facts)
}

/// Pick the switch branch a datestamp selects: an item listing the evaluated
/// value in its comma-separated name, or the `default` item.
fn chosen_switch_item(doc: &XmlDoc, switch: NodeId, datestamp: &str) -> Result<NodeId> {
    let switch_type = doc.attribute(switch, "type").unwrap_or("");
    let value = switch_value(switch_type, datestamp);
    let mut default_item = None;
    for item in doc.children_named(switch, "SWITCH_ITEM") {
        let name = doc.attribute(item, "name").unwrap_or("");
        if let Some(value) = &value {
            if name.split(',').any(|branch| branch.trim() == value) {
                return Ok(item);
            }
        }
        if name == "default" {
            default_item = Some(item);
        }
    }
    default_item.ok_or_else(|| EngineError::MissingElement {
        path: doc.path().to_path_buf(),
        what: format!(
            "SWITCH_ITEM matching {:?} (and no default branch)",
            value.unwrap_or_default()
        ),
    })
}

/// Record the paths this node submits on completion. Leaf nodes submit into
/// their own container, containers submit their children. Submissions marked
/// `type="user"` are manual and skipped.
fn collect_submits(doc: &XmlDoc, element: NodeId, descriptor: &mut NodeDescriptor) {
    for submit in doc.children_named(element, "SUBMITS") {
        if doc.attribute(submit, "type") == Some("user") {
            continue;
        }
        let Some(sub_name) = doc.attribute(submit, "sub_name") else {
            debug!("skipping SUBMITS without sub_name");
            continue;
        };
        let base = if descriptor.node_type.is_leaf() {
            &descriptor.container
        } else {
            &descriptor.node_path
        };
        descriptor.add_submit(&format!("{base}/{sub_name}"));
    }
}
