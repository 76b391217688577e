//! Dependency declaration parsing.
//!
//! `DEPENDS_ON` elements come from two places: the node's resource file
//! (walked through validity gates) and the flow definition itself. Both are
//! parsed here. Index specifications support the `CURRENT_INDEX` keyword and
//! `$((token))` associative bindings: a token bound while parsing the
//! `local_index` attribute carries the matched iteration value over to the
//! same token in the `index` attribute.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::visitor::ResourceVisitor;
use crate::xml::{NodeId, XmlDoc};
use tempo_types::{DependencyKind, DependencyRecord, LoopArgs, NodeDescriptor};
use tempo_util::{extract_token, resolve_relative_path};

const CURRENT_INDEX: &str = "CURRENT_INDEX";
const TOKEN_OPEN: &str = "$((";
const TOKEN_CLOSE: &str = "))";

/// Token bindings, scoped to a single dependency element.
type TokenTable = IndexMap<String, String>;

/// Enclosing loops of the dependent node as `(node path, leaf name)` pairs,
/// outermost first.
pub type EnclosingLoops = Vec<(String, String)>;

/// Collect every `DEPENDS_ON` element reachable through matching gates, in
/// reading order, innermost gates first.
pub fn collect_dependencies(
    visitor: &mut ResourceVisitor<'_>,
    descriptor: &mut NodeDescriptor,
) -> Result<()> {
    let mut elements: Vec<NodeId> = Vec::new();
    visitor.visit(&mut |doc, id| {
        elements.extend(doc.children_named(id, "DEPENDS_ON"));
        Ok(false)
    })?;
    let doc = visitor.doc();
    let enclosing: EnclosingLoops = descriptor
        .loops
        .iter()
        .map(|spec| (spec.node_path.clone(), spec.leaf_name().to_string()))
        .collect();
    for element in elements {
        parse_dependency_element(doc, element, descriptor, &enclosing, false)?;
    }
    Ok(())
}

/// Parse one `DEPENDS_ON` element into a record on the descriptor.
///
/// Declarations of a type other than `node` are ignored. A declaration
/// without a `dep_name` is ignored too, with a log line. `enclosing` names
/// the dependent node's loops and defines the canonicalization order.
/// `is_intra` marks dependencies declared in the flow definition; their
/// index is pre-seeded with the current iteration of every enclosing loop
/// shared with the dependent node.
pub fn parse_dependency_element(
    doc: &XmlDoc,
    element: NodeId,
    descriptor: &mut NodeDescriptor,
    enclosing: &EnclosingLoops,
    is_intra: bool,
) -> Result<()> {
    let dep_type = doc.attribute(element, "type").unwrap_or("node");
    if dep_type != "node" {
        debug!(dep_type, "skipping dependency of unsupported type");
        return Ok(());
    }
    let Some(dep_name) = doc.attribute(element, "dep_name") else {
        debug!("skipping DEPENDS_ON without dep_name");
        return Ok(());
    };

    let node_path = resolve_relative_path(dep_name, &descriptor.container);
    let mut record = DependencyRecord::with_defaults(&node_path);

    let experiment = doc.attribute(element, "exp").unwrap_or("").trim();
    if !experiment.is_empty() && experiment != descriptor.experiment {
        record.kind = DependencyKind::External;
        record.experiment = experiment.to_string();
    }

    if let Some(status) = doc.attribute(element, "status") {
        record.status = status.to_string();
    }
    if let Some(protocol) = doc.attribute(element, "protocol") {
        record.protocol = protocol.to_string();
    }
    let copy = |key: &str| doc.attribute(element, key).unwrap_or("").to_string();
    record.hour = copy("hour");
    record.time_delta = copy("time_delta");
    record.valid_hour = copy("valid_hour");
    record.valid_dow = copy("valid_dow");

    let declaration_order: Vec<String> = enclosing.iter().map(|(_, leaf)| leaf.clone()).collect();

    // Flow-declared dependencies default to the dependent's own iteration:
    // both lists start from the current value of every enclosing loop, and
    // explicit entries override.
    let mut local_args = LoopArgs::new();
    let mut index_args = LoopArgs::new();
    if is_intra {
        for (_, leaf) in enclosing {
            if let Some(value) = descriptor.loop_args.get(leaf) {
                local_args.set(leaf, value);
                index_args.set(leaf, value);
            }
        }
    }

    // Tokens bound in local_index carry over to index within this element
    // only.
    let mut tokens = TokenTable::new();

    let local_spec = copy("local_index");
    for (name, value) in
        resolve_index_args(&local_spec, "local_index", descriptor, &mut tokens, true)?.iter()
    {
        local_args.set(name, value);
    }
    record.local_index = local_args.canonical_extension(&declaration_order);

    let index_spec = copy("index");
    for (name, value) in
        resolve_index_args(&index_spec, "index", descriptor, &mut tokens, false)?.iter()
    {
        index_args.set(name, value);
    }
    record.index = index_args.canonical_extension(&declaration_order);

    descriptor.add_dependency(record);
    Ok(())
}

/// Parse an index attribute, substituting `CURRENT_INDEX` and `$((token))`
/// entries. With `bind` set, tokens are bound to the dependent node's
/// current iteration of the named loop; otherwise previously bound values
/// are substituted.
fn resolve_index_args(
    spec: &str,
    field: &str,
    descriptor: &NodeDescriptor,
    tokens: &mut TokenTable,
    bind: bool,
) -> Result<LoopArgs> {
    let parsed = LoopArgs::parse(spec)?;
    let mut resolved = LoopArgs::new();
    for (name, value) in parsed.iter() {
        let current = descriptor.loop_args.get(name);
        if value == CURRENT_INDEX {
            // An unknown loop name stays unresolved rather than failing.
            resolved.set(name, current.unwrap_or(value));
            continue;
        }
        match extract_token(value, TOKEN_OPEN, TOKEN_CLOSE) {
            None => {
                resolved.set(name, value);
            }
            Some(None) => {
                return Err(EngineError::TokenSyntax {
                    field: field.to_string(),
                    entry: name.to_string(),
                });
            }
            Some(Some(token)) => {
                if bind {
                    match current {
                        Some(current) => {
                            tokens.insert(token.to_string(), current.to_string());
                            resolved.set(name, current);
                        }
                        None => {
                            debug!(token, field, "no current iteration to bind, kept verbatim");
                            resolved.set(name, value);
                        }
                    }
                } else {
                    match tokens.get(token) {
                        Some(bound) => resolved.set(name, bound),
                        None => {
                            debug!(token, field, "unbound dependency token kept verbatim");
                            resolved.set(name, value);
                        }
                    }
                }
            }
        }
    }
    Ok(resolved)
}
