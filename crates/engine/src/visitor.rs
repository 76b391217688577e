//! Resource-file traversal.
//!
//! A resource document is a `NODE_RESOURCES` root with declarations either
//! directly under it or nested under `VALIDITY` gates, which may themselves
//! nest. The visitor walks matching gates depth-first, children before the
//! level's own declarations, so the most deeply nested matching declaration
//! is seen first and first-match-wins collectors prefer it over outer
//! defaults.
//!
//! The traversal keeps an explicit element stack: an element pushed on entry
//! is popped on exit, and the stack depth brackets every callback.

use tracing::trace;

use crate::error::{EngineError, Result};
use crate::validity::{ValidityContext, window_from_element, window_matches};
use crate::xml::{NodeId, XmlDoc};
use tempo_types::{ForEachTarget, LoopSpec, NodeDescriptor, NodeType};

/// Depth-first visitor over the matching gates of one resource document.
pub struct ResourceVisitor<'a> {
    doc: &'a XmlDoc,
    context: ValidityContext,
    stack: Vec<NodeId>,
}

impl<'a> ResourceVisitor<'a> {
    /// Visitor over `doc` evaluating gates against `context`.
    pub fn new(doc: &'a XmlDoc, context: ValidityContext) -> Self {
        Self {
            doc,
            context,
            stack: Vec::new(),
        }
    }

    /// Document under traversal.
    pub fn doc(&self) -> &'a XmlDoc {
        self.doc
    }

    /// Current traversal depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Walk the document and hand every visited element to `apply`,
    /// innermost matching gates first. `apply` returns `true` to stop the
    /// walk; the return value reports whether it did.
    pub fn visit<F>(&mut self, apply: &mut F) -> Result<bool>
    where
        F: FnMut(&XmlDoc, NodeId) -> Result<bool>,
    {
        let root = self.doc.root();
        self.visit_from(root, apply)
    }

    fn visit_from<F>(&mut self, id: NodeId, apply: &mut F) -> Result<bool>
    where
        F: FnMut(&XmlDoc, NodeId) -> Result<bool>,
    {
        let doc = self.doc;
        self.stack.push(id);
        trace!(element = doc.name(id), depth = self.stack.len(), "enter");

        let matching: Vec<NodeId> = doc
            .children_named(id, "VALIDITY")
            .filter(|&gate| window_matches(&window_from_element(doc, gate), &self.context))
            .collect();
        for gate in matching {
            if self.visit_from(gate, apply)? {
                self.stack.pop();
                return Ok(true);
            }
        }

        let done = apply(doc, id)?;
        let popped = self.stack.pop();
        debug_assert_eq!(popped, Some(id));
        Ok(done)
    }
}

/// Read `LOOP` iteration attributes, innermost matching gate first. Bounds
/// absent from the winning element keep the defaults `start=0 step=1 set=1
/// end=1`.
pub fn collect_loop_spec(visitor: &mut ResourceVisitor<'_>, node_path: &str) -> Result<LoopSpec> {
    let mut spec = LoopSpec {
        node_path: node_path.to_string(),
        start: "0".to_string(),
        step: "1".to_string(),
        set: "1".to_string(),
        end: "1".to_string(),
        expression: String::new(),
    };
    let mut found = false;
    visitor.visit(&mut |doc, id| {
        let Some(element) = doc.first_child_named(id, "LOOP") else {
            return Ok(false);
        };
        let take = |key: &str, slot: &mut String| {
            if let Some(value) = doc.attribute(element, key) {
                *slot = value.to_string();
            }
        };
        take("start", &mut spec.start);
        take("step", &mut spec.step);
        take("set", &mut spec.set);
        take("end", &mut spec.end);
        take("expression", &mut spec.expression);
        found = true;
        Ok(true)
    })?;
    if !found {
        trace!(node_path, "no LOOP attributes, keeping iteration defaults");
    }
    Ok(spec)
}

/// Record the node's type-specific attributes into its data map, keys
/// uppercased. Loop nodes additionally get their iteration attributes and a
/// `TYPE` marker.
pub fn collect_node_specifics(
    visitor: &mut ResourceVisitor<'_>,
    descriptor: &mut NodeDescriptor,
) -> Result<()> {
    if descriptor.node_type != NodeType::Loop {
        return Ok(());
    }
    let spec = collect_loop_spec(visitor, &descriptor.node_path)?;
    descriptor
        .data
        .insert("TYPE".to_string(), "Default".to_string());
    descriptor.data.insert("START".to_string(), spec.start.clone());
    descriptor.data.insert("STEP".to_string(), spec.step.clone());
    descriptor.data.insert("SET".to_string(), spec.set.clone());
    descriptor.data.insert("END".to_string(), spec.end.clone());
    if !spec.expression.is_empty() {
        descriptor
            .data
            .insert("EXPRESSION".to_string(), spec.expression.clone());
    }
    descriptor.add_loop(spec);
    Ok(())
}

/// Read the `FOR_EACH` target of a for-each container. `node` and `index`
/// are mandatory; the experiment defaults to the resolving experiment and the
/// hour offset to zero.
pub fn collect_for_each(
    visitor: &mut ResourceVisitor<'_>,
    descriptor: &mut NodeDescriptor,
) -> Result<()> {
    if descriptor.node_type != NodeType::ForEach {
        return Ok(());
    }
    let experiment = descriptor.experiment.clone();
    let mut target: Option<ForEachTarget> = None;
    visitor.visit(&mut |doc, id| {
        let Some(element) = doc.first_child_named(id, "FOR_EACH") else {
            return Ok(false);
        };
        let mandatory = |key: &str| {
            doc.attribute(element, key)
                .map(str::to_string)
                .ok_or_else(|| EngineError::MissingElement {
                    path: doc.path().to_path_buf(),
                    what: format!("FOR_EACH attribute {key:?}"),
                })
        };
        target = Some(ForEachTarget {
            node: mandatory("node")?,
            index: mandatory("index")?,
            experiment: doc
                .attribute(element, "exp")
                .map(str::to_string)
                .unwrap_or_else(|| experiment.clone()),
            hour: doc
                .attribute(element, "hour")
                .map(str::to_string)
                .unwrap_or_else(|| "0".to_string()),
        });
        Ok(true)
    })?;
    match target {
        Some(target) => {
            descriptor.for_each = Some(target);
            Ok(())
        }
        None => Err(EngineError::MissingElement {
            path: visitor.doc().path().to_path_buf(),
            what: "FOR_EACH element for a for-each container".to_string(),
        }),
    }
}

/// Apply the first matching `BATCH` element to the descriptor. Attributes
/// are applied in reading order; an attribute the submission layer does not
/// know is a configuration error.
pub fn collect_batch(
    visitor: &mut ResourceVisitor<'_>,
    descriptor: &mut NodeDescriptor,
) -> Result<()> {
    visitor.visit(&mut |doc, id| {
        let Some(element) = doc.first_child_named(id, "BATCH") else {
            return Ok(false);
        };
        for (name, value) in &doc.element(element).attributes {
            match name.as_str() {
                "cpu" => descriptor.set_cpu(value),
                "cpu_multiplier" => descriptor.cpu_multiplier = value.trim().to_string(),
                "machine" => descriptor.machine = value.trim().to_string(),
                "queue" => descriptor.queue = value.trim().to_string(),
                "memory" => descriptor.memory = value.trim().to_string(),
                "mpi" => descriptor.set_mpi(lenient_int(value) != 0),
                "soumet_args" => descriptor.merge_submit_args(value),
                "workq" => descriptor.workq = value.trim().to_string(),
                "wallclock" => descriptor.wallclock = lenient_int(value),
                "immediate" => descriptor.immediate = lenient_int(value) != 0,
                "catchup" => descriptor.catchup = lenient_int(value),
                "shell" => descriptor.shell = value.trim().to_string(),
                other => {
                    return Err(EngineError::UnknownBatchAttribute {
                        name: other.to_string(),
                        path: doc.path().to_path_buf(),
                    });
                }
            }
        }
        Ok(true)
    })?;
    Ok(())
}

/// Numeric batch values read like C `atoi`: anything unparseable is zero.
fn lenient_int(value: &str) -> i32 {
    value.trim().parse().unwrap_or(0)
}

/// Collect abort action names from the first matching level declaring any.
pub fn collect_abort_actions(
    visitor: &mut ResourceVisitor<'_>,
    descriptor: &mut NodeDescriptor,
) -> Result<()> {
    visitor.visit(&mut |doc, id| {
        let mut found = false;
        for element in doc.children_named(id, "ABORT_ACTION") {
            if let Some(name) = doc.attribute(element, "name") {
                descriptor.add_abort_action(name);
                found = true;
            }
        }
        Ok(found)
    })?;
    Ok(())
}

/// Read the worker-unit path the node inherits its batch resources from.
/// A `WORKER` element without a `path` attribute is a configuration error.
pub fn collect_worker_path(
    visitor: &mut ResourceVisitor<'_>,
    descriptor: &mut NodeDescriptor,
) -> Result<()> {
    visitor.visit(&mut |doc, id| {
        let Some(element) = doc.first_child_named(id, "WORKER") else {
            return Ok(false);
        };
        let path = doc
            .attribute(element, "path")
            .ok_or_else(|| EngineError::MissingElement {
                path: doc.path().to_path_buf(),
                what: "WORKER attribute \"path\"".to_string(),
            })?;
        descriptor.worker_path = path.to_string();
        Ok(true)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn context(datestamp: &str, extension: &str) -> ValidityContext {
        ValidityContext {
            datestamp: datestamp.to_string(),
            extension: extension.to_string(),
            loop_order: Vec::new(),
        }
    }

    fn doc(text: &str) -> XmlDoc {
        XmlDoc::parse_str(text, Path::new("container.xml")).expect("parse")
    }

    const GATED: &str = r#"<NODE_RESOURCES>
        <LOOP start="0" end="23" step="1" set="4"/>
        <VALIDITY valid_hour="03">
          <LOOP expression="5:6:7:8"/>
        </VALIDITY>
        <VALIDITY valid_hour="12">
          <LOOP expression="9:10:11:12"/>
        </VALIDITY>
        <VALIDITY local_index="ferry=1">
          <LOOP expression="13:14:15:16"/>
        </VALIDITY>
      </NODE_RESOURCES>"#;

    #[test]
    fn inner_gate_wins_over_outer_defaults_by_hour() {
        let doc = doc(GATED);
        let mut visitor = ResourceVisitor::new(&doc, context("20160102030000", ""));
        let spec = collect_loop_spec(&mut visitor, "/suite/ferry").unwrap();
        assert_eq!(spec.expression, "5:6:7:8");

        let mut visitor = ResourceVisitor::new(&doc, context("20160102120000", ""));
        let spec = collect_loop_spec(&mut visitor, "/suite/ferry").unwrap();
        assert_eq!(spec.expression, "9:10:11:12");
    }

    #[test]
    fn extension_gate_wins_when_index_matches() {
        let doc = doc(GATED);
        let mut visitor = ResourceVisitor::new(&doc, context("20160102180000", "+1"));
        let spec = collect_loop_spec(&mut visitor, "/suite/ferry").unwrap();
        assert_eq!(spec.expression, "13:14:15:16");
    }

    #[test]
    fn no_matching_gate_falls_back_to_outer_declaration() {
        let doc = doc(GATED);
        let mut visitor = ResourceVisitor::new(&doc, context("20160102180000", ""));
        let spec = collect_loop_spec(&mut visitor, "/suite/ferry").unwrap();
        assert_eq!(spec.expression, "");
        assert_eq!(spec.end, "23");
        assert_eq!(spec.set, "4");
    }

    #[test]
    fn stack_is_balanced_around_every_callback() {
        let doc = doc(GATED);
        let mut visitor = ResourceVisitor::new(&doc, context("20160102030000", "+1"));
        let mut depths = Vec::new();
        visitor
            .visit(&mut |_, _| {
                depths.push(true);
                Ok(false)
            })
            .unwrap();
        // Two matching gates plus the root, innermost first.
        assert_eq!(depths.len(), 3);
        assert_eq!(visitor.depth(), 0);
    }

    #[test]
    fn batch_attributes_apply_in_reading_order() {
        let doc = doc(
            r#"<NODE_RESOURCES>
                 <BATCH cpu="4x2" mpi="1" machine="hpc1" wallclock="30" soumet_args="-waste 50"/>
               </NODE_RESOURCES>"#,
        );
        let mut descriptor = NodeDescriptor::new("/suite/task");
        let mut visitor = ResourceVisitor::new(&doc, context("20160102000000", ""));
        collect_batch(&mut visitor, &mut descriptor).unwrap();
        assert_eq!(descriptor.npex, "4");
        assert_eq!(descriptor.omp, "2");
        assert_eq!(descriptor.machine, "hpc1");
        assert_eq!(descriptor.wallclock, 30);
        assert_eq!(descriptor.submit_args, "-waste 50");
    }

    #[test]
    fn numeric_batch_values_read_leniently() {
        let doc = doc(
            r#"<NODE_RESOURCES>
                 <BATCH wallclock="abc" catchup=" 4 " mpi="" immediate="1"/>
               </NODE_RESOURCES>"#,
        );
        let mut descriptor = NodeDescriptor::new("/suite/task");
        let mut visitor = ResourceVisitor::new(&doc, context("20160102000000", ""));
        collect_batch(&mut visitor, &mut descriptor).unwrap();
        assert_eq!(descriptor.wallclock, 0);
        assert_eq!(descriptor.catchup, 4);
        assert!(!descriptor.mpi);
        assert!(descriptor.immediate);
    }

    #[test]
    fn unknown_batch_attribute_is_fatal() {
        let doc = doc(r#"<NODE_RESOURCES><BATCH cpus="4"/></NODE_RESOURCES>"#);
        let mut descriptor = NodeDescriptor::new("/suite/task");
        let mut visitor = ResourceVisitor::new(&doc, context("20160102000000", ""));
        let error = collect_batch(&mut visitor, &mut descriptor).unwrap_err();
        assert!(matches!(
            error,
            EngineError::UnknownBatchAttribute { name, .. } if name == "cpus"
        ));
    }

    #[test]
    fn for_each_defaults_and_mandatory_attributes() {
        let doc = doc(
            r#"<NODE_RESOURCES>
                 <FOR_EACH node="/other/loop" index="member"/>
               </NODE_RESOURCES>"#,
        );
        let mut descriptor = NodeDescriptor::new("/suite/collect");
        descriptor.node_type = NodeType::ForEach;
        descriptor.experiment = "/home/ops/exp".to_string();
        let mut visitor = ResourceVisitor::new(&doc, context("20160102000000", ""));
        collect_for_each(&mut visitor, &mut descriptor).unwrap();
        let target = descriptor.for_each.unwrap();
        assert_eq!(target.node, "/other/loop");
        assert_eq!(target.index, "member");
        assert_eq!(target.experiment, "/home/ops/exp");
        assert_eq!(target.hour, "0");

        let bare = XmlDoc::parse_str("<NODE_RESOURCES/>", Path::new("c.xml")).unwrap();
        let mut descriptor = NodeDescriptor::new("/suite/collect");
        descriptor.node_type = NodeType::ForEach;
        let mut visitor = ResourceVisitor::new(&bare, context("20160102000000", ""));
        assert!(matches!(
            collect_for_each(&mut visitor, &mut descriptor),
            Err(EngineError::MissingElement { .. })
        ));
    }

    #[test]
    fn worker_path_requires_path_attribute() {
        let doc = doc(r#"<NODE_RESOURCES><WORKER path="/suite/workers/unit"/></NODE_RESOURCES>"#);
        let mut descriptor = NodeDescriptor::new("/suite/task");
        let mut visitor = ResourceVisitor::new(&doc, context("20160102000000", ""));
        collect_worker_path(&mut visitor, &mut descriptor).unwrap();
        assert_eq!(descriptor.worker_path, "/suite/workers/unit");

        let bad = XmlDoc::parse_str(
            "<NODE_RESOURCES><WORKER/></NODE_RESOURCES>",
            Path::new("c.xml"),
        )
        .unwrap();
        let mut descriptor = NodeDescriptor::new("/suite/task");
        let mut visitor = ResourceVisitor::new(&bad, context("20160102000000", ""));
        assert!(matches!(
            collect_worker_path(&mut visitor, &mut descriptor),
            Err(EngineError::MissingElement { .. })
        ));
    }

    #[test]
    fn abort_actions_from_innermost_declaring_level() {
        let doc = doc(
            r#"<NODE_RESOURCES>
                 <ABORT_ACTION name="stop"/>
                 <VALIDITY valid_hour="00">
                   <ABORT_ACTION name="rerun"/>
                   <ABORT_ACTION name="mail"/>
                 </VALIDITY>
               </NODE_RESOURCES>"#,
        );
        let mut descriptor = NodeDescriptor::new("/suite/task");
        let mut visitor = ResourceVisitor::new(&doc, context("20160102000000", ""));
        collect_abort_actions(&mut visitor, &mut descriptor).unwrap();
        assert_eq!(descriptor.abort_actions, ["rerun", "mail"]);
    }
}
