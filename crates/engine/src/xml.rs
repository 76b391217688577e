//! XML access layer.
//!
//! Definition files are parsed with `quick-xml` into a small index-arena
//! document: every element gets a stable [`NodeId`], which is what the
//! resource DFS visitor keeps on its explicit stack. Attribute order is
//! preserved so batch resources are applied in reading order.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use tracing::debug;

use crate::defs::DefStore;
use crate::error::{EngineError, Result};
use tempo_types::NodeType;

/// Root element every resource file must carry.
pub const RESOURCE_ROOT: &str = "NODE_RESOURCES";

static VARIABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern compiles"));

/// Stable identifier of an element within one [`XmlDoc`].
pub type NodeId = usize;

/// One element of a parsed document.
#[derive(Debug, Clone)]
pub struct XmlElement {
    /// Element tag name.
    pub name: String,
    /// Attributes in declaration order.
    pub attributes: IndexMap<String, String>,
    /// Concatenated text content.
    pub text: String,
    /// Child element ids in document order.
    pub children: Vec<NodeId>,
    /// Parent element id; `None` for the root.
    pub parent: Option<NodeId>,
}

/// A parsed XML document with arena-indexed elements.
#[derive(Debug, Clone)]
pub struct XmlDoc {
    elements: Vec<XmlElement>,
    root: NodeId,
    path: PathBuf,
}

impl XmlDoc {
    /// Parse a document from text. `path` is carried for diagnostics only.
    pub fn parse_str(text: &str, path: &Path) -> Result<Self> {
        let malformed = |message: String| EngineError::MalformedXml {
            path: path.to_path_buf(),
            message,
        };

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut elements: Vec<XmlElement> = Vec::new();
        let mut open: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        loop {
            match reader.read_event().map_err(|e| malformed(e.to_string()))? {
                Event::Start(start) => {
                    let id = append_element(&mut elements, &open, &start)
                        .map_err(&malformed)?;
                    match open.last() {
                        Some(&parent) => elements[parent].children.push(id),
                        None if root.is_none() => root = Some(id),
                        None => return Err(malformed("multiple root elements".to_string())),
                    }
                    open.push(id);
                }
                Event::Empty(start) => {
                    let id = append_element(&mut elements, &open, &start)
                        .map_err(&malformed)?;
                    match open.last() {
                        Some(&parent) => elements[parent].children.push(id),
                        None if root.is_none() => root = Some(id),
                        None => return Err(malformed("multiple root elements".to_string())),
                    }
                }
                Event::End(_) => {
                    open.pop();
                }
                Event::Text(content) => {
                    if let Some(&current) = open.last() {
                        let value = content.unescape().map_err(|e| malformed(e.to_string()))?;
                        elements[current].text.push_str(&value);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(&unclosed) = open.last() {
            return Err(malformed(format!(
                "unclosed element <{}>",
                elements[unclosed].name
            )));
        }
        let root = root.ok_or_else(|| malformed("no root element".to_string()))?;
        Ok(Self {
            elements,
            root,
            path: path.to_path_buf(),
        })
    }

    /// Read and parse a file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Self::parse_str(&text, path)
    }

    /// Root element id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// File the document came from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Element by id.
    pub fn element(&self, id: NodeId) -> &XmlElement {
        &self.elements[id]
    }

    /// Tag name of an element.
    pub fn name(&self, id: NodeId) -> &str {
        &self.elements[id].name
    }

    /// Attribute value of an element, if present.
    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        self.elements[id].attributes.get(key).map(String::as_str)
    }

    /// Child element ids in document order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.elements[id].children
    }

    /// Children with a given tag name, in document order.
    pub fn children_named<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.elements[id]
            .children
            .iter()
            .copied()
            .filter(move |&child| self.elements[child].name == name)
    }

    /// First child with a given tag name.
    pub fn first_child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children_named(id, name).next()
    }

    /// Replace `${VAR}` references in every attribute value, resolving from
    /// the defaults store first and the process environment second. Unknown
    /// variables are left untouched.
    pub fn resolve_variables(&mut self, defs: &DefStore) {
        for element in &mut self.elements {
            for value in element.attributes.values_mut() {
                if value.contains("${") {
                    *value = expand_variables(value, defs);
                }
            }
        }
    }
}

fn expand_variables(value: &str, defs: &DefStore) -> String {
    VARIABLE_RE
        .replace_all(value, |captures: &regex::Captures| {
            let name = &captures[1];
            match defs.lookup(name) {
                Some(resolved) => resolved,
                None => {
                    debug!(variable = name, "unresolved variable reference kept verbatim");
                    captures[0].to_string()
                }
            }
        })
        .into_owned()
}

fn append_element(
    elements: &mut Vec<XmlElement>,
    open: &[NodeId],
    start: &quick_xml::events::BytesStart<'_>,
) -> std::result::Result<NodeId, String> {
    let mut attributes = IndexMap::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| e.to_string())?
            .into_owned();
        attributes.insert(key, value);
    }
    let id = elements.len();
    elements.push(XmlElement {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attributes,
        text: String::new(),
        children: Vec::new(),
        parent: open.last().copied(),
    });
    Ok(id)
}

/// Minimal valid resource skeleton for a node type.
pub fn skeleton_xml(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Loop => {
            "<NODE_RESOURCES>\n\t<LOOP start=\"0\" set=\"1\" end=\"1\" step=\"1\"/>\n</NODE_RESOURCES>\n"
        }
        _ => "<NODE_RESOURCES/>\n",
    }
}

/// Make sure a resource file exists and is non-empty, writing the skeleton
/// when it is missing or empty. Idempotent: an already-valid file is left
/// untouched.
pub fn ensure_resource_file(path: &Path, node_type: NodeType) -> Result<()> {
    let needs_skeleton = match fs::metadata(path) {
        Ok(metadata) => metadata.len() == 0,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => true,
        Err(error) => return Err(EngineError::io(path, error)),
    };
    if needs_skeleton {
        debug!(path = %path.display(), "resource file missing or empty, writing skeleton");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }
        fs::write(path, skeleton_xml(node_type)).map_err(|e| EngineError::io(path, e))?;
    }
    Ok(())
}
