//! # tempo-engine
//!
//! Resolution engine for workflow node descriptors. Given an experiment
//! directory, a node path, and a scheduling datestamp, the engine walks the
//! flow definition, layers the node's resource files through their validity
//! gates, applies worker-unit inheritance and experiment defaults, and
//! returns a [`NodeDescriptor`] ready for submission or inspection.
//!
//! Entry point: [`resolve`] with a [`ResolveRequest`].

pub mod clock;
pub mod defs;
pub mod depends;
pub mod error;
pub mod flow;
pub mod resolver;
pub mod validity;
pub mod visitor;
pub mod xml;

pub use clock::{effective_datestamp, switch_value};
pub use defs::DefStore;
pub use error::{EngineError, Result};
pub use flow::root_module_name;
pub use resolver::{Filters, ResolveRequest, resolve, resource_path};
pub use tempo_types::NodeDescriptor;
