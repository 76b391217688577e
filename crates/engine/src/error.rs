//! Typed errors for the resolution engine.
//!
//! Every internal layer returns these; only the binary entry point decides to
//! terminate and report. The variants mirror the fatal-configuration cases of
//! the resolution contract: anything else is either self-healing (skeleton
//! synthesis) or silent defaulting.

use std::path::PathBuf;

use thiserror::Error;

/// Engine result alias.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Fatal resolution errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested node path does not exist in the flow definition.
    #[error("node {path:?} not found in the flow definition")]
    NodeNotFound {
        /// Normalized node path that failed the walk.
        path: String,
    },

    /// Filesystem failure while reading or writing a definition file.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An existing, non-empty definition file does not parse as XML.
    #[error("malformed definition file {path}: {message}")]
    MalformedXml {
        /// File involved.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// A mandatory element or attribute is missing.
    #[error("{path}: missing mandatory {what}")]
    MissingElement {
        /// File involved.
        path: PathBuf,
        /// Description of the missing piece.
        what: String,
    },

    /// A `BATCH` element carries an attribute the engine does not know.
    #[error("unrecognized BATCH attribute {name:?} in {path}")]
    UnknownBatchAttribute {
        /// Offending attribute name.
        name: String,
        /// File involved.
        path: PathBuf,
    },

    /// An associative token opener `$((` has no matching `))`.
    #[error("malformed associative token in dependency {field} attribute: expected {entry}=\"$((token))\"")]
    TokenSyntax {
        /// Attribute the token appeared in (`index` or `local_index`).
        field: String,
        /// Entry name carrying the malformed token.
        entry: String,
    },

    /// A dependency index list is not a valid `name=value` list.
    #[error("dependency index format error: {0}")]
    IndexFormat(#[from] tempo_types::LoopArgsError),

    /// Datestamp parsing or arithmetic failure.
    #[error(transparent)]
    Datestamp(#[from] tempo_util::DatestampError),

    /// No datestamp argument, environment value, or experiment date file.
    #[error("no datestamp supplied and no experiment date found under {exp_home}")]
    DatestampUnavailable {
        /// Experiment root searched.
        exp_home: PathBuf,
    },

    /// No machine in the node's batch resources and no configured default.
    #[error("machine attribute missing from BATCH resources in {path} and no SEQ_DEFAULT_MACHINE in {def_path}")]
    MachineUnresolved {
        /// Resource file involved.
        path: PathBuf,
        /// Defaults file searched.
        def_path: PathBuf,
    },

    /// The worker-path inheritance chain revisited a path.
    #[error("worker path cycle detected at {path:?}")]
    WorkerCycle {
        /// Path that closed the cycle.
        path: String,
    },
}

impl EngineError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
