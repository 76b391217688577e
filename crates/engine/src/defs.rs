//! Experiment defaults store.
//!
//! `resources/resources.def` holds `KEY=VALUE` lines with experiment-wide
//! defaults (default machine, default shell, abort actions) and variables
//! that resource files reference as `${VAR}`. A missing file is an empty
//! store; lookups fall back to the process environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Defaults key for the machine fallback.
pub const DEFAULT_MACHINE_KEY: &str = "SEQ_DEFAULT_MACHINE";
/// Defaults key for the shell fallback.
pub const DEFAULT_SHELL_KEY: &str = "SEQ_DEFAULT_SHELL";
/// Defaults key for the abort-action fallback.
pub const DEFAULT_ABORT_ACTION_KEY: &str = "SEQ_DEFAULT_ABORT_ACTION";

/// Parsed `KEY=VALUE` defaults file.
#[derive(Debug, Clone, Default)]
pub struct DefStore {
    entries: IndexMap<String, String>,
    path: PathBuf,
}

impl DefStore {
    /// Load the defaults file of an experiment. A missing file yields an
    /// empty store; a present but unreadable file is an error.
    pub fn load(exp_home: &Path) -> Result<Self> {
        let path = exp_home.join("resources/resources.def");
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no defaults file, using empty store");
                return Ok(Self {
                    entries: IndexMap::new(),
                    path,
                });
            }
            Err(error) => return Err(EngineError::io(&path, error)),
        };
        Ok(Self {
            entries: parse_entries(&text),
            path,
        })
    }

    /// Build a store from literal text. Used by tests.
    pub fn from_text(text: &str, path: &Path) -> Self {
        Self {
            entries: parse_entries(text),
            path: path.to_path_buf(),
        }
    }

    /// File the store was loaded from, whether or not it existed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw value of a key, defaults file only.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Value of a key, falling back to the process environment.
    pub fn lookup(&self, key: &str) -> Option<String> {
        if let Some(value) = self.entries.get(key) {
            return Some(value.clone());
        }
        env::var(key).ok()
    }
}

fn parse_entries(text: &str) -> IndexMap<String, String> {
    let mut entries = IndexMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            debug!(line, "skipping defaults line without '='");
            continue;
        };
        entries.insert(key.trim().to_string(), value.trim().to_string());
    }
    entries
}
