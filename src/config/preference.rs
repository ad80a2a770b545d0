//! Persisted load-balancing strategy preference.
//!
//! The preference survives restarts: it lives in a small JSON document next
//! to the config file and is rewritten whenever the strategy is changed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::load_balancer::Strategy;

#[derive(Debug, Default, Deserialize, Serialize)]
struct PreferenceDocument {
    #[serde(default)]
    strategy: Strategy,
}

/// Reads and writes the strategy preference.
///
/// Without a path the store is memory-only and always reports the default.
#[derive(Debug, Clone, Default)]
pub struct StrategyStore {
    path: Option<PathBuf>,
}

impl StrategyStore {
    /// Store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()) }
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load the persisted strategy, falling back to round-robin.
    pub fn load(&self) -> Strategy {
        let Some(path) = &self.path else {
            return Strategy::default();
        };

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<PreferenceDocument>(&content) {
                Ok(doc) => doc.strategy,
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Ignoring unreadable strategy preference");
                    Strategy::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Strategy::default(),
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Failed to read strategy preference");
                Strategy::default()
            }
        }
    }

    /// Persist the strategy (temp file + rename).
    pub fn save(&self, strategy: Strategy) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let body = serde_json::to_string_pretty(&PreferenceDocument { strategy })
            .map_err(io::Error::other)?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, path)?;

        tracing::debug!(path = ?path, strategy = %strategy, "Strategy preference saved");
        Ok(())
    }
}
