//! Correlation identifiers for realtime actions.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::fmt;

pub const PREFIX: &str = "session_";
const SUFFIX_LEN: usize = 9;

/// Opaque `session_`-prefixed identifier attached to outgoing actions.
///
/// Identifiers are random, not guaranteed unique; collisions are merely
/// improbable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();
        Self(format!("{PREFIX}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}
