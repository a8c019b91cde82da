//! Per-role configuration types.

use serde::Deserialize;

use crate::channel::{Channel, DoId};

/// One role hosted by the process, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RoleConfig {
    Stateserver(StateServerConfig),
    Database(DatabaseConfig),
}

impl RoleConfig {
    /// Channel the role listens on for requests.
    pub fn control(&self) -> Channel {
        match self {
            Self::Stateserver(c) => c.control,
            Self::Database(c) => c.control,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stateserver(_) => "stateserver",
            Self::Database(_) => "database",
        }
    }
}

/// State server role: generates and hosts distributed objects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StateServerConfig {
    pub control: Channel,
    /// Subscribe new objects to their parent's authority-scope channel at
    /// generation, not only after their first zone change.
    #[serde(default = "default_eager_scope_subscription")]
    pub eager_scope_subscription: bool,
}

impl StateServerConfig {
    pub fn new(control: Channel) -> Self {
        Self {
            control,
            eager_scope_subscription: default_eager_scope_subscription(),
        }
    }
}

fn default_eager_scope_subscription() -> bool {
    true
}

/// Database role: allocates ids and persists object snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    pub control: Channel,
    /// Ids this database may hand out.
    pub generate: IdRange,
    /// Announce deletions on the per-object database broadcast channel.
    #[serde(default)]
    pub broadcast: bool,
}

/// Inclusive object id range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IdRange {
    pub min: DoId,
    pub max: DoId,
}

impl IdRange {
    pub const fn new(min: DoId, max: DoId) -> Self {
        Self { min, max }
    }

    pub const fn contains(&self, do_id: DoId) -> bool {
        self.min <= do_id && do_id <= self.max
    }
}
