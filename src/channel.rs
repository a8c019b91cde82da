//! Channel addressing.
//!
//! Three namespaces share the 64-bit channel space:
//! - identity channels: the object id itself
//! - location channels: `(parent << 32) | zone`
//! - authority-scope channels: `(prefix << 32) | object id`, where children of an
//!   object listen for changes to that object's managing authority

/// A bus destination.
pub type Channel = u64;
/// Distributed object identifier.
pub type DoId = u32;
/// Zone identifier within a parent.
pub type ZoneId = u32;

/// The unset channel. Never routed to.
pub const INVALID_CHANNEL: Channel = 0;

/// Channel carrying control messages from network participants.
pub const CONTROL_CHANNEL: Channel = 4001;

/// Default reserved prefix for authority-scope channels.
pub const DEFAULT_AUTHORITY_SCOPE_PREFIX: u32 = 4030;

/// Prefix for database object broadcast channels.
pub const DATABASE_BROADCAST_PREFIX: u32 = 13;

/// Channel addressing everything located under `parent` in `zone`.
pub const fn location_channel(parent: DoId, zone: ZoneId) -> Channel {
    ((parent as u64) << 32) | zone as u64
}

/// Split a location channel back into `(parent, zone)`.
pub const fn split_location(channel: Channel) -> (DoId, ZoneId) {
    ((channel >> 32) as DoId, channel as u32)
}

/// Channel on which the database role announces changes to `do_id`.
pub const fn database_broadcast_channel(do_id: DoId) -> Channel {
    location_channel(DATABASE_BROADCAST_PREFIX, do_id)
}

/// Addressing for authority-scope channels.
///
/// The prefix must never equal a real parent id in the deployed id range,
/// otherwise scope traffic would land on a location channel.
/// [`crate::config::Config::validate`] enforces this against configured ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuthorityScope {
    prefix: u32,
}

impl AuthorityScope {
    /// Create a scope with the given reserved prefix.
    pub const fn new(prefix: u32) -> Self {
        Self { prefix }
    }

    /// The reserved prefix.
    pub const fn prefix(&self) -> u32 {
        self.prefix
    }

    /// Channel on which children of `do_id` hear authority changes.
    pub const fn channel(&self, do_id: DoId) -> Channel {
        location_channel(self.prefix, do_id)
    }
}

impl Default for AuthorityScope {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHORITY_SCOPE_PREFIX)
    }
}
