use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A TTL'd claim by a server instance that it accepts certain message types
/// (or, with `accept_others`, anything not claimed explicitly elsewhere).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostRegistration {
    pub instance: String,
    pub accepted_message_types: HashSet<String>,
    pub accept_others: bool,
    /// Timestamp (ms) past which this registration is stale and must be
    /// excluded from selection.
    pub expired: u64,
}

impl HostRegistration {
    pub fn accepts(&self, message_type: &str) -> bool {
        self.accepted_message_types.contains(message_type)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expired <= now
    }
}

/// The current set of registrations, stored as one record in the backing
/// store and refreshed on demand by clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostsAvailability {
    pub registered: Vec<HostRegistration>,
}

/// Well-known id of the registration table record.
pub const HOSTS_KEY_ID: &str = "hosts-availability";
pub const HOSTS_VALUE_TYPE: &str = "HostsAvailability";
