//! Line transport configuration.

use serde::{Deserialize, Serialize};
use tidemcp_core::MAX_MESSAGE_SIZE;

/// Smallest inbound queue the transport will run with; bursts below this
/// size never stall the reader.
pub const MIN_INBOUND_CAPACITY: usize = 10;

/// Line transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StdioConfig {
    /// Capacity of the inbound request queue
    pub inbound_capacity: usize,
    /// Largest accepted line, in bytes
    pub max_message_size: usize,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 64,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl StdioConfig {
    /// Queue capacity actually used, never below [`MIN_INBOUND_CAPACITY`].
    pub fn effective_capacity(&self) -> usize {
        self.inbound_capacity.max(MIN_INBOUND_CAPACITY)
    }
}
