// ABOUTME: Key layout for the coordination store.
// ABOUTME: Every key lives under one prefix with lock/agent/index sub-namespaces.

/// Builds namespaced store keys.
#[derive(Debug, Clone)]
pub struct Keys {
    prefix: String,
}

impl Keys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Lock record for a normalized file path.
    pub fn lock(&self, path: &str) -> String {
        format!("{}{}", self.lock_prefix(), path)
    }

    pub fn lock_prefix(&self) -> String {
        format!("{}:lock:", self.prefix)
    }

    /// Recover the file path from a lock key.
    pub fn path_from_lock_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&self.lock_prefix())
    }

    pub fn agent(&self, agent_id: &str) -> String {
        format!("{}:agent:{}", self.prefix, agent_id)
    }

    /// Sorted index of agent id -> last seen (unix millis).
    pub fn active_agents(&self) -> String {
        format!("{}:agents:active", self.prefix)
    }

    pub fn conflicts(&self, agent_id: &str) -> String {
        format!("{}:conflicts:{}", self.prefix, agent_id)
    }

    pub fn metrics(&self, operation: &str) -> String {
        format!("{}:metrics:{}", self.prefix, operation)
    }
}

impl Default for Keys {
    fn default() -> Self {
        Self::new("coord")
    }
}
