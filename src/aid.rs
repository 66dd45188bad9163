//! Agent identifiers.

use std::fmt;

/// Identifies an agent, or a topic, within the remote container.
///
/// On the wire an `AgentId` is just a string: a plain name identifies an
/// agent (`"simulator"`), a name prefixed with `#` identifies a topic
/// (`"#shell"`). This type keeps the two apart so callers can't
/// accidentally address a message to a topic string that was never
/// marked as one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentId {
    name: String,
    is_topic: bool,
}

impl AgentId {
    /// Build an `AgentId` addressing a specific agent by name.
    #[must_use]
    pub fn agent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_topic: false,
        }
    }

    /// Build an `AgentId` addressing a topic.
    #[must_use]
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_topic: true,
        }
    }

    /// The bare name, without the `#` topic marker.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this id addresses a topic rather than a single agent.
    #[must_use]
    pub const fn is_topic(&self) -> bool {
        self.is_topic
    }

    /// Parse the wire representation (`"name"` or `"#name"`).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        s.strip_prefix('#').map_or_else(
            || Self::agent(s),
            |topic| Self::topic(topic),
        )
    }

    /// The per-agent default notification topic: `"#" + name + "__ntf"`.
    #[must_use]
    pub fn notification_topic(&self) -> Self {
        Self::topic(format!("{}__ntf", self.name))
    }

    /// The wire representation of this id.
    #[must_use]
    pub fn to_wire_string(&self) -> String {
        if self.is_topic {
            format!("#{}", self.name)
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_string())
    }
}
