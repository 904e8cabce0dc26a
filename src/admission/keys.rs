//! Store key layout for a single client.

use chrono::NaiveDate;

/// The set of store keys that track one client.
///
/// Keys embed the client identity verbatim, so every gate sharing a store
/// must resolve clients the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKeys {
    /// The resolved client identity
    pub client: String,
}

impl ClientKeys {
    pub fn new(client: &str) -> Self {
        Self {
            client: client.to_string(),
        }
    }

    /// Presence-only ban marker.
    pub fn ban(&self) -> String {
        format!("ban:{}", self.client)
    }

    /// Daily counter for the given UTC date.
    pub fn daily(&self, date: NaiveDate) -> String {
        format!("daily:{}:{}", self.client, date.format("%Y-%m-%d"))
    }

    /// Short-window counter.
    pub fn window(&self) -> String {
        format!("window:{}", self.client)
    }
}

impl std::fmt::Display for ClientKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.client)
    }
}
