//! Connection identifiers.

use uuid::Uuid;

/// An opaque 128-bit connection identifier.
///
/// Rendered as a canonical hyphenated UUID string; clients must treat the
/// value as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Mint a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a connection ID from a UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse a connection ID from its canonical string form.
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<ConnectionId> for Uuid {
    fn from(id: ConnectionId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_display_is_canonical_uuid() {
        let id = ConnectionId::new();
        let rendered = id.to_string();
        assert_eq!(rendered.len(), 36);
        assert_eq!(rendered.matches('-').count(), 4);
        assert_eq!(ConnectionId::parse(&rendered), Some(id));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(ConnectionId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_uuid_roundtrip() {
        let uuid = Uuid::new_v4();
        let id = ConnectionId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
        let back: Uuid = id.into();
        assert_eq!(back, uuid);
    }
}
