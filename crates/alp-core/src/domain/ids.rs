//! Ids - ドメインの識別子
//!
//! Two kinds of identifiers live here:
//! - [`IterationId`]: caller-assigned, opaque, stable per run. It doubles as the
//!   persisted file key, so it is validated to be non-empty.
//! - [`Id<T>`]: ULID based, generated by the system (see `ports::IdGenerator`).
//!   Phantom type パターンで `EventId` などを区別します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Identifier of one iteration, assigned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IterationId(String);

/// Rejected iteration identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIterationId {
    #[error("iteration id must not be empty")]
    Empty,
}

impl IterationId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidIterationId> {
        let id = id.into();
        if id.is_empty() {
            return Err(InvalidIterationId::Empty);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IterationId {
    type Error = InvalidIterationId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IterationId> for String {
    fn from(id: IterationId) -> Self {
        id.0
    }
}

impl FromStr for IterationId {
    type Err = InvalidIterationId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for IterationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックスを提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed identifier.
///
/// `T` never exists at runtime; it only keeps e.g. an `EventId` from being
/// passed where another id kind is expected.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Marker for termination events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Event {}

impl IdMarker for Event {
    fn prefix() -> &'static str {
        "event-"
    }
}

/// Identifier of a termination event.
pub type EventId = Id<Event>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_id_rejects_empty() {
        assert_eq!(IterationId::new(""), Err(InvalidIterationId::Empty));
        assert_eq!(IterationId::new("iter-1").unwrap().as_str(), "iter-1");
    }

    #[test]
    fn iteration_id_serializes_as_plain_string() {
        let id = IterationId::new("run/7").unwrap();
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "\"run/7\"");

        let back: IterationId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);

        let empty: Result<IterationId, _> = serde_json::from_str("\"\"");
        assert!(empty.is_err());
    }

    #[test]
    fn event_id_has_prefix_and_roundtrips() {
        let ulid = Ulid::new();
        let id = EventId::from_ulid(ulid);
        assert_eq!(id.as_ulid(), ulid);
        assert!(id.to_string().starts_with("event-"));

        let s = serde_json::to_string(&id).unwrap();
        let back: EventId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<EventId>(), size_of::<Ulid>());
    }
}
