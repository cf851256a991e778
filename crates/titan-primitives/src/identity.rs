//! Cell identity: `(CellKind, Key)`, the routing and concurrency unit of the
//! runtime.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of a cell, e.g. `"Account"`, `"Character"`, `"Trade"`.
///
/// Cheaply cloneable: cell kinds are a small, process-wide set of interned
/// names, so we share the backing allocation rather than re-stringify it on
/// every identity clone (identities flow through the mailbox, the directory,
/// and every caller stub).
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellKind(Arc<str>);

impl CellKind {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CellKind {
    fn from(s: &str) -> Self {
        Self::new(Arc::<str>::from(s))
    }
}

impl From<String> for CellKind {
    fn from(s: String) -> Self {
        Self::new(Arc::<str>::from(s))
    }
}

/// The key half of a cell identity: a 128-bit UUID, a
/// string, or a `(UUID, string)` compound (used to namespace a character by
/// season).
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, Debug)]
pub enum Key {
    Uuid(Uuid),
    Str(String),
    Compound(Uuid, String),
}

impl Key {
    pub fn uuid(id: Uuid) -> Self {
        Self::Uuid(id)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    pub fn compound(id: Uuid, s: impl Into<String>) -> Self {
        Self::Compound(id, s.into())
    }

    /// A stable byte encoding used as the storage-key suffix and as the
    /// directory/lease key. Distinct variants never collide because each is
    /// prefixed with a tag byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Key::Uuid(u) => {
                let mut v = Vec::with_capacity(17);
                v.push(0u8);
                v.extend_from_slice(u.as_bytes());
                v
            }
            Key::Str(s) => {
                let mut v = Vec::with_capacity(1 + s.len());
                v.push(1u8);
                v.extend_from_slice(s.as_bytes());
                v
            }
            Key::Compound(u, s) => {
                let mut v = Vec::with_capacity(18 + s.len());
                v.push(2u8);
                v.extend_from_slice(u.as_bytes());
                v.extend_from_slice(s.as_bytes());
                v
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Uuid(u) => write!(f, "{u}"),
            Key::Str(s) => write!(f, "{s}"),
            Key::Compound(u, s) => write!(f, "{u}/{s}"),
        }
    }
}

/// `(CellKind, Key)` — the routing unit and the concurrency unit.
/// All invocations against the same `Identity` are serialized by the runtime.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Debug)]
pub struct Identity {
    pub kind: CellKind,
    pub key: Key,
}

impl Identity {
    pub fn new(kind: impl Into<CellKind>, key: Key) -> Self {
        Self { kind: kind.into(), key }
    }

    /// Byte encoding used as the directory lease key and the storage-slot
    /// key prefix: `kind || 0x00 || key-bytes`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(self.kind.as_str().as_bytes());
        v.push(0u8);
        v.extend_from_slice(&self.key.to_bytes());
        v
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.key)
    }
}
