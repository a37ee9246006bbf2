//! # Actor Identity Serialization
//!
//! Clients address actors by `{name, key}` where `key` is an ordered list of
//! string tags. The pair is serialized into a single string and hashed into
//! an [`ActorId`], so the serialization has to be injective:
//!
//! - name: `\` → `\\`, `:` → `\:`
//! - key parts: `\` → `\\`, `,` → `\,`; a part equal to `(none)` → `\(none)`
//! - empty key: the marker `(none)`
//! - parts joined by `,`, name and key joined by `:`
//!
//! ```text
//! {name: "chat",     key: []}            → chat:(none)
//! {name: "chat",     key: [""]}          → chat:
//! {name: "chat",     key: ["a,b"]}       → chat:a\,b
//! {name: "chat",     key: ["a", "b"]}    → chat:a,b
//! {name: "ns:chat",  key: ["(none)"]}    → ns\:chat:\(none)
//! ```

use serde::{Deserialize, Serialize};

use crate::common::errors::IdentityError;
use crate::common::identifiers::ActorId;

/// Marker written in place of an empty key
pub const EMPTY_KEY_MARKER: &str = "(none)";

const KEY_SEPARATOR: char = ',';
const NAME_SEPARATOR: char = ':';
const ESCAPE: char = '\\';

/// Logical address of an actor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorQuery {
    pub name: String,
    #[serde(default)]
    pub key: Vec<String>,
}

impl ActorQuery {
    pub fn new(name: impl Into<String>, key: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            key: key.into_iter().map(Into::into).collect(),
        }
    }

    /// Query with an empty key
    pub fn singleton(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: Vec::new(),
        }
    }

    /// Reject queries that cannot name an actor
    pub fn validate(&self) -> Result<(), IdentityError> {
        if self.name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        Ok(())
    }

    /// Injective `name:key` serialization
    pub fn serialize(&self) -> String {
        serialize_name_and_key(&self.name, &self.key)
    }

    /// Deterministic actor id for this query
    pub fn actor_id(&self) -> ActorId {
        ActorId::from_serialized(&self.serialize())
    }

    /// Parse a string produced by [`ActorQuery::serialize`]
    pub fn parse(serialized: &str) -> Result<Self, IdentityError> {
        let mut name = String::new();
        let mut chars = serialized.char_indices();
        while let Some((idx, ch)) = chars.next() {
            match ch {
                ESCAPE => match chars.next() {
                    Some((_, escaped)) => name.push(escaped),
                    None => {
                        return Err(IdentityError::DanglingEscape {
                            input: serialized.to_string(),
                        })
                    }
                },
                NAME_SEPARATOR => {
                    let key = deserialize_key(&serialized[idx + 1..])?;
                    let query = Self { name, key };
                    query.validate()?;
                    return Ok(query);
                }
                other => name.push(other),
            }
        }
        Err(IdentityError::MissingSeparator {
            input: serialized.to_string(),
        })
    }
}

/// Serialize a name and key into the string that is hashed into an actor id
pub fn serialize_name_and_key(name: &str, key: &[String]) -> String {
    let mut out = String::with_capacity(name.len() + 16);
    for ch in name.chars() {
        if ch == ESCAPE || ch == NAME_SEPARATOR {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
    out.push(NAME_SEPARATOR);
    out.push_str(&serialize_key(key));
    out
}

/// Serialize key parts with separator escaping
pub fn serialize_key(key: &[String]) -> String {
    if key.is_empty() {
        return EMPTY_KEY_MARKER.to_string();
    }

    let mut parts = Vec::with_capacity(key.len());
    for part in key {
        if part == EMPTY_KEY_MARKER {
            parts.push(format!("{ESCAPE}{EMPTY_KEY_MARKER}"));
            continue;
        }
        let mut escaped = String::with_capacity(part.len());
        for ch in part.chars() {
            if ch == ESCAPE || ch == KEY_SEPARATOR {
                escaped.push(ESCAPE);
            }
            escaped.push(ch);
        }
        parts.push(escaped);
    }
    parts.join(",")
}

/// Inverse of [`serialize_key`]
pub fn deserialize_key(serialized: &str) -> Result<Vec<String>, IdentityError> {
    if serialized == EMPTY_KEY_MARKER {
        return Ok(Vec::new());
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaping = false;
    for ch in serialized.chars() {
        if escaping {
            current.push(ch);
            escaping = false;
        } else if ch == ESCAPE {
            escaping = true;
        } else if ch == KEY_SEPARATOR {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    if escaping {
        return Err(IdentityError::DanglingEscape {
            input: serialized.to_string(),
        });
    }
    parts.push(current);
    Ok(parts)
}
