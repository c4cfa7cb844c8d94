use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Backend-owned continuation token.
///
/// The value is passed back to the server verbatim; nothing on the client
/// interprets it as an offset or page number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` once the collection is exhausted.
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<Cursor>) -> Self {
        Self { items, next_cursor }
    }

    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

// ── Response envelopes ──────────────────────────────────────────

/// `{ "data": [...], "next": "<cursor>" | null }`
#[derive(Debug, Deserialize)]
pub(crate) struct PageEnvelope<T> {
    pub data: Vec<T>,
    #[serde(default, deserialize_with = "non_empty_cursor")]
    pub next: Option<Cursor>,
}

impl<T> From<PageEnvelope<T>> for Page<T> {
    fn from(envelope: PageEnvelope<T>) -> Self {
        Page::new(envelope.data, envelope.next)
    }
}

/// `{ "data": <entity> }` or `{ "data": [<entity>, ...] }`
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: OneOrMany<T>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_first(self) -> Option<T> {
        match self {
            Self::One(item) => Some(item),
            Self::Many(items) => items.into_iter().next(),
        }
    }
}

/// An empty `next` would make the client request the first page again.
fn non_empty_cursor<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Cursor>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(Cursor))
}
