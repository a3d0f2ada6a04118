use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{LOCAL_IDENTITY, SHARE_SLUG_LEN};

/// Longest identity token the server accepts.
pub const MAX_IDENTITY_LEN: usize = 128;

// Anonymous identity = opaque random token chosen by the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a client-supplied token. Blank or oversized tokens are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_IDENTITY_LEN {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// The implicit scope of a device-local store.
    pub fn local() -> Self {
        Self(LOCAL_IDENTITY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map(|(i, _)| i).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short public token addressing a shared entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ShareSlug(String);

impl ShareSlug {
    /// Mint a new slug from the leading characters of a random UUID.
    pub fn generate() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self(raw[..SHARE_SLUG_LEN].to_string())
    }

    pub fn from_stored(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShareSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the produced image lives.
#[derive(Clone, PartialEq, Eq)]
pub enum ResultReference {
    /// Raw image bytes owned by the local store.
    Payload(Vec<u8>),
    /// Durable public URL owned by the object store.
    Url(String),
}

impl ResultReference {
    pub fn url(&self) -> Option<&str> {
        match self {
            ResultReference::Url(url) => Some(url),
            ResultReference::Payload(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            ResultReference::Payload(bytes) => Some(bytes),
            ResultReference::Url(_) => None,
        }
    }
}

impl std::fmt::Debug for ResultReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultReference::Payload(bytes) => write!(f, "Payload({} bytes)", bytes.len()),
            ResultReference::Url(url) => f.debug_tuple("Url").field(url).finish(),
        }
    }
}

/// One completed transformation.
///
/// Publicity is carried by `share_slug`: an entry is public exactly when it
/// has a slug, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: EntryId,
    pub identity: Identity,
    /// Original filename or URL. Informational only.
    pub source_reference: String,
    pub result: ResultReference,
    pub created_at: DateTime<Utc>,
    pub share_slug: Option<ShareSlug>,
}

impl HistoryEntry {
    pub fn is_public(&self) -> bool {
        self.share_slug.is_some()
    }
}

/// Per-identity daily usage counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub identity: Identity,
    pub daily_count: u32,
    pub last_reset_date: NaiveDate,
}

impl QuotaRecord {
    pub fn fresh(identity: Identity, today: NaiveDate) -> Self {
        Self {
            identity,
            daily_count: 0,
            last_reset_date: today,
        }
    }

    /// Apply the lazy reset rule: a record from another day counts as zero.
    pub fn current(self, today: NaiveDate) -> Self {
        if self.last_reset_date == today {
            self
        } else {
            Self::fresh(self.identity, today)
        }
    }

    pub fn is_stale(&self, today: NaiveDate) -> bool {
        self.last_reset_date != today
    }

    pub fn remaining(&self, limit: u32) -> u32 {
        limit.saturating_sub(self.daily_count)
    }

    pub fn is_exhausted(&self, limit: u32) -> bool {
        self.daily_count >= limit
    }
}
