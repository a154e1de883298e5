use crate::error::{Result, StoreError};
use crate::types::bucket::Timestamp;
use crate::types::document::Document;
use crate::types::entry::DocEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Handle for an open iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IteratorId(pub u64);

impl fmt::Display for IteratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iterator#{}", self.0)
    }
}

/// Which versions of each identity an iterator visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IncludedVersions {
    /// Only identities whose newest entry is a document, and only that entry.
    #[default]
    NewestDocumentOnly,
    /// The newest entry of every identity, tombstones included.
    NewestDocumentOrRemove,
    /// Every entry in the log.
    AllVersions,
}

/// Fields returned for visited or fetched documents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldSet {
    #[default]
    All,
    /// The document id and no fields.
    DocIdOnly,
    /// No fields; callers only want entry metadata. Documents still carry
    /// their id, so in memory this projects the same as `DocIdOnly`.
    None,
    /// Only the named fields.
    Fields(BTreeSet<String>),
}

impl FieldSet {
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSet::Fields(names.into_iter().map(Into::into).collect())
    }
}

impl FromStr for FieldSet {
    type Err = StoreError;

    /// Parses `[all]`, `[id]`, `[none]`, or a comma-separated field list with
    /// an optional `<doctype>:` prefix.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "[all]" => Ok(FieldSet::All),
            "[id]" | "[docid]" => Ok(FieldSet::DocIdOnly),
            "[none]" => Ok(FieldSet::None),
            list => {
                let list = list.split_once(':').map_or(list, |(_, names)| names);
                let names: BTreeSet<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
                if names.is_empty() {
                    return Err(StoreError::InvalidFieldSet(s.to_string()));
                }
                Ok(FieldSet::Fields(names))
            }
        }
    }
}

/// What an iterator visits inside its bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Predicate in the selection language; empty selects everything
    #[serde(default)]
    pub document_selection: String,

    /// Lowest timestamp visited (inclusive)
    #[serde(default)]
    pub from_timestamp: Timestamp,

    /// Highest timestamp visited (inclusive)
    #[serde(default = "max_timestamp")]
    pub to_timestamp: Timestamp,

    /// When non-empty, exactly these timestamps are visited, in this order,
    /// and every other criterion is ignored
    #[serde(default)]
    pub timestamp_subset: Vec<Timestamp>,
}

fn max_timestamp() -> Timestamp {
    Timestamp::MAX
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            document_selection: String::new(),
            from_timestamp: 0,
            to_timestamp: max_timestamp(),
            timestamp_subset: Vec::new(),
        }
    }
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matching(expr: impl Into<String>) -> Self {
        Self {
            document_selection: expr.into(),
            ..Self::default()
        }
    }

    pub fn with_time_range(mut self, from: Timestamp, to: Timestamp) -> Self {
        self.from_timestamp = from;
        self.to_timestamp = to;
        self
    }

    pub fn with_timestamp_subset(mut self, timestamps: Vec<Timestamp>) -> Self {
        self.timestamp_subset = timestamps;
        self
    }
}

/// Outcome of a single-document lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum GetResult {
    /// No entry exists for the identity (or the bucket does not exist).
    NotFound,
    /// The identity's newest entry is a tombstone.
    Tombstone { timestamp: Timestamp },
    /// The identity's newest entry is a document, projected as requested.
    Found {
        document: Document,
        timestamp: Timestamp,
    },
}

impl GetResult {
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            GetResult::NotFound => None,
            GetResult::Tombstone { timestamp } | GetResult::Found { timestamp, .. } => {
                Some(*timestamp)
            }
        }
    }

    pub fn document(&self) -> Option<&Document> {
        match self {
            GetResult::Found { document, .. } => Some(document),
            _ => None,
        }
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            GetResult::Found { document, .. } => Some(document),
            _ => None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, GetResult::Tombstone { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoveResult {
    /// Number of tombstones actually written
    pub removed: u32,
}

impl RemoveResult {
    pub fn was_found(&self) -> bool {
        self.removed > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateResult {
    /// Timestamp of the version the update was applied to, if one existed
    pub existing_timestamp: Option<Timestamp>,

    /// Whether a new document was written
    pub applied: bool,
}

/// One batch drained from an iterator.
#[derive(Debug, Clone, PartialEq)]
pub struct IterateResult {
    pub entries: Vec<DocEntry>,

    /// No pending entries remain; further calls return empty batches
    pub completed: bool,
}

impl IterateResult {
    pub fn byte_size(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.size())).sum()
    }
}
