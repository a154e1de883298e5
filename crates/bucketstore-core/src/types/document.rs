use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use xxhash_rust::xxh3::xxh3_64;

/// Location part of a document id, which decides bucket placement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdLocation {
    /// No explicit location; placement hashes the whole id.
    Hashed,
    /// `n=<number>`: documents sharing the number are co-located.
    Number(u64),
    /// `g=<group>`: documents sharing the group are co-located.
    Group(String),
}

/// Document identity of the form `id:<namespace>:<type>:<location>:<specific>`,
/// where `<location>` is empty, `n=<number>` or `g=<group>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId {
    namespace: String,
    doc_type: String,
    location: IdLocation,
    specific: String,
}

impl DocumentId {
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: &str| StoreError::InvalidDocumentId(format!("{s:?}: {reason}"));

        let mut parts = s.splitn(5, ':');
        if parts.next() != Some("id") {
            return Err(invalid("must start with \"id:\""));
        }
        let (Some(namespace), Some(doc_type), Some(location), Some(specific)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected id:<namespace>:<type>:<location>:<specific>"));
        };
        if namespace.is_empty() || doc_type.is_empty() {
            return Err(invalid("namespace and document type must be non-empty"));
        }
        if specific.is_empty() {
            return Err(invalid("user-specified part must be non-empty"));
        }

        let location = match location.split_once('=') {
            None if location.is_empty() => IdLocation::Hashed,
            Some(("n", number)) => IdLocation::Number(
                number
                    .parse()
                    .map_err(|_| invalid("n= location must be an unsigned integer"))?,
            ),
            Some(("g", group)) if !group.is_empty() => IdLocation::Group(group.to_string()),
            _ => return Err(invalid("location must be empty, n=<number> or g=<group>")),
        };

        Ok(Self {
            namespace: namespace.to_string(),
            doc_type: doc_type.to_string(),
            location,
            specific: specific.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn id_location(&self) -> &IdLocation {
        &self.location
    }

    pub fn specific(&self) -> &str {
        &self.specific
    }

    /// 64-bit placement location used to derive bucket ids.
    pub fn location(&self) -> u64 {
        match &self.location {
            IdLocation::Number(n) => *n,
            IdLocation::Group(group) => xxh3_64(group.as_bytes()),
            IdLocation::Hashed => xxh3_64(self.to_string().as_bytes()),
        }
    }

    /// Content-derived identity key: the low 32 location bits followed by a
    /// hash of the full id.
    pub fn global_id(&self) -> GlobalId {
        let mut bytes = [0u8; GlobalId::LENGTH];
        bytes[..4].copy_from_slice(&(self.location() as u32).to_le_bytes());
        bytes[4..].copy_from_slice(&xxh3_64(self.to_string().as_bytes()).to_le_bytes());
        GlobalId(bytes)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id:{}:{}:", self.namespace, self.doc_type)?;
        match &self.location {
            IdLocation::Hashed => {}
            IdLocation::Number(n) => write!(f, "n={n}")?,
            IdLocation::Group(group) => write!(f, "g={group}")?,
        }
        write!(f, ":{}", self.specific)
    }
}

impl FromStr for DocumentId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.to_string()
    }
}

/// Fixed-size identity key derived from a [`DocumentId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId([u8; GlobalId::LENGTH]);

impl GlobalId {
    pub const LENGTH: usize = 12;

    pub fn from_bytes(bytes: [u8; Self::LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gid(0x")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// A document: an identity plus named JSON field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn doc_type(&self) -> &str {
        self.id.doc_type()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Keep only the fields for which `keep` returns true.
    pub fn retain_fields(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.fields.retain(|name, _| keep(name));
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Size in bytes of the document's encoded form: the id string plus each
    /// field name and its compact JSON value.
    pub fn encoded_size(&self) -> usize {
        let fields: usize = self
            .fields
            .iter()
            .map(|(name, value)| name.len() + value.to_string().len())
            .sum();
        self.id.to_string().len() + fields
    }
}
