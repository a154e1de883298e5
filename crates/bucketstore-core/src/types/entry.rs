use crate::types::bucket::Timestamp;
use crate::types::document::{Document, DocumentId, GlobalId};
use serde::{Deserialize, Serialize};

/// Payload of a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryKind {
    /// A stored document version.
    Put(Document),
    /// A tombstone marking the identity as removed.
    Remove(DocumentId),
}

/// One timestamped record in a bucket's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocEntry {
    timestamp: Timestamp,
    size: u32,
    kind: EntryKind,
}

impl DocEntry {
    pub fn put(timestamp: Timestamp, document: Document) -> Self {
        let size = saturating_u32(document.encoded_size());
        Self {
            timestamp,
            size,
            kind: EntryKind::Put(document),
        }
    }

    pub fn remove(timestamp: Timestamp, id: DocumentId) -> Self {
        let size = saturating_u32(id.to_string().len());
        Self {
            timestamp,
            size,
            kind: EntryKind::Remove(id),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Bytes this entry accounts for in bucket info and iteration budgets.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    pub fn is_remove(&self) -> bool {
        matches!(self.kind, EntryKind::Remove(_))
    }

    /// The stored document, or `None` for a tombstone.
    pub fn document(&self) -> Option<&Document> {
        match &self.kind {
            EntryKind::Put(doc) => Some(doc),
            EntryKind::Remove(_) => None,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        match &self.kind {
            EntryKind::Put(doc) => doc.id(),
            EntryKind::Remove(id) => id,
        }
    }

    pub fn global_id(&self) -> GlobalId {
        self.document_id().global_id()
    }

    pub fn into_kind(self) -> EntryKind {
        self.kind
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_remove_accessors() {
        let id = DocumentId::parse("id:ns:t::a").unwrap();
        let doc = Document::new(id.clone()).with_field("f", "value");

        let put = DocEntry::put(10, doc.clone());
        assert_eq!(put.timestamp(), 10);
        assert!(!put.is_remove());
        assert_eq!(put.document(), Some(&doc));
        assert_eq!(put.document_id(), &id);
        assert_eq!(put.size() as usize, doc.encoded_size());

        let remove = DocEntry::remove(20, id.clone());
        assert!(remove.is_remove());
        assert_eq!(remove.document(), None);
        assert_eq!(remove.global_id(), put.global_id());
        assert_eq!(remove.size() as usize, "id:ns:t::a".len());
    }

    #[test]
    fn test_equality_covers_payload() {
        let id = DocumentId::parse("id:ns:t::a").unwrap();
        let a = DocEntry::put(10, Document::new(id.clone()).with_field("f", 1));
        let b = DocEntry::put(10, Document::new(id.clone()).with_field("f", 2));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_ne!(a, DocEntry::remove(10, id));
    }
}
