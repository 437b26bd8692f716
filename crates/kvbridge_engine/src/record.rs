//! Stored records and index definitions.

use crate::key::Key;

/// A record as the host engine stores it.
///
/// The engine treats `value` as opaque bytes. `created` and `accessed` are
/// epoch milliseconds and feed the secondary indexes of the same names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Primary key, unique within its store.
    pub key: Key,
    /// Opaque payload.
    pub value: Vec<u8>,
    /// Creation time in milliseconds since the Unix epoch.
    pub created: u64,
    /// Last access time. Reserved; no write path maintains it yet.
    pub accessed: Option<u64>,
    /// Payload compression flag. Reserved, always `false`.
    pub compression: bool,
}

impl Record {
    /// Creates an uncompressed record with no access time.
    #[must_use]
    pub fn new(key: Key, value: Vec<u8>, created: u64) -> Self {
        Self {
            key,
            value,
            created,
            accessed: None,
            compression: false,
        }
    }
}

/// The record field a secondary index is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexField {
    /// [`Record::created`].
    Created,
    /// [`Record::accessed`].
    Accessed,
}

impl IndexField {
    /// Extracts the indexed value. Records without the field are not indexed.
    #[must_use]
    pub fn extract(self, record: &Record) -> Option<u64> {
        match self {
            Self::Created => Some(record.created),
            Self::Accessed => record.accessed,
        }
    }
}

/// Definition of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name, unique within its store.
    pub name: String,
    /// Field the index covers.
    pub field: IndexField,
    /// Whether two records may share an index value.
    pub unique: bool,
}

impl IndexSpec {
    /// Creates a non-unique index.
    pub fn non_unique(name: impl Into<String>, field: IndexField) -> Self {
        Self {
            name: name.into(),
            field,
            unique: false,
        }
    }

    /// Creates a unique index.
    pub fn unique(name: impl Into<String>, field: IndexField) -> Self {
        Self {
            name: name.into(),
            field,
            unique: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_defaults() {
        let record = Record::new(Key::from("a"), b"v".to_vec(), 10);
        assert!(!record.compression);
        assert_eq!(record.accessed, None);
        assert_eq!(record.created, 10);
    }

    #[test]
    fn accessed_field_is_optional() {
        let mut record = Record::new(Key::from(1), Vec::new(), 5);
        assert_eq!(IndexField::Created.extract(&record), Some(5));
        assert_eq!(IndexField::Accessed.extract(&record), None);
        record.accessed = Some(9);
        assert_eq!(IndexField::Accessed.extract(&record), Some(9));
    }
}
