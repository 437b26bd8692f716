//! Object store data held by the in-memory host.

use crate::error::{EngineError, EngineResult};
use crate::key::Key;
use crate::range::KeyRange;
use crate::record::{IndexSpec, Record};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// A secondary index: ordered `(index value, primary key)` pairs.
#[derive(Debug, Clone)]
pub(crate) struct IndexData {
    spec: IndexSpec,
    entries: BTreeSet<(u64, Key)>,
}

impl IndexData {
    fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeSet::new(),
        }
    }

    fn check_unique(&self, record: &Record) -> EngineResult<()> {
        if !self.spec.unique {
            return Ok(());
        }
        let Some(value) = self.spec.field.extract(record) else {
            return Ok(());
        };
        let clash = self
            .entries
            .range((Bound::Included((value, Key::MIN)), Bound::Unbounded))
            .take_while(|(v, _)| *v == value)
            .any(|(_, key)| *key != record.key);
        if clash {
            return Err(EngineError::constraint(format!(
                "index '{}' already holds value {value}",
                self.spec.name
            )));
        }
        Ok(())
    }

    fn insert(&mut self, record: &Record) {
        if let Some(value) = self.spec.field.extract(record) {
            self.entries.insert((value, record.key.clone()));
        }
    }

    fn remove(&mut self, record: &Record) {
        if let Some(value) = self.spec.field.extract(record) {
            self.entries.remove(&(value, record.key.clone()));
        }
    }

    /// First entry inside `range` strictly after `after`.
    fn next(&self, range: &KeyRange<u64>, after: Option<&(u64, Key)>) -> Option<(u64, Key)> {
        let lower = match after {
            Some(position) => Bound::Excluded(position.clone()),
            None => match range.lower() {
                Bound::Included(v) => Bound::Included((*v, Key::MIN)),
                Bound::Excluded(_) | Bound::Unbounded => Bound::Unbounded,
            },
        };
        self.entries
            .range((lower, Bound::Unbounded))
            .take_while(|(value, _)| !range.is_above(value))
            .find(|(value, _)| range.contains(value))
            .cloned()
    }
}

/// Records of one object store plus its indexes.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreData {
    records: BTreeMap<Key, Record>,
    indexes: BTreeMap<String, IndexData>,
}

impl StoreData {
    pub(crate) fn create_index(&mut self, spec: IndexSpec) -> EngineResult<()> {
        if self.indexes.contains_key(&spec.name) {
            return Err(EngineError::constraint(format!(
                "index '{}' already exists",
                spec.name
            )));
        }
        let mut index = IndexData::new(spec);
        for record in self.records.values() {
            index.check_unique(record)?;
            index.insert(record);
        }
        self.indexes.insert(index.spec.name.clone(), index);
        Ok(())
    }

    pub(crate) fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn get(&self, key: &Key) -> Option<Record> {
        self.records.get(key).cloned()
    }

    pub(crate) fn add(&mut self, record: Record) -> EngineResult<()> {
        if self.records.contains_key(&record.key) {
            return Err(EngineError::constraint(format!(
                "key {} already exists",
                record.key
            )));
        }
        for index in self.indexes.values() {
            index.check_unique(&record)?;
        }
        self.restore(record);
        Ok(())
    }

    /// Inserts without constraint checks. Used when rolling back.
    pub(crate) fn restore(&mut self, record: Record) {
        for index in self.indexes.values_mut() {
            index.insert(&record);
        }
        self.records.insert(record.key.clone(), record);
    }

    pub(crate) fn delete(&mut self, key: &Key) -> Option<Record> {
        let record = self.records.remove(key)?;
        for index in self.indexes.values_mut() {
            index.remove(&record);
        }
        Some(record)
    }

    pub(crate) fn clear(&mut self) -> Vec<Record> {
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
        std::mem::take(&mut self.records).into_values().collect()
    }

    pub(crate) fn next_in_index(
        &self,
        index: &str,
        range: &KeyRange<u64>,
        after: Option<&(u64, Key)>,
    ) -> EngineResult<Option<(u64, Key)>> {
        let index = self
            .indexes
            .get(index)
            .ok_or_else(|| EngineError::not_found(format!("index '{index}'")))?;
        Ok(index.next(range, after))
    }
}

/// One database: its version and its stores.
#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseData {
    pub(crate) version: u32,
    pub(crate) stores: BTreeMap<String, StoreData>,
}

/// A write to undo if its transaction aborts.
#[derive(Debug)]
pub(crate) enum Undo {
    Added { store: String, key: Key },
    Deleted { store: String, record: Record },
    Cleared { store: String, records: Vec<Record> },
}

impl Undo {
    pub(crate) fn revert(self, db: &mut DatabaseData) {
        match self {
            Self::Added { store, key } => {
                if let Some(store) = db.stores.get_mut(&store) {
                    store.delete(&key);
                }
            }
            Self::Deleted { store, record } => {
                if let Some(store) = db.stores.get_mut(&store) {
                    store.restore(record);
                }
            }
            Self::Cleared { store, records } => {
                if let Some(store) = db.stores.get_mut(&store) {
                    for record in records {
                        store.restore(record);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::IndexField;

    fn store_with_created_index() -> StoreData {
        let mut store = StoreData::default();
        store
            .create_index(IndexSpec::non_unique("created", IndexField::Created))
            .unwrap();
        store
    }

    #[test]
    fn add_rejects_duplicate_key() {
        let mut store = store_with_created_index();
        store.add(Record::new(Key::from("a"), vec![1], 1)).unwrap();
        let err = store.add(Record::new(Key::from("a"), vec![2], 2)).unwrap_err();
        assert!(matches!(err, EngineError::Constraint(_)));
        assert_eq!(store.get(&Key::from("a")).unwrap().value, vec![1]);
    }

    #[test]
    fn delete_removes_index_entry() {
        let mut store = store_with_created_index();
        store.add(Record::new(Key::from("a"), vec![], 5)).unwrap();
        assert!(store.delete(&Key::from("a")).is_some());
        let next = store
            .next_in_index("created", &KeyRange::all(), None)
            .unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn index_walk_is_ordered_by_value_then_key() {
        let mut store = store_with_created_index();
        store.add(Record::new(Key::from("b"), vec![], 20)).unwrap();
        store.add(Record::new(Key::from("c"), vec![], 10)).unwrap();
        store.add(Record::new(Key::from("a"), vec![], 20)).unwrap();

        let range = KeyRange::all();
        let mut seen = Vec::new();
        let mut position = None;
        while let Some(entry) = store.next_in_index("created", &range, position.as_ref()).unwrap() {
            seen.push(entry.clone());
            position = Some(entry);
        }
        assert_eq!(
            seen,
            vec![
                (10, Key::from("c")),
                (20, Key::from("a")),
                (20, Key::from("b")),
            ]
        );
    }

    #[test]
    fn index_walk_respects_bounds() {
        let mut store = store_with_created_index();
        for (key, created) in [("a", 0u64), ("b", 70), ("c", 71), ("d", 100)] {
            store.add(Record::new(Key::from(key), vec![], created)).unwrap();
        }
        let range = KeyRange::upper_bound(70, false);
        let first = store.next_in_index("created", &range, None).unwrap().unwrap();
        let second = store
            .next_in_index("created", &range, Some(&first))
            .unwrap()
            .unwrap();
        let third = store.next_in_index("created", &range, Some(&second)).unwrap();
        assert_eq!(first.1, Key::from("a"));
        assert_eq!(second.1, Key::from("b"));
        assert_eq!(third, None);

        let range = KeyRange::lower_bound(70, true);
        let first = store.next_in_index("created", &range, None).unwrap().unwrap();
        assert_eq!(first.1, Key::from("c"));
    }

    #[test]
    fn unknown_index_is_not_found() {
        let store = StoreData::default();
        let err = store
            .next_in_index("created", &KeyRange::all(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn unique_index_rejects_clash() {
        let mut store = StoreData::default();
        store
            .create_index(IndexSpec::unique("created", IndexField::Created))
            .unwrap();
        store.add(Record::new(Key::from("a"), vec![], 1)).unwrap();
        let err = store.add(Record::new(Key::from("b"), vec![], 1)).unwrap_err();
        assert!(matches!(err, EngineError::Constraint(_)));
    }

    #[test]
    fn undo_restores_previous_state() {
        let mut db = DatabaseData::default();
        db.stores.insert("s".into(), store_with_created_index());
        let store = db.stores.get_mut("s").unwrap();
        store.add(Record::new(Key::from("keep"), vec![1], 1)).unwrap();
        let cleared = store.clear();
        store.add(Record::new(Key::from("new"), vec![2], 2)).unwrap();

        let journal = vec![
            Undo::Cleared {
                store: "s".into(),
                records: cleared,
            },
            Undo::Added {
                store: "s".into(),
                key: Key::from("new"),
            },
        ];
        for undo in journal.into_iter().rev() {
            undo.revert(&mut db);
        }

        let store = &db.stores["s"];
        assert_eq!(store.len(), 1);
        assert!(store.get(&Key::from("keep")).is_some());
        assert!(store.get(&Key::from("new")).is_none());
    }
}
