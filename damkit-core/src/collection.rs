//! Records returned by a query.

use crate::{backend::DamItem, extractor::FieldExtractor, record::Record};
use std::sync::Arc;

/// The result of a query: the matching items plus the extractor they share.
pub struct RecordCollection {
    extractor: Arc<FieldExtractor>,
    items: Vec<Arc<dyn DamItem>>,
}

impl RecordCollection {
    /// Wraps the items of one query result
    pub fn new(extractor: Arc<FieldExtractor>, items: Vec<Arc<dyn DamItem>>) -> Self {
        Self { extractor, items }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the query matched nothing
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Extractor shared by all records of the collection
    pub fn extractor(&self) -> &Arc<FieldExtractor> {
        &self.extractor
    }

    /// Wraps each item in a fresh [`Record`] sharing this result's extractor.
    pub fn iter(&self) -> impl Iterator<Item = Record> + '_ {
        self.items
            .iter()
            .map(|item| Record::new(Arc::clone(&self.extractor), Arc::clone(item)))
    }

    /// First record, if any
    pub fn first(&self) -> Option<Record> {
        self.iter().next()
    }
}

impl std::fmt::Debug for RecordCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCollection")
            .field("catalog", &self.extractor.catalog())
            .field("items", &self.items.len())
            .finish()
    }
}

/// Owning iterator over the records of a [`RecordCollection`]
pub struct IntoRecords {
    extractor: Arc<FieldExtractor>,
    items: std::vec::IntoIter<Arc<dyn DamItem>>,
}

impl Iterator for IntoRecords {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.items
            .next()
            .map(|item| Record::new(Arc::clone(&self.extractor), item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for IntoRecords {}

impl IntoIterator for RecordCollection {
    type Item = Record;
    type IntoIter = IntoRecords;

    fn into_iter(self) -> IntoRecords {
        IntoRecords {
            extractor: self.extractor,
            items: self.items.into_iter(),
        }
    }
}
