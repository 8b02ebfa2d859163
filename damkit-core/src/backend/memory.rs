//! In-memory DAM backend.
//!
//! Holds catalogs, items and categories in process memory. It evaluates the
//! clause-based query expressions produced by [`Query`]'s canned constructors
//! and can be loaded from a JSON catalog snapshot. Used by the test suites and
//! by the extraction tool for offline snapshots.

use crate::{
    Result,
    backend::{Category, DamBackend, DamCatalog, DamItem, DamSession, FieldSource, QueryResult},
    config::ServerConfig,
    constants::field_names,
    error::DamError,
    models::{FieldId, FieldValue, Layout},
    query::{FindFlag, Operator, Query},
    security::Credentials,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// JSON snapshot of a set of catalogs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Catalogs in load order
    pub catalogs: Vec<CatalogSnapshot>,
}

/// One catalog of a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Catalog name
    pub name: String,
    /// Field layout shared by every record
    pub layout: Layout,
    /// Category tree entries
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Catalog records
    #[serde(default)]
    pub records: Vec<RecordSnapshot>,
}

/// One record of a snapshot; values are keyed by field name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSnapshot {
    /// Field values
    #[serde(default)]
    pub fields: IndexMap<String, FieldValue>,
    /// Identifiers of assigned categories
    #[serde(default)]
    pub categories: Vec<i32>,
}

/// In-memory implementation of [`DamBackend`]
#[derive(Default)]
pub struct MemoryBackend {
    catalogs: Arc<RwLock<Vec<Arc<MemoryCatalog>>>>,
    credentials: Option<Credentials>,
    sessions: Mutex<Vec<Arc<MemorySession>>>,
    started: AtomicBool,
    connections: AtomicUsize,
}

impl MemoryBackend {
    /// Creates a backend without catalogs
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires every connection to present exactly these credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Adds a catalog; catalog ids are assigned in insertion order from 1.
    pub fn add_catalog(&self, catalog: MemoryCatalog) -> Arc<MemoryCatalog> {
        let catalog = Arc::new(catalog);
        self.catalogs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&catalog));
        catalog
    }

    /// Looks up a catalog by name
    pub fn catalog(&self, name: &str) -> Option<Arc<MemoryCatalog>> {
        self.catalogs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|catalog| catalog.name == name)
            .cloned()
    }

    /// Marks every open session dead, as if the server dropped them.
    pub fn kill_sessions(&self) {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        for session in sessions.iter() {
            session.alive.store(false, Ordering::SeqCst);
        }
        tracing::debug!("Killed {} in-memory session(s)", sessions.len());
    }

    /// Number of sessions opened so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Whether a session is open
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Loads a JSON snapshot from disk.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or does not describe valid
    /// catalogs
    pub fn from_snapshot_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DamError::io(format!("Failed to read snapshot: {}", path.display()), e)
        })?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            DamError::serialization(format!("Invalid snapshot: {}", path.display()), e)
        })?;
        tracing::debug!(
            "Loaded snapshot {} with {} catalog(s)",
            path.display(),
            snapshot.catalogs.len()
        );
        Self::from_snapshot(snapshot)
    }

    /// Builds a backend from a parsed snapshot.
    ///
    /// # Errors
    /// Returns error if a record names a field its catalog does not declare
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let backend = Self::new();
        for catalog_snapshot in snapshot.catalogs {
            let catalog = MemoryCatalog::new(catalog_snapshot.name, catalog_snapshot.layout);
            for category in catalog_snapshot.categories {
                catalog.add_category(category.id, category.name);
            }
            for record in catalog_snapshot.records {
                let item = catalog.add_record(record.fields)?;
                for category in record.categories {
                    item.assign_category(category);
                }
            }
            backend.add_catalog(catalog);
        }
        Ok(backend)
    }

    fn check_login(&self, config: &ServerConfig, credentials: &Credentials) -> Result<()> {
        let Some(expected) = &self.credentials else {
            return Ok(());
        };
        if expected.username() == credentials.username()
            && expected.password() == credentials.password()
        {
            Ok(())
        } else {
            Err(DamError::connection_failed(
                &config.server_url,
                DamError::backend(format!("Login rejected for user '{}'", credentials.username())),
            ))
        }
    }
}

impl DamBackend for MemoryBackend {
    fn backend_name(&self) -> &str {
        "memory"
    }

    fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.kill_sessions();
    }

    fn open_connection(
        &self,
        config: &ServerConfig,
        credentials: &Credentials,
    ) -> Result<Arc<dyn DamSession>> {
        if !self.is_started() {
            return Err(DamError::connection_failed(
                &config.server_url,
                DamError::backend("backend runtime is not started"),
            ));
        }
        self.check_login(config, credentials)?;

        let session = Arc::new(MemorySession {
            catalogs: Arc::clone(&self.catalogs),
            alive: AtomicBool::new(true),
        });
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&session));
        self.connections.fetch_add(1, Ordering::SeqCst);

        Ok(session)
    }
}

/// Session handed out by [`MemoryBackend`]
pub struct MemorySession {
    catalogs: Arc<RwLock<Vec<Arc<MemoryCatalog>>>>,
    alive: AtomicBool,
}

impl MemorySession {
    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(DamError::backend("session is no longer alive"))
        }
    }
}

impl DamSession for MemorySession {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn find_catalog_id(&self, name: &str) -> Result<i32> {
        self.ensure_alive()?;
        let catalogs = self.catalogs.read().unwrap_or_else(PoisonError::into_inner);
        catalogs
            .iter()
            .position(|catalog| catalog.name == name)
            .and_then(|index| i32::try_from(index + 1).ok())
            .ok_or_else(|| DamError::query_failed(format!("Catalog '{}' does not exist", name)))
    }

    fn open_catalog(&self, id: i32) -> Result<Arc<dyn DamCatalog>> {
        self.ensure_alive()?;
        let catalogs = self.catalogs.read().unwrap_or_else(PoisonError::into_inner);
        let catalog = usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| catalogs.get(index))
            .ok_or_else(|| DamError::query_failed(format!("No catalog with id {}", id)))?;
        Ok(Arc::clone(catalog) as Arc<dyn DamCatalog>)
    }
}

/// In-memory catalog
pub struct MemoryCatalog {
    name: String,
    layout: Layout,
    items: RwLock<Vec<Arc<MemoryItem>>>,
    categories: RwLock<Vec<Category>>,
    next_id: AtomicI64,
}

impl MemoryCatalog {
    /// Creates an empty catalog
    pub fn new(name: impl Into<String>, layout: Layout) -> Self {
        Self {
            name: name.into(),
            layout,
            items: RwLock::new(Vec::new()),
            categories: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Field layout
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Adds a record from field-name/value pairs.
    ///
    /// # Errors
    /// Returns [`DamError::FieldNotFound`] if a name is not in the layout
    pub fn add_record<I, S>(&self, values: I) -> Result<Arc<MemoryItem>>
    where
        I: IntoIterator<Item = (S, FieldValue)>,
        S: AsRef<str>,
    {
        let mut stored = IndexMap::new();
        for (name, value) in values {
            let definition = self
                .layout
                .by_name(name.as_ref())
                .ok_or_else(|| DamError::field_not_found(name.as_ref()))?;
            stored.insert(definition.id, value);
        }

        let item = Arc::new(MemoryItem {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name_field: self.layout.by_name(field_names::RECORD_NAME).map(|d| d.id),
            values: RwLock::new(stored),
            categories: RwLock::new(Vec::new()),
            failing: RwLock::new(Vec::new()),
            dirty: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
        });
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&item));
        Ok(item)
    }

    /// Adds an entry to the category tree
    pub fn add_category(&self, id: i32, name: impl Into<String>) {
        self.categories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Category {
                id,
                name: name.into(),
            });
    }

    /// All items in insertion order
    pub fn items(&self) -> Vec<Arc<MemoryItem>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Looks up an item by identifier
    pub fn item(&self, id: i64) -> Option<Arc<MemoryItem>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// Finds the first item whose display string equals `name`.
    pub fn item_named(&self, name: &str) -> Option<Arc<MemoryItem>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|item| item.display_string() == name)
            .cloned()
    }

    /// Evaluates one clause against an item. `Ok(None)` means the field is
    /// unknown to this catalog.
    fn clause_matches(
        &self,
        item: &MemoryItem,
        field: &str,
        operator: Operator,
        expected: &str,
    ) -> Result<Option<bool>> {
        let actual = match self.layout.by_name(field) {
            Some(definition) => match item.value(&definition.id)? {
                Some(value) => value.canonical_string(),
                None => None,
            },
            None if field == field_names::CATALOG_NAME => Some(self.name.clone()),
            None => return Ok(None),
        };

        Ok(Some(actual.is_some_and(|actual| match operator {
            Operator::Is => actual == expected,
            Operator::Contains => actual.contains(expected),
        })))
    }
}

impl DamCatalog for MemoryCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, query: &Query) -> Result<QueryResult> {
        let clauses = query.clauses().ok_or_else(|| {
            DamError::query_failed(format!("Cannot evaluate {} in catalog '{}'", query, self.name))
        })?;

        let mut items: Vec<Arc<dyn DamItem>> = Vec::new();
        for item in self.items() {
            let mut matched = true;
            for clause in &clauses {
                match self.clause_matches(&item, clause.field, clause.operator, clause.value)? {
                    Some(true) => {}
                    Some(false) => {
                        matched = false;
                        break;
                    }
                    None if query.has_flag(FindFlag::MissingFieldsAreError) => {
                        return Err(DamError::query_failed(format!(
                            "Unknown field '{}' in catalog '{}'",
                            clause.field, self.name
                        )));
                    }
                    None => {
                        matched = false;
                        break;
                    }
                }
            }
            if matched {
                items.push(item);
            }
        }

        tracing::trace!(
            "{} matched {} item(s) in catalog '{}'",
            query,
            items.len(),
            self.name
        );
        Ok(QueryResult {
            layout: self.layout.clone(),
            items,
        })
    }

    fn category(&self, id: i32) -> Result<Option<Category>> {
        Ok(self
            .categories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|category| category.id == id)
            .cloned())
    }
}

/// In-memory item
pub struct MemoryItem {
    id: i64,
    name_field: Option<FieldId>,
    values: RwLock<IndexMap<FieldId, FieldValue>>,
    categories: RwLock<Vec<i32>>,
    failing: RwLock<Vec<FieldId>>,
    dirty: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryItem {
    /// Assigns the item to a category
    pub fn assign_category(&self, id: i32) {
        let mut categories = self.categories.write().unwrap_or_else(PoisonError::into_inner);
        if !categories.contains(&id) {
            categories.push(id);
        }
    }

    /// Makes every later read or write of the field fail.
    pub fn fail_access_to(&self, id: FieldId) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Whether values were changed since the last save.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn check_access(&self, id: &FieldId) -> Result<()> {
        if self
            .failing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
        {
            return Err(DamError::backend(format!(
                "Access to field {} of item {} failed",
                id, self.id
            )));
        }
        Ok(())
    }
}

impl FieldSource for MemoryItem {
    fn has_value(&self, id: &FieldId) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    fn value(&self, id: &FieldId) -> Result<Option<FieldValue>> {
        self.check_access(id)?;
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }
}

impl DamItem for MemoryItem {
    fn id(&self) -> i64 {
        self.id
    }

    fn display_string(&self) -> String {
        self.name_field
            .and_then(|id| {
                self.values
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&id)
                    .and_then(FieldValue::canonical_string)
            })
            .unwrap_or_else(|| format!("Item {}", self.id))
    }

    fn set_value(&self, id: &FieldId, value: FieldValue) -> Result<()> {
        self.check_access(id)?;
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*id, value);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn category_ids(&self) -> Result<Vec<i32>> {
        Ok(self
            .categories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self) -> Result<()> {
        self.dirty.store(false, Ordering::SeqCst);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
