//! Backend traits and factory for DAM server access.
//!
//! The vendor SDK is reached only through the traits in this module: a
//! [`DamBackend`] opens [`DamSession`]s, a session opens [`DamCatalog`]s and
//! a catalog answers queries with [`DamItem`]s. Everything above this module
//! (extractor, records, server facade) is written against these traits, so a
//! native connector plugs in by implementing them.
//!
//! All traits are object-safe and used through `Arc<dyn …>`.

pub mod memory;

use crate::{
    Result,
    config::ServerConfig,
    error::DamError,
    models::{FieldId, FieldValue, Layout},
    query::Query,
    security::Credentials,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A category of a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category identifier
    pub id: i32,
    /// Display name
    pub name: String,
}

/// Items returned by a query, with the layout of their catalog
pub struct QueryResult {
    /// Layout of the catalog the items belong to
    pub layout: Layout,
    /// Matching items, in server order
    pub items: Vec<Arc<dyn DamItem>>,
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("layout", &self.layout)
            .field("items", &self.items.len())
            .finish()
    }
}

/// Runtime of a DAM vendor SDK
pub trait DamBackend: Send + Sync {
    /// Name of the backend, for logs and error messages
    fn backend_name(&self) -> &str;

    /// Starts the SDK runtime. Must be called before opening connections.
    ///
    /// # Errors
    /// Returns error if the runtime cannot be started
    fn start(&self) -> Result<()>;

    /// Stops the SDK runtime. Open sessions become unusable.
    fn stop(&self);

    /// Opens a session to the configured server.
    ///
    /// # Errors
    /// Returns error if the server is unreachable or rejects the login
    fn open_connection(
        &self,
        config: &ServerConfig,
        credentials: &Credentials,
    ) -> Result<Arc<dyn DamSession>>;
}

/// An open connection to a DAM server
pub trait DamSession: Send + Sync {
    /// Whether the session can still be used
    fn is_alive(&self) -> bool;

    /// Looks up the id of a catalog by name.
    ///
    /// # Errors
    /// Returns error if no catalog has that name
    fn find_catalog_id(&self, name: &str) -> Result<i32>;

    /// Opens a catalog by id.
    ///
    /// # Errors
    /// Returns error if the catalog cannot be opened
    fn open_catalog(&self, id: i32) -> Result<Arc<dyn DamCatalog>>;
}

/// An opened catalog
pub trait DamCatalog: Send + Sync {
    /// Catalog name
    fn name(&self) -> &str;

    /// Executes a query against this catalog.
    ///
    /// # Errors
    /// Returns error if the backend cannot evaluate the query
    fn find(&self, query: &Query) -> Result<QueryResult>;

    /// Looks up a category by id.
    ///
    /// # Errors
    /// Returns error on backend failure; an unknown id is `Ok(None)`
    fn category(&self, id: i32) -> Result<Option<Category>>;
}

/// Read access to field values by id. Implemented by items and by table rows.
pub trait FieldSource {
    /// Whether the item holds a value for the field
    fn has_value(&self, id: &FieldId) -> bool;

    /// The stored value, `None` when the field holds nothing.
    ///
    /// # Errors
    /// Returns error if the backend fails to read the value
    fn value(&self, id: &FieldId) -> Result<Option<FieldValue>>;

    /// The canonical string of the stored value.
    ///
    /// # Errors
    /// Returns error when there is no value or the value is not scalar
    fn string_value(&self, id: &FieldId) -> Result<String> {
        match self.value(id)? {
            Some(value) => value.canonical_string().ok_or_else(|| {
                DamError::backend(format!(
                    "Field {} holds a {} value without a string form",
                    id,
                    value.kind()
                ))
            }),
            None => Err(DamError::backend(format!("Field {} has no value", id))),
        }
    }
}

/// One record of a catalog, as stored by the backend
pub trait DamItem: FieldSource + Send + Sync {
    /// Row id of the item within its catalog
    fn id(&self) -> i64;

    /// Human-readable name of the item, usually its record name
    fn display_string(&self) -> String;

    /// Stages a new value for a field. Takes effect on [`DamItem::save`].
    ///
    /// # Errors
    /// Returns error if the backend rejects the value
    fn set_value(&self, id: &FieldId, value: FieldValue) -> Result<()>;

    /// Ids of the categories the item is assigned to.
    ///
    /// # Errors
    /// Returns error on backend failure
    fn category_ids(&self) -> Result<Vec<i32>>;

    /// Persists staged changes.
    ///
    /// # Errors
    /// Returns error if the backend fails to store the item
    fn save(&self) -> Result<()>;
}

impl FieldSource for crate::models::TableRow {
    fn has_value(&self, id: &FieldId) -> bool {
        self.values.contains_key(id)
    }

    fn value(&self, id: &FieldId) -> Result<Option<FieldValue>> {
        Ok(self.values.get(id).cloned())
    }
}

/// Creates a backend for the given server location.
///
/// `file://` URLs and bare paths ending in `.json` open a catalog snapshot
/// with the in-memory backend. Other locations need a native connector,
/// which is not bundled.
///
/// # Errors
/// Returns error if the location is empty, unsupported, or the snapshot
/// cannot be loaded
///
/// # Example
/// ```rust,no_run
/// use damkit_core::backend::create_backend;
///
/// let backend = create_backend("file:///srv/dam/photos.json")?;
/// assert_eq!(backend.backend_name(), "memory");
/// # Ok::<(), damkit_core::error::DamError>(())
/// ```
pub fn create_backend(server_url: &str) -> Result<Arc<dyn DamBackend>> {
    match detect_location(server_url)? {
        Location::Snapshot(path) => {
            let backend = memory::MemoryBackend::from_snapshot_file(&path)?;
            Ok(Arc::new(backend))
        }
        Location::Remote(scheme) => Err(DamError::unsupported_feature(
            format!("'{}' server connections", scheme),
            "damkit (no native connector is bundled)",
        )),
    }
}

enum Location {
    Snapshot(std::path::PathBuf),
    Remote(String),
}

fn detect_location(server_url: &str) -> Result<Location> {
    if server_url.trim().is_empty() {
        return Err(DamError::configuration("server_url cannot be empty"));
    }

    match url::Url::parse(server_url) {
        Ok(parsed) if parsed.scheme() == "file" => parsed
            .to_file_path()
            .map(Location::Snapshot)
            .map_err(|()| {
                DamError::configuration(format!(
                    "Invalid snapshot location: {}",
                    crate::error::redact_server_url(server_url)
                ))
            }),
        // Single letters are drive prefixes of Windows paths, not schemes
        Ok(parsed) if parsed.scheme().len() > 1 => Ok(Location::Remote(parsed.scheme().to_string())),
        _ if server_url.ends_with(".json") => Ok(Location::Snapshot(server_url.into())),
        _ => Err(DamError::configuration(format!(
            "Unrecognized server location: {}",
            crate::error::redact_server_url(server_url)
        ))),
    }
}
