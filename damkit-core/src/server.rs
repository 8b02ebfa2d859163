//! Access to a DAM server.
//!
//! [`DamServer`] owns the backend runtime and the session, caches opened
//! catalogs and looks records up through the canned queries. A session that
//! the server has dropped is replaced transparently on the next access.

use crate::{
    Result,
    backend::{Category, DamBackend, DamCatalog, DamSession},
    collection::RecordCollection,
    config::ServerConfig,
    extractor::{FieldExtractor, RecordLookup},
    query::Query,
    record::Record,
    security::Credentials,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle to a connected DAM server. Clones share the connection.
///
/// The backend runtime is stopped by [`DamServer::close`] or when the last
/// handle is dropped.
///
/// # Example
/// ```rust,no_run
/// use damkit_core::{backend::create_backend, config::ServerConfig, security::Credentials};
/// use damkit_core::server::DamServer;
///
/// let config = ServerConfig::new("file:///srv/dam/photos.json".to_string())
///     .with_catalog("Photos".to_string());
/// let backend = create_backend(&config.server_url)?;
/// let server = DamServer::connect(backend, config, Credentials::new("archivist".to_string(), None))?;
///
/// if let Some(record) = server.find_by_name("Photos", "img001.tif")? {
///     record.write_field_metadata(std::io::stdout())?;
/// }
/// # Ok::<(), damkit_core::error::DamError>(())
/// ```
#[derive(Clone)]
pub struct DamServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    backend: Arc<dyn DamBackend>,
    config: ServerConfig,
    credentials: Credentials,
    state: Mutex<ServerState>,
    closed: AtomicBool,
}

struct ServerState {
    session: Arc<dyn DamSession>,
    catalogs: HashMap<String, Arc<dyn DamCatalog>>,
}

impl DamServer {
    /// Starts the backend runtime and opens a session.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, the runtime cannot be
    /// started or the connection is refused
    pub fn connect(
        backend: Arc<dyn DamBackend>,
        config: ServerConfig,
        credentials: Credentials,
    ) -> Result<Self> {
        config.validate()?;
        backend.start()?;

        let session = match backend.open_connection(&config, &credentials) {
            Ok(session) => session,
            Err(e) => {
                backend.stop();
                return Err(e);
            }
        };
        tracing::info!(
            "Connected to {} through the {} backend",
            config,
            backend.backend_name()
        );

        Ok(Self {
            inner: Arc::new(ServerInner {
                backend,
                config,
                credentials,
                state: Mutex::new(ServerState {
                    session,
                    catalogs: HashMap::new(),
                }),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// The configured catalogs.
    pub fn catalog_names(&self) -> &[String] {
        &self.inner.config.catalogs
    }

    /// Opens a catalog, reusing an already opened one.
    ///
    /// # Errors
    /// Returns error if reconnecting fails or the catalog cannot be opened
    pub fn catalog(&self, name: &str) -> Result<Arc<dyn DamCatalog>> {
        let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.ensure_connected(&mut state)?;

        if let Some(catalog) = state.catalogs.get(name) {
            return Ok(Arc::clone(catalog));
        }

        if !self.inner.config.has_catalog(name) {
            tracing::debug!("Opening catalog '{}' which is not configured", name);
        }
        let id = state.session.find_catalog_id(name)?;
        let catalog = state.session.open_catalog(id)?;
        tracing::debug!("Opened catalog '{}' (id {})", name, id);
        state.catalogs.insert(name.to_string(), Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Runs a query against a catalog.
    ///
    /// # Errors
    /// Returns error if the catalog cannot be opened or the query fails
    pub fn items(&self, catalog: &str, query: &Query) -> Result<RecordCollection> {
        let result = self.catalog(catalog)?.find(query)?;
        let lookup: Arc<dyn RecordLookup> = Arc::new(self.clone());
        let extractor = Arc::new(FieldExtractor::new(result.layout, catalog, lookup));
        Ok(RecordCollection::new(extractor, result.items))
    }

    /// Finds the registered record whose identifier contains `identifier`.
    ///
    /// # Errors
    /// Returns error if the query cannot be built or executed
    pub fn find_by_identifier(&self, catalog: &str, identifier: &str) -> Result<Option<Record>> {
        let query = Query::by_identifier(catalog, identifier)?;
        self.first_match(catalog, &query)
    }

    /// Finds a record by its record name.
    ///
    /// # Errors
    /// Returns error if the query cannot be built or executed
    pub fn find_by_name(&self, catalog: &str, name: &str) -> Result<Option<Record>> {
        let query = Query::by_record_name(catalog, name)?;
        self.first_match(catalog, &query)
    }

    fn first_match(&self, catalog: &str, query: &Query) -> Result<Option<Record>> {
        let records = self.items(catalog, query)?;
        match records.len() {
            0 => tracing::info!("No records found for {} in catalog '{}'", query, catalog),
            1 => {}
            count => tracing::warn!(
                "{} records found for {} in catalog '{}', using the first",
                count,
                query,
                catalog
            ),
        }
        Ok(records.into_iter().next())
    }

    /// Looks up a category of a catalog.
    ///
    /// # Errors
    /// Returns error if the catalog cannot be opened or the lookup fails
    pub fn category(&self, catalog: &str, id: i32) -> Result<Option<Category>> {
        self.catalog(catalog)?.category(id)
    }

    /// Stops the backend runtime. Further lookups fail.
    pub fn close(&self) {
        self.inner.shutdown();
    }
}

impl RecordLookup for DamServer {
    fn find_by_name(&self, catalog: &str, name: &str) -> Result<Option<Record>> {
        DamServer::find_by_name(self, catalog, name)
    }
}

impl std::fmt::Debug for DamServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DamServer")
            .field("config", &self.inner.config)
            .field("backend", &self.inner.backend.backend_name())
            .finish_non_exhaustive()
    }
}

impl ServerInner {
    /// Replaces a dead session. Runs under the state lock, so concurrent
    /// callers reconnect once.
    fn ensure_connected(&self, state: &mut ServerState) -> Result<()> {
        if state.session.is_alive() {
            return Ok(());
        }

        tracing::warn!(
            "Session to {} is no longer alive, reconnecting",
            crate::error::redact_server_url(&self.config.server_url)
        );
        state.session = self.backend.open_connection(&self.config, &self.credentials)?;
        state.catalogs.clear();
        Ok(())
    }

    fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Stopping the {} backend", self.backend.backend_name());
            self.backend.stop();
        }
    }
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
