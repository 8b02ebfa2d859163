//! Core record, field and query model for DAM catalog access.
//!
//! This crate provides a client-side access layer over a digital asset
//! management server: structured queries against catalogs, typed reads and
//! writes of record fields, master/sub-asset relations, and the export of a
//! record's fields as an XML metadata document.
//!
//! # Architecture
//! - The vendor SDK sits behind the traits in [`backend`]; an in-memory
//!   implementation backs tests and JSON catalog snapshots
//! - [`server::DamServer`] owns the session and hands out [`record::Record`]s
//! - [`extractor::FieldExtractor`] turns stored values into [`models::Field`]s,
//!   which [`metadata`] writes as XML
//!
//! # Security Guarantees
//! - Credentials are held in zeroizing containers and never logged
//! - Server URLs are redacted in error messages and logs

pub mod backend;
pub mod collection;
pub mod config;
pub mod constants;
pub mod error;
pub mod extractor;
pub mod guid;
pub mod logging;
pub mod metadata;
pub mod models;
pub mod query;
pub mod record;
pub mod security;
pub mod server;

// Re-export commonly used types
pub use backend::{DamBackend, DamCatalog, DamItem, DamSession, FieldSource, create_backend};
pub use collection::RecordCollection;
pub use config::ServerConfig;
pub use error::{DamError, Result};
pub use extractor::FieldExtractor;
pub use guid::extract_guid;
pub use metadata::write_metadata;
pub use models::{
    AssetEntry, Field, FieldDefinition, FieldId, FieldType, FieldValue, Layout, RelationType,
    ValueInterpretation,
};
pub use query::{CombineMode, FindFlag, Locale, Query};
pub use record::Record;
pub use security::Credentials;
pub use server::DamServer;
