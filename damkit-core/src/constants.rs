//! Well-known field names and values of the DAM catalogs.

/// Names of the fields this layer reads or writes directly.
pub mod field_names {
    /// The name of the record (usually the file name of the asset).
    pub const RECORD_NAME: &str = "Record Name";
    /// The name of the catalog a record belongs to.
    pub const CATALOG_NAME: &str = "Catalog Name";
    /// The persistent identifier of a record, with a vendor-specific prefix.
    pub const GUID: &str = "GUID";
    /// The registration state of a record.
    pub const REGISTRATION_STATE: &str = "Registration State";
    /// Cross-reference field listing the sub-assets of a master asset.
    pub const RELATED_SUB_ASSETS: &str = "Related Sub Assets";
    /// Cross-reference field listing the master assets of a sub-asset.
    pub const RELATED_MASTER_ASSETS: &str = "Related Master Assets";
    /// Identifier of the intellectual entity a related asset belongs to.
    pub const RELATED_OBJECT_IDENTIFIER_VALUE_INTELLECTUAL_ENTITY: &str =
        "relatedObjectIdentifierValue_intellectualEntity";
}

/// Field values with a fixed meaning.
pub mod field_values {
    /// Registration state of records whose registration is complete.
    pub const REGISTRATION_STATE_FINISHED: &str = "finished";
}

/// Identifier recorded for a related asset whose record cannot be found.
pub const MISSING_PEER_IDENTIFIER: &str = "N/A";

/// Identifier cached on a record after its identifier could not be derived.
pub const IDENTIFIER_UNAVAILABLE: &str = "IDENTIFIER COULD NOT BE EXTRACTED";

/// Returns whether the named field holds master/sub-asset cross-references.
pub fn is_relation_field(name: &str) -> bool {
    name == field_names::RELATED_SUB_ASSETS || name == field_names::RELATED_MASTER_ASSETS
}
