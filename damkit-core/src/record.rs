//! A single catalog record.
//!
//! A [`Record`] couples one backend item with the [`FieldExtractor`] of the
//! query result it came from. String reads go through a per-record cache that
//! is filled on demand; every write is persisted on the item immediately.

use crate::{
    Result,
    backend::DamItem,
    constants::{IDENTIFIER_UNAVAILABLE, field_names},
    error::DamError,
    extractor::FieldExtractor,
    guid::extract_guid,
    metadata::write_metadata,
    models::{AssetReference, AssetXRef, FieldId, FieldValue, RelationType, TableValue},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// One record of a catalog
pub struct Record {
    extractor: Arc<FieldExtractor>,
    item: Arc<dyn DamItem>,
    identifier: Mutex<Option<String>>,
    field_values: Mutex<HashMap<String, String>>,
}

impl Record {
    /// Wraps one item with the extractor of its query result
    pub fn new(extractor: Arc<FieldExtractor>, item: Arc<dyn DamItem>) -> Self {
        Self {
            extractor,
            item,
            identifier: Mutex::new(None),
            field_values: Mutex::new(HashMap::new()),
        }
    }

    /// Name of the catalog the record belongs to.
    pub fn catalog(&self) -> &str {
        self.extractor.catalog()
    }

    /// Underlying server item
    pub fn item(&self) -> &Arc<dyn DamItem> {
        &self.item
    }

    /// Extractor for this record's layout
    pub fn extractor(&self) -> &Arc<FieldExtractor> {
        &self.extractor
    }

    /// The record's identifier, derived from its `GUID` field.
    ///
    /// Computed once. When derivation fails the error is returned and the
    /// identifier is fixed to a placeholder, which later calls return.
    ///
    /// # Errors
    /// Returns error if the `GUID` field cannot be read or is empty
    pub fn identifier(&self) -> Result<String> {
        let mut identifier = self.identifier.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(identifier) = identifier.as_ref() {
            return Ok(identifier.clone());
        }

        match self
            .field(field_names::GUID)
            .and_then(|raw| extract_guid(&raw))
        {
            Ok(extracted) => {
                *identifier = Some(extracted.clone());
                Ok(extracted)
            }
            Err(e) => {
                *identifier = Some(IDENTIFIER_UNAVAILABLE.to_string());
                Err(e)
            }
        }
    }

    /// The string value of a field.
    ///
    /// # Errors
    /// Returns [`DamError::FieldNotFound`] for unknown fields and
    /// [`DamError::FieldAccess`] when the value cannot be retrieved
    pub fn field(&self, name: &str) -> Result<String> {
        if let Some(value) = self.cached(name) {
            return Ok(value);
        }

        let id = self.extractor.field_id(name)?;
        match self.item.string_value(&id) {
            Ok(value) => {
                self.cache(name, value.clone());
                Ok(value)
            }
            Err(e) => {
                let known: Vec<String> = self
                    .field_values
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .keys()
                    .cloned()
                    .collect();
                tracing::error!(
                    "Failed to extract field value. Field name: '{}', field id: {}, item: '{}', cached fields: {:?}",
                    name,
                    id,
                    self.item.display_string(),
                    known
                );
                Err(DamError::field_access(name, "Could not retrieve string value", e))
            }
        }
    }

    /// The string value of a field, or `None` if the field holds no value.
    ///
    /// # Errors
    /// Returns [`DamError::FieldNotFound`] for unknown fields and
    /// [`DamError::FieldAccess`] when a stored value cannot be retrieved
    pub fn field_or_none(&self, name: &str) -> Result<Option<String>> {
        if let Some(value) = self.cached(name) {
            return Ok(Some(value));
        }

        let id = self.extractor.field_id(name)?;
        if !self.item.has_value(&id) {
            return Ok(None);
        }
        self.field(name).map(Some)
    }

    /// Writes a string value and persists the item.
    ///
    /// # Errors
    /// Returns error if the field is unknown or the backend rejects the write
    pub fn set_field(&self, name: &str, value: &str) -> Result<()> {
        self.write_value(name, FieldValue::String(value.to_string()))
    }

    /// Writes a date value and persists the item.
    ///
    /// # Errors
    /// Returns error if the field is unknown or the backend rejects the write
    pub fn set_date_field(&self, name: &str, value: DateTime<Utc>) -> Result<()> {
        self.write_value(name, FieldValue::Date(value))
    }

    /// Writes a boolean value and persists the item.
    ///
    /// # Errors
    /// Returns error if the field is unknown or the backend rejects the write
    pub fn set_bool_field(&self, name: &str, value: bool) -> Result<()> {
        self.write_value(name, FieldValue::Boolean(value))
    }

    /// Selects an enumerator choice by its display string and persists the item.
    ///
    /// # Errors
    /// Returns [`DamError::InvalidArgument`] if the field has no such choice,
    /// or error if the backend rejects the write
    pub fn set_enum_field(&self, name: &str, display: &str) -> Result<()> {
        let definition = self.extractor.definition(name)?;
        let choice = definition.choice(display).ok_or_else(|| {
            DamError::invalid_argument(format!(
                "'{}' is not a valid value for the field '{}'",
                display, name
            ))
        })?;
        self.write_value(name, FieldValue::Enumerator(choice))
    }

    fn write_value(&self, name: &str, value: FieldValue) -> Result<()> {
        let id = self.extractor.field_id(name)?;
        let canonical = value.canonical_string();
        let kind = value.kind();

        self.item
            .set_value(&id, value)
            .and_then(|()| self.item.save())
            .map_err(|e| {
                tracing::error!(
                    "Could not set {} value for the field '{}' on '{}': {}",
                    kind,
                    name,
                    self.item.display_string(),
                    e
                );
                DamError::field_access(name, format!("Could not set {} value", kind), e)
            })?;
        tracing::debug!("Persisted new {} value for field '{}'", kind, name);

        match canonical {
            Some(value) => self.cache(name, value),
            None => {
                self.field_values
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(name);
            }
        }
        Ok(())
    }

    /// The value of a long (or integer) field.
    ///
    /// # Errors
    /// Returns error if the field is unknown, empty or not numeric
    pub fn long_field(&self, name: &str) -> Result<i64> {
        match self.required_value(name)? {
            FieldValue::Long(value) => Ok(value),
            FieldValue::Integer(value) => Ok(i64::from(value)),
            other => Err(self.unexpected(name, "long", &other)),
        }
    }

    /// The value of an integer field.
    ///
    /// # Errors
    /// Returns error if the field is unknown, empty or not an integer
    pub fn int_field(&self, name: &str) -> Result<i32> {
        match self.required_value(name)? {
            FieldValue::Integer(value) => Ok(value),
            other => Err(self.unexpected(name, "integer", &other)),
        }
    }

    /// The asset reference stored in a binary field.
    ///
    /// # Errors
    /// Returns error if the field is unknown, empty or not an asset reference
    pub fn asset_reference(&self, name: &str) -> Result<AssetReference> {
        match self.required_value(name)? {
            FieldValue::AssetReference(reference) => Ok(reference),
            other => Err(self.unexpected(name, "asset reference", &other)),
        }
    }

    /// The value of a table field.
    ///
    /// # Errors
    /// Returns error if the field is unknown, empty or not a table
    pub fn table_value(&self, name: &str) -> Result<TableValue> {
        match self.required_value(name)? {
            FieldValue::Table(table) => Ok(table),
            other => Err(self.unexpected(name, "table", &other)),
        }
    }

    /// Id of a field of this record's catalog.
    ///
    /// # Errors
    /// Returns [`DamError::FieldNotFound`] for unknown fields
    pub fn field_id(&self, name: &str) -> Result<FieldId> {
        self.extractor.field_id(name)
    }

    /// Ids of the categories the record is assigned to.
    ///
    /// # Errors
    /// Returns error if the backend cannot list the categories
    pub fn categories(&self) -> Result<Vec<i32>> {
        self.item.category_ids()
    }

    /// String form of any scalar field, bypassing the cache.
    ///
    /// `None` when the field is unknown, empty or has no string form.
    ///
    /// # Errors
    /// Returns error if the backend fails to read the value
    pub fn field_value_for_non_string_field(&self, name: &str) -> Result<Option<String>> {
        self.extractor.string_value_for_field(name, self.item.as_ref())
    }

    /// Whether the record lists sub-assets.
    ///
    /// # Errors
    /// Returns error if the catalog has no sub-asset field
    pub fn is_master_asset(&self) -> Result<bool> {
        let id = self.extractor.field_id(field_names::RELATED_SUB_ASSETS)?;
        Ok(self.item.has_value(&id))
    }

    /// Whether the record lists master assets.
    ///
    /// # Errors
    /// Returns error if the catalog has no master-asset field
    pub fn is_sub_asset(&self) -> Result<bool> {
        let id = self.extractor.field_id(field_names::RELATED_MASTER_ASSETS)?;
        Ok(self.item.has_value(&id))
    }

    /// Registers `other` as a master asset of this record.
    ///
    /// # Errors
    /// Returns error if the relation cannot be written
    pub fn add_master_asset(&self, other: &Record) -> Result<()> {
        self.create_relation_to_record(
            other,
            field_names::RELATED_MASTER_ASSETS,
            RelationType::Alternate,
        )
    }

    /// Registers `other` as a sub-asset of this record.
    ///
    /// # Errors
    /// Returns error if the relation cannot be written
    pub fn add_sub_asset(&self, other: &Record) -> Result<()> {
        self.create_relation_to_record(
            other,
            field_names::RELATED_SUB_ASSETS,
            RelationType::Alternate,
        )
    }

    /// Adds a cross-reference from this record to `other` through the named
    /// field, then persists the item.
    ///
    /// # Errors
    /// Returns error if the field is unknown, holds another kind of value, or
    /// the backend rejects the write
    pub fn create_relation_to_record(
        &self,
        other: &Record,
        field_name: &str,
        relation: RelationType,
    ) -> Result<()> {
        let id = self.extractor.field_id(field_name)?;
        let current = self
            .item
            .value(&id)
            .map_err(|e| DamError::field_access(field_name, "Could not read relations", e))?;
        let mut xref = match current {
            Some(FieldValue::AssetXRef(xref)) => xref,
            None => AssetXRef::new(),
            Some(found) => {
                return Err(self.unexpected(field_name, "asset cross-reference", &found));
            }
        };
        xref.add_reference(relation, other.item.id(), other.item.display_string());

        tracing::debug!(
            "Adding {} relation from '{}' to '{}' through '{}'",
            relation,
            self.item.display_string(),
            other.item.display_string(),
            field_name
        );
        self.write_value(field_name, FieldValue::AssetXRef(xref))
    }

    /// Fails unless every named field exists and holds data.
    ///
    /// # Errors
    /// Returns [`DamError::Validation`] listing every offending field
    pub fn validate_fields_have_value<I, S>(&self, required: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = self.extractor.extract_all(self.item.as_ref())?;
        let violations: Vec<String> = required
            .into_iter()
            .filter_map(|name| {
                let name = name.as_ref();
                match fields.get(name) {
                    None => Some(format!("The field '{}' does not exist.", name)),
                    Some(field) if field.is_empty() => {
                        Some(format!("The field '{}' does not contain any data.", name))
                    }
                    Some(_) => None,
                }
            })
            .collect();
        self.validation_result(violations)
    }

    /// Fails unless every named field exists in the layout.
    ///
    /// # Errors
    /// Returns [`DamError::Validation`] listing every missing field
    pub fn validate_fields_exist<I, S>(&self, required: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let layout = self.extractor.layout();
        let violations: Vec<String> = required
            .into_iter()
            .filter(|name| !layout.iter().any(|d| d.name == name.as_ref()))
            .map(|name| format!("The field '{}' does not exist.", name.as_ref()))
            .collect();
        self.validation_result(violations)
    }

    fn validation_result(&self, violations: Vec<String>) -> Result<()> {
        if violations.is_empty() {
            return Ok(());
        }
        tracing::warn!(
            "The following field(s) of '{}' did not live up to the requirements:\n{}",
            self.item.display_string(),
            violations.join("\n")
        );
        Err(DamError::Validation { violations })
    }

    /// Writes every populated field as an XML metadata document.
    ///
    /// # Errors
    /// Returns error if extraction fails or the document cannot be written
    pub fn write_field_metadata<W: Write>(&self, out: W) -> Result<()> {
        let fields = self.extractor.extract_populated(self.item.as_ref())?;
        write_metadata(fields.values(), out)
    }

    fn required_value(&self, name: &str) -> Result<FieldValue> {
        let id = self.extractor.field_id(name)?;
        self.item
            .value(&id)
            .and_then(|value| {
                value.ok_or_else(|| DamError::backend(format!("Field {} has no value", id)))
            })
            .map_err(|e| DamError::field_access(name, "Could not read value", e))
    }

    fn unexpected(&self, name: &str, expected: &str, found: &FieldValue) -> DamError {
        DamError::field_access(
            name,
            format!("Expected {} value", expected),
            DamError::backend(format!(
                "Item '{}' holds a {} value",
                self.item.display_string(),
                found.kind()
            )),
        )
    }

    fn cached(&self, name: &str) -> Option<String> {
        self.field_values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn cache(&self, name: &str, value: String) {
        self.field_values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("catalog", &self.catalog())
            .field("item", &self.item.id())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let identifier = self
            .identifier()
            .unwrap_or_else(|_| IDENTIFIER_UNAVAILABLE.to_string());
        write!(f, "[Record: {} -> {}]", self.catalog(), identifier)
    }
}
