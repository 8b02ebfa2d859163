//! Layout-driven conversion of items into [`Field`]s.
//!
//! A [`FieldExtractor`] is created per query result and shared by every
//! [`Record`] of that result. It walks the catalog layout in declared order
//! and turns each stored value into one of the [`Field`] shapes, resolving
//! master/sub-asset cross-references into their peers' identifiers on the way.

use crate::{
    Result,
    backend::FieldSource,
    constants::{MISSING_PEER_IDENTIFIER, field_names, is_relation_field},
    error::DamError,
    models::{
        AssetReference, AssetXRef, DATE_ONLY_FORMAT, Field, FieldDefinition, FieldId, FieldType,
        FieldValue, Layout, Row, TableValue, ValueInterpretation, date_only_from_integer,
        fold_field_name,
    },
    record::Record,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Looks up records by name; used to resolve related assets.
pub trait RecordLookup: Send + Sync {
    /// The first record of `catalog` named `name`, if any.
    ///
    /// # Errors
    /// Returns error if the lookup itself fails
    fn find_by_name(&self, catalog: &str, name: &str) -> Result<Option<Record>>;
}

/// Extracts the fields of items of one catalog.
pub struct FieldExtractor {
    layout: Layout,
    catalog: String,
    lookup: Arc<dyn RecordLookup>,
    field_ids: Mutex<HashMap<String, FieldId>>,
}

impl std::fmt::Debug for FieldExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldExtractor")
            .field("catalog", &self.catalog)
            .field("fields", &self.layout.len())
            .finish_non_exhaustive()
    }
}

impl FieldExtractor {
    /// Creates an extractor for the items of one query result.
    pub fn new(layout: Layout, catalog: impl Into<String>, lookup: Arc<dyn RecordLookup>) -> Self {
        Self {
            layout,
            catalog: catalog.into(),
            lookup,
            field_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Catalog the items came from
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    /// Field layout
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Extracts every field that holds a value, in layout order.
    ///
    /// # Errors
    /// Returns error if reading a value or resolving a related asset fails
    pub fn extract_populated<S>(&self, item: &S) -> Result<IndexMap<String, Field>>
    where
        S: FieldSource + ?Sized,
    {
        self.extract(item, true)
    }

    /// Extracts every field of the layout; fields without a value are
    /// returned as [`Field::Empty`].
    ///
    /// # Errors
    /// Returns error if reading a value or resolving a related asset fails
    pub fn extract_all<S>(&self, item: &S) -> Result<IndexMap<String, Field>>
    where
        S: FieldSource + ?Sized,
    {
        self.extract(item, false)
    }

    /// Every populated field with a string form, as name to value.
    ///
    /// # Errors
    /// Returns error if reading a value or resolving a related asset fails
    pub fn string_map<S>(&self, item: &S) -> Result<IndexMap<String, String>>
    where
        S: FieldSource + ?Sized,
    {
        Ok(self
            .extract_populated(item)?
            .into_iter()
            .filter_map(|(name, field)| match field {
                Field::String(field) => Some((name, field.value().to_string())),
                _ => None,
            })
            .collect())
    }

    /// Resolves a field name to its id, ignoring case. With several fields of
    /// the same name the first one in the layout wins.
    ///
    /// # Errors
    /// Returns [`DamError::FieldNotFound`] if no field has that name
    pub fn field_id(&self, name: &str) -> Result<FieldId> {
        let key = fold_field_name(name);
        let mut field_ids = self.field_ids.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = field_ids.get(&key) {
            return Ok(*id);
        }

        let id = self.definition(name)?.id;
        field_ids.insert(key, id);
        Ok(id)
    }

    /// The layout entry of a field, matched like [`FieldExtractor::field_id`].
    ///
    /// # Errors
    /// Returns [`DamError::FieldNotFound`] if no field has that name
    pub fn definition(&self, name: &str) -> Result<&FieldDefinition> {
        self.layout
            .by_name(name)
            .ok_or_else(|| DamError::field_not_found(name))
    }

    /// String form of a single field, without caching.
    ///
    /// `None` for unknown fields, fields without a value and fields whose
    /// value has no string form (tables, related assets, audio, pictures).
    ///
    /// # Errors
    /// Returns error if the backend fails to read the value
    pub fn string_value_for_field<S>(&self, name: &str, item: &S) -> Result<Option<String>>
    where
        S: FieldSource + ?Sized,
    {
        let Some(definition) = self.layout.by_name(name) else {
            return Ok(None);
        };
        if definition.field_type == FieldType::Table || is_relation_field(&definition.name) {
            return Ok(None);
        }

        match self.extract_field(definition, item)? {
            Field::String(field) => Ok(Some(field.value().to_string())),
            _ => Ok(None),
        }
    }

    fn extract<S>(&self, item: &S, populated_only: bool) -> Result<IndexMap<String, Field>>
    where
        S: FieldSource + ?Sized,
    {
        let mut fields = IndexMap::with_capacity(self.layout.len());
        for definition in &self.layout {
            if populated_only && !item.has_value(&definition.id) {
                tracing::trace!("No value for field '{}'", definition.name);
                continue;
            }
            let field = self.extract_field(definition, item)?;
            fields.insert(field.name().to_string(), field);
        }
        Ok(fields)
    }

    fn extract_field<S>(&self, definition: &FieldDefinition, item: &S) -> Result<Field>
    where
        S: FieldSource + ?Sized,
    {
        let name = definition.name.as_str();
        let field_type = definition.field_type;
        if !item.has_value(&definition.id) {
            return Ok(Field::empty(name, field_type));
        }

        let value = item.value(&definition.id).map_err(|e| {
            DamError::field_access(name, format!("Could not read {} value", field_type), e)
        })?;
        let Some(value) = value else {
            return Ok(Field::empty(name, field_type));
        };

        match field_type {
            FieldType::Boolean
            | FieldType::Date
            | FieldType::Double
            | FieldType::Enumerator
            | FieldType::Long
            | FieldType::String => Ok(Field::string(name, field_type, scalar(definition, &value)?)),
            FieldType::Integer if definition.interpretation == ValueInterpretation::DateOnly => {
                tracing::trace!("Field '{}' holds a date-only value", name);
                Ok(Field::string(name, field_type, date_only(definition, &value)?))
            }
            FieldType::Integer => Ok(Field::string(name, field_type, scalar(definition, &value)?)),
            FieldType::Table => match value {
                FieldValue::Table(table) => Ok(Field::table(name, field_type, self.rows(&table)?)),
                other => Err(mismatch(definition, &other)),
            },
            FieldType::Binary => {
                tracing::trace!(
                    "Extracting binary field '{}' through its asset reference",
                    name
                );
                match value {
                    FieldValue::AssetXRef(xref) if is_relation_field(name) => {
                        self.related_assets(definition, &xref)
                    }
                    FieldValue::AssetReference(reference) => {
                        Ok(asset_reference_field(definition, &reference))
                    }
                    other => Err(mismatch(definition, &other)),
                }
            }
            FieldType::Audio | FieldType::Picture | FieldType::Unsupported(_) => {
                tracing::trace!(
                    "Field type {} is not handled, returning an empty field for '{}'",
                    field_type,
                    name
                );
                Ok(Field::empty(name, field_type))
            }
        }
    }

    fn rows(&self, table: &TableValue) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(table.rows.len());
        for table_row in &table.rows {
            let mut row = Row::new();
            for column in &table.layout {
                if !table_row.has_value(&column.id) {
                    continue;
                }
                if let Field::String(field) = self.extract_field(column, table_row)? {
                    row.insert(column.name.clone(), field.value().to_string());
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Resolves the peers of a relation field, sorted by name.
    ///
    /// Peers without an intellectual entity identifier get a fresh one, which
    /// is written back onto the peer. Two extractors resolving the same peer
    /// concurrently may both assign one; the last write wins.
    fn related_assets(&self, definition: &FieldDefinition, xref: &AssetXRef) -> Result<Field> {
        let mut names: Vec<String> = xref.display_names().map(str::to_string).collect();
        names.sort();
        tracing::debug!(
            "Resolving {} related asset(s) of field '{}'",
            names.len(),
            definition.name
        );

        let mut peers = Vec::with_capacity(names.len());
        for name in names {
            let Some(peer) = self.lookup.find_by_name(&self.catalog, &name)? else {
                tracing::warn!("Could not find related asset: '{}'", name);
                peers.push((name, MISSING_PEER_IDENTIFIER.to_string()));
                continue;
            };

            let identifier = match peer
                .field_or_none(field_names::RELATED_OBJECT_IDENTIFIER_VALUE_INTELLECTUAL_ENTITY)?
            {
                Some(identifier) if !identifier.trim().is_empty() => identifier,
                _ => {
                    let identifier = Uuid::new_v4().to_string();
                    tracing::debug!(
                        "Assigning identifier {} to related asset '{}'",
                        identifier,
                        name
                    );
                    peer.set_field(
                        field_names::RELATED_OBJECT_IDENTIFIER_VALUE_INTELLECTUAL_ENTITY,
                        &identifier,
                    )?;
                    identifier
                }
            };
            peers.push((name, identifier));
        }

        Ok(Field::assets(&definition.name, definition.field_type, peers))
    }
}

fn scalar(definition: &FieldDefinition, value: &FieldValue) -> Result<String> {
    value
        .canonical_string()
        .ok_or_else(|| mismatch(definition, value))
}

/// Date-only display string (`YYYY-MM-DD`) of an integer field with the
/// date-only interpretation.
fn date_only(definition: &FieldDefinition, value: &FieldValue) -> Result<String> {
    let date = match value {
        FieldValue::DateOnly(date) => Some(*date),
        FieldValue::Integer(raw) => date_only_from_integer(*raw),
        _ => None,
    };
    date.map(|date| date.format(DATE_ONLY_FORMAT).to_string())
        .ok_or_else(|| mismatch(definition, value))
}

fn asset_reference_field(definition: &FieldDefinition, reference: &AssetReference) -> Field {
    match reference.parts.first() {
        Some(part) => Field::string(&definition.name, definition.field_type, &part.display_string),
        None => {
            tracing::warn!(
                "Asset reference of field '{}' has no parts",
                definition.name
            );
            Field::empty(&definition.name, definition.field_type)
        }
    }
}

fn mismatch(definition: &FieldDefinition, value: &FieldValue) -> DamError {
    DamError::field_access(
        &definition.name,
        format!("Declared as {}", definition.field_type),
        DamError::backend(format!("Found a {} value", value.kind())),
    )
}
