//! Core data models for catalog layouts, field values and extracted fields.
//!
//! A catalog describes its records through a [`Layout`]: an ordered list of
//! [`FieldDefinition`]s. Items store typed [`FieldValue`]s keyed by
//! [`FieldId`], and the extractor flattens those into [`Field`]s, the closed
//! set of shapes the metadata writer understands.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a field within a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(Uuid);

impl FieldId {
    /// Creates a fresh random field identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing identifier.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FieldId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.0)
    }
}

/// Declared storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// True or false
    Boolean,
    /// Point in time
    Date,
    /// Floating point number
    Double,
    /// Choice from a fixed list
    Enumerator,
    /// 32-bit integer
    Integer,
    /// 64-bit integer
    Long,
    /// Plain text
    String,
    /// Opaque bytes
    Binary,
    /// Audio data
    Audio,
    /// Image data
    Picture,
    /// Nested rows with their own layout
    Table,
    /// A type code reported by the backend that this crate does not handle
    Unsupported(i32),
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Double => "double",
            FieldType::Enumerator => "enumerator",
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::String => "string",
            FieldType::Binary => "binary",
            FieldType::Audio => "audio",
            FieldType::Picture => "picture",
            FieldType::Table => "table",
            FieldType::Unsupported(_) => "undefined",
        };
        write!(f, "{}", name)
    }
}

/// Case-folded form of a field name, the key for case-insensitive lookups.
pub fn fold_field_name(name: &str) -> String {
    name.to_lowercase()
}

/// Display format of date-only values
pub const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";

/// Decodes a date-only integer stored as `yyyymmdd` (e.g. `20200102`).
///
/// `None` for negative numbers and impossible dates.
pub fn date_only_from_integer(raw: i32) -> Option<NaiveDate> {
    let raw = u32::try_from(raw).ok()?;
    let year = i32::try_from(raw / 10_000).ok()?;
    NaiveDate::from_ymd_opt(year, (raw / 100) % 100, raw % 100)
}

/// How the raw value of a field should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueInterpretation {
    /// Value is used as stored
    #[default]
    Default,
    /// An integer field that holds a calendar date, either as
    /// [`FieldValue::DateOnly`] or encoded as `yyyymmdd`
    DateOnly,
}

/// One entry of a catalog layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,
    /// Storage type
    pub field_type: FieldType,
    /// Server-side identifier
    #[serde(default)]
    pub id: FieldId,
    /// How stored values are read
    #[serde(default)]
    pub interpretation: ValueInterpretation,
    /// Allowed display strings of an enumerator field, in ordinal order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl FieldDefinition {
    /// Creates a definition with a fresh identifier and default interpretation.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            id: FieldId::new(),
            interpretation: ValueInterpretation::Default,
            choices: Vec::new(),
        }
    }

    /// Sets the field identifier
    pub fn with_id(mut self, id: FieldId) -> Self {
        self.id = id;
        self
    }

    /// Sets the value interpretation
    pub fn with_interpretation(mut self, interpretation: ValueInterpretation) -> Self {
        self.interpretation = interpretation;
        self
    }

    /// Sets the allowed choices of an enumerated field
    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    /// Resolves an enumerator display string against the declared choices.
    pub fn choice(&self, display: &str) -> Option<EnumValue> {
        self.choices
            .iter()
            .position(|choice| choice == display)
            .map(|ordinal| EnumValue {
                display: self.choices[ordinal].clone(),
                ordinal: i32::try_from(ordinal).unwrap_or(i32::MAX),
            })
    }
}

/// Ordered field definitions of a catalog or table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout {
    fields: Vec<FieldDefinition>,
}

impl Layout {
    /// Creates a layout from field definitions in display order.
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self { fields }
    }

    /// Appends a definition, keeping declaration order.
    pub fn with_field(mut self, definition: FieldDefinition) -> Self {
        self.fields.push(definition);
        self
    }

    /// Field definitions in display order
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Iterates the field definitions
    pub fn iter(&self) -> std::slice::Iter<'_, FieldDefinition> {
        self.fields.iter()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the layout has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Finds the first definition whose name matches, ignoring case
    /// (Unicode-aware, so `STØRRELSE` finds `Størrelse`).
    pub fn by_name(&self, name: &str) -> Option<&FieldDefinition> {
        let key = fold_field_name(name);
        self.fields
            .iter()
            .find(|definition| fold_field_name(&definition.name) == key)
    }

    /// Looks up a field by identifier
    pub fn by_id(&self, id: &FieldId) -> Option<&FieldDefinition> {
        self.fields.iter().find(|definition| &definition.id == id)
    }
}

impl<'a> IntoIterator for &'a Layout {
    type Item = &'a FieldDefinition;
    type IntoIter = std::slice::Iter<'a, FieldDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// A selected enumerator choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    /// Display text of the choice
    pub display: String,
    /// Position in the choice list
    pub ordinal: i32,
}

/// The value of a table field: a nested layout plus its rows
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableValue {
    /// Column layout
    pub layout: Layout,
    /// Rows in stored order
    pub rows: Vec<TableRow>,
}

/// One row of a table value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableRow {
    /// Cell values keyed by column
    pub values: IndexMap<FieldId, FieldValue>,
}

impl TableRow {
    /// Creates an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cell value
    pub fn with_value(mut self, id: FieldId, value: FieldValue) -> Self {
        self.values.insert(id, value);
        self
    }
}

/// Reference from a record to its stored asset
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetReference {
    /// Referenced locations
    pub parts: Vec<AssetReferencePart>,
}

/// One location of an asset reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReferencePart {
    /// Human-readable location
    pub display_string: String,
}

impl AssetReference {
    /// A reference with a single part.
    pub fn single(display_string: impl Into<String>) -> Self {
        Self {
            parts: vec![AssetReferencePart {
                display_string: display_string.into(),
            }],
        }
    }
}

/// Kind of relation held by a cross-reference field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    /// Alternate rendition
    Alternate,
    /// Variant of the same asset
    Variant,
    /// Earlier or later version
    Version,
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationType::Alternate => write!(f, "alternate"),
            RelationType::Variant => write!(f, "variant"),
            RelationType::Version => write!(f, "version"),
        }
    }
}

/// One edge of a cross-reference value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetXRefEntry {
    /// Kind of relation
    pub relation: RelationType,
    /// Identifier of the related item
    pub item_id: i64,
    /// Name shown for the related item
    pub display_name: String,
}

/// Cross-references from one record to others
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetXRef {
    /// Relation edges
    pub references: Vec<AssetXRefEntry>,
}

impl AssetXRef {
    /// Creates an empty cross reference
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge; an identical edge is only kept once.
    pub fn add_reference(
        &mut self,
        relation: RelationType,
        item_id: i64,
        display_name: impl Into<String>,
    ) {
        let entry = AssetXRefEntry {
            relation,
            item_id,
            display_name: display_name.into(),
        };
        if !self.references.contains(&entry) {
            self.references.push(entry);
        }
    }

    /// Display names of every referenced item, across all relation types.
    pub fn display_names(&self) -> impl Iterator<Item = &str> {
        self.references
            .iter()
            .map(|entry| entry.display_name.as_str())
    }
}

/// A typed value stored on an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Boolean value
    Boolean(bool),
    /// Timestamp in UTC
    Date(DateTime<Utc>),
    /// Floating point value
    Double(f64),
    /// Selected choice
    Enumerator(EnumValue),
    /// 32-bit value
    Integer(i32),
    /// Calendar date stored in an integer field with date-only interpretation
    DateOnly(NaiveDate),
    /// 64-bit value
    Long(i64),
    /// Text value
    String(String),
    /// Nested table
    Table(TableValue),
    /// Asset location
    AssetReference(AssetReference),
    /// Related assets
    AssetXRef(AssetXRef),
}

impl FieldValue {
    /// Canonical string form of scalar values; `None` for tables and references.
    pub fn canonical_string(&self) -> Option<String> {
        match self {
            FieldValue::Boolean(value) => Some(value.to_string()),
            FieldValue::Date(value) => Some(value.to_rfc3339_opts(SecondsFormat::Secs, true)),
            FieldValue::Double(value) => Some(format!("{:?}", value)),
            FieldValue::Enumerator(value) => Some(value.display.clone()),
            FieldValue::Integer(value) => Some(value.to_string()),
            FieldValue::DateOnly(value) => Some(value.format(DATE_ONLY_FORMAT).to_string()),
            FieldValue::Long(value) => Some(value.to_string()),
            FieldValue::String(value) => Some(value.clone()),
            FieldValue::Table(_) | FieldValue::AssetReference(_) | FieldValue::AssetXRef(_) => {
                None
            }
        }
    }

    /// Short name of the value's shape, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Date(_) => "date",
            FieldValue::Double(_) => "double",
            FieldValue::Enumerator(_) => "enumerator",
            FieldValue::Integer(_) => "integer",
            FieldValue::DateOnly(_) => "date-only",
            FieldValue::Long(_) => "long",
            FieldValue::String(_) => "string",
            FieldValue::Table(_) => "table",
            FieldValue::AssetReference(_) => "asset reference",
            FieldValue::AssetXRef(_) => "asset cross-reference",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

/// Column name to string value of one extracted table row
pub type Row = IndexMap<String, String>;

/// One related asset of a relation field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Record name of the related asset
    pub name: String,
    /// Normalized identifier of the related asset
    pub identifier: String,
    /// 0-based position in the sorted entry list
    pub position: usize,
}

/// A field without a value
#[derive(Debug, Clone, PartialEq)]
pub struct EmptyField {
    name: String,
    data_type: FieldType,
}

/// A field holding a (possibly multi-line) string value
#[derive(Debug, Clone, PartialEq)]
pub struct StringField {
    name: String,
    data_type: FieldType,
    value: String,
}

impl StringField {
    /// Rendered value
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A field holding table rows
#[derive(Debug, Clone, PartialEq)]
pub struct TableField {
    name: String,
    data_type: FieldType,
    rows: Vec<Row>,
}

impl TableField {
    /// Rows, one map per row
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

/// A field holding related assets
#[derive(Debug, Clone, PartialEq)]
pub struct AssetsField {
    name: String,
    data_type: FieldType,
    entries: Vec<AssetEntry>,
}

impl AssetsField {
    /// Related assets, sorted
    pub fn entries(&self) -> &[AssetEntry] {
        &self.entries
    }
}

/// A field extracted from a record, in one of the shapes the metadata
/// document knows how to represent.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Field without a value
    Empty(EmptyField),
    /// Single string value
    String(StringField),
    /// Table rows
    Table(TableField),
    /// Related assets
    Assets(AssetsField),
}

impl Field {
    /// Creates an empty field
    pub fn empty(name: impl Into<String>, data_type: FieldType) -> Self {
        Field::Empty(EmptyField {
            name: name.into(),
            data_type,
        })
    }

    /// Creates a string field
    pub fn string(name: impl Into<String>, data_type: FieldType, value: impl Into<String>) -> Self {
        Field::String(StringField {
            name: name.into(),
            data_type,
            value: value.into(),
        })
    }

    /// Creates a table field
    pub fn table(name: impl Into<String>, data_type: FieldType, rows: Vec<Row>) -> Self {
        Field::Table(TableField {
            name: name.into(),
            data_type,
            rows,
        })
    }

    /// Builds a relation field from peer names and identifiers, numbering the
    /// entries in the given order.
    pub fn assets<I>(name: impl Into<String>, data_type: FieldType, peers: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let entries = peers
            .into_iter()
            .enumerate()
            .map(|(position, (name, identifier))| AssetEntry {
                name,
                identifier,
                position,
            })
            .collect();
        Field::Assets(AssetsField {
            name: name.into(),
            data_type,
            entries,
        })
    }

    /// Field name
    pub fn name(&self) -> &str {
        match self {
            Field::Empty(field) => &field.name,
            Field::String(field) => &field.name,
            Field::Table(field) => &field.name,
            Field::Assets(field) => &field.name,
        }
    }

    /// Storage type of the field
    pub fn data_type(&self) -> FieldType {
        match self {
            Field::Empty(field) => field.data_type,
            Field::String(field) => field.data_type,
            Field::Table(field) => field.data_type,
            Field::Assets(field) => field.data_type,
        }
    }

    /// Whether the field carries no data worth exporting.
    pub fn is_empty(&self) -> bool {
        match self {
            Field::Empty(_) => true,
            Field::String(field) => field.value.trim().is_empty(),
            Field::Table(field) => field.rows.is_empty(),
            Field::Assets(field) => field.entries.is_empty(),
        }
    }
}
