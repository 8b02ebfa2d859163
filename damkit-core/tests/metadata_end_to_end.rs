//! End-to-end tests for the metadata export pipeline.
//!
//! This test suite covers:
//! - Record lookup through the server facade on the in-memory backend
//! - Field extraction in layout order
//! - XML document structure and double-escaped string values
//! - Related asset resolution, including missing peers and identifier assignment

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

use damkit_core::{
    DamBackend, DamError, DamItem, DamServer, FieldDefinition, FieldSource, FieldType, FieldValue,
    Layout, Result, ServerConfig,
    backend::memory::{MemoryBackend, MemoryCatalog},
    constants::field_names,
    models::{AssetXRef, RelationType, TableRow, TableValue},
    security::Credentials,
};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::sync::Arc;
use uuid::Uuid;

/// A parsed `<field>` element of the document root
#[derive(Debug, Default)]
struct ParsedField {
    name: String,
    data_type: String,
    values: Vec<String>,
    assets: Vec<(String, String, String)>,
}

fn attributes(start: &BytesStart<'_>) -> ParsedField {
    let mut field = ParsedField::default();
    for attribute in start.attributes() {
        let attribute = attribute.unwrap();
        let value = attribute.unescape_value().unwrap().into_owned();
        match attribute.key.as_ref() {
            b"name" => field.name = value,
            b"data-type" => field.data_type = value,
            _ => {}
        }
    }
    field
}

/// Parses the top-level fields of a metadata document. Plain values are
/// unescaped twice to undo the pre-encoding.
fn parse_document(xml: &str) -> Vec<ParsedField> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut current = ParsedField::default();
    let mut text = String::new();
    let mut asset = (String::new(), String::new(), String::new());

    loop {
        match reader.read_event().unwrap() {
            Event::Start(start) => {
                depth += 1;
                if depth == 2 && start.name().as_ref() == b"field" {
                    current = attributes(&start);
                }
                text.clear();
            }
            Event::Empty(start) if depth == 1 && start.name().as_ref() == b"field" => {
                fields.push(attributes(&start));
            }
            Event::Text(content) => text.push_str(&content.unescape().unwrap()),
            Event::End(end) => {
                let text = std::mem::take(&mut text);
                match (end.name().as_ref(), depth) {
                    (b"field", 2) => fields.push(std::mem::take(&mut current)),
                    (b"value", 3) if current.data_type == "binary" => {
                        current.assets.push(std::mem::take(&mut asset));
                    }
                    (b"value", 3) => {
                        let value = quick_xml::escape::unescape(&text).unwrap().into_owned();
                        current.values.push(value);
                    }
                    (b"name", 4) => asset.0 = text,
                    (b"uuid", 4) => asset.1 = text,
                    (b"order", 4) => asset.2 = text,
                    _ => {}
                }
                depth -= 1;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    fields
}

fn connect(backend: &Arc<MemoryBackend>, catalog: &str) -> Result<DamServer> {
    DamServer::connect(
        Arc::clone(backend) as Arc<dyn DamBackend>,
        ServerConfig::new("memory://local".to_string()).with_catalog(catalog.to_string()),
        Credentials::new("archivist".to_string(), Some("letmein".to_string())),
    )
}

fn render(server: &DamServer, catalog: &str, name: &str) -> Result<String> {
    let record = server
        .find_by_name(catalog, name)?
        .expect("record should exist");
    let mut buffer = Vec::new();
    record.write_field_metadata(&mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap())
}

// =============================================================================
// Document structure
// =============================================================================

/// A record with two populated string fields yields exactly two fields with
/// one value each
#[test]
fn test_end_to_end_two_string_fields() -> Result<()> {
    let catalog = MemoryCatalog::new(
        "Photos",
        Layout::default()
            .with_field(FieldDefinition::new(field_names::RECORD_NAME, FieldType::String))
            .with_field(FieldDefinition::new(field_names::CATALOG_NAME, FieldType::String))
            .with_field(FieldDefinition::new("Caption", FieldType::String)),
    );
    catalog.add_record([
        (field_names::RECORD_NAME, FieldValue::from("img001.tif")),
        (field_names::CATALOG_NAME, FieldValue::from("Photos")),
    ])?;
    let backend = Arc::new(MemoryBackend::new());
    backend.add_catalog(catalog);
    let server = connect(&backend, "Photos")?;

    let xml = render(&server, "Photos", "img001.tif")?;
    assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#));

    let fields = parse_document(&xml);
    assert_eq!(fields.len(), 2, "Unexpected document: {}", xml);
    assert_eq!(fields[0].name, "Record Name");
    assert_eq!(fields[0].data_type, "string");
    assert_eq!(fields[0].values, vec!["img001.tif"]);
    assert_eq!(fields[1].name, "Catalog Name");
    assert_eq!(fields[1].values, vec!["Photos"]);
    Ok(())
}

/// Multi-line values with markup characters survive the round trip
#[test]
fn test_end_to_end_string_round_trip() -> Result<()> {
    let description = "Ships & boats\n<harbour> at \"dawn\"\n'1910'\n";
    let catalog = MemoryCatalog::new(
        "Photos",
        Layout::default()
            .with_field(FieldDefinition::new(field_names::RECORD_NAME, FieldType::String))
            .with_field(FieldDefinition::new("Description", FieldType::String))
            .with_field(FieldDefinition::new("Pages", FieldType::Integer)),
    );
    catalog.add_record([
        (field_names::RECORD_NAME, FieldValue::from("img001.tif")),
        ("Description", FieldValue::from(description)),
        ("Pages", FieldValue::Integer(2)),
    ])?;
    let backend = Arc::new(MemoryBackend::new());
    backend.add_catalog(catalog);
    let server = connect(&backend, "Photos")?;

    let xml = render(&server, "Photos", "img001.tif")?;
    let fields = parse_document(&xml);

    assert_eq!(fields.len(), 3);
    assert_eq!(
        fields[1].values,
        vec!["Ships & boats", "<harbour> at \"dawn\"", "'1910'"]
    );
    assert_eq!(fields[2].data_type, "integer");
    assert_eq!(fields[2].values, vec!["2"]);
    Ok(())
}

/// Tables are written row by row with their string columns
#[test]
fn test_end_to_end_table_field() -> Result<()> {
    let holder = FieldDefinition::new("Holder", FieldType::String);
    let year = FieldDefinition::new("Year", FieldType::Integer);
    let rights = TableValue {
        layout: Layout::new(vec![holder.clone(), year.clone()]),
        rows: vec![
            TableRow::new()
                .with_value(holder.id, FieldValue::from("Royal Library"))
                .with_value(year.id, FieldValue::Integer(1999)),
        ],
    };
    let catalog = MemoryCatalog::new(
        "Photos",
        Layout::default()
            .with_field(FieldDefinition::new(field_names::RECORD_NAME, FieldType::String))
            .with_field(FieldDefinition::new("Rights", FieldType::Table)),
    );
    catalog.add_record([
        (field_names::RECORD_NAME, FieldValue::from("img001.tif")),
        ("Rights", FieldValue::Table(rights)),
    ])?;
    let backend = Arc::new(MemoryBackend::new());
    backend.add_catalog(catalog);
    let server = connect(&backend, "Photos")?;

    let xml = render(&server, "Photos", "img001.tif")?;
    assert!(xml.contains(r#"<field data-type="table" name="Rights">"#));
    assert!(xml.contains("<table>"));
    assert!(xml.contains("<row>"));
    assert!(xml.contains(r#"<field name="Holder">"#));
    assert!(xml.contains(r#"<field name="Year">"#));
    assert!(xml.contains("<value>1999</value>"));
    Ok(())
}

// =============================================================================
// Related assets
// =============================================================================

fn relation_layout() -> Layout {
    Layout::default()
        .with_field(FieldDefinition::new(field_names::RECORD_NAME, FieldType::String))
        .with_field(FieldDefinition::new(
            field_names::RELATED_SUB_ASSETS,
            FieldType::Binary,
        ))
        .with_field(FieldDefinition::new(
            field_names::RELATED_OBJECT_IDENTIFIER_VALUE_INTELLECTUAL_ENTITY,
            FieldType::String,
        ))
}

/// An existing peer without identifier gets a fresh one; a missing peer is
/// reported as N/A. Entries are sorted by name.
#[test]
fn test_end_to_end_related_sub_assets() -> Result<()> {
    let catalog = MemoryCatalog::new("Photos", relation_layout());
    let peer_a = catalog.add_record([(field_names::RECORD_NAME, FieldValue::from("peerA"))])?;
    let mut xref = AssetXRef::new();
    xref.add_reference(RelationType::Alternate, 999, "peerB");
    xref.add_reference(RelationType::Alternate, peer_a.id(), "peerA");
    catalog.add_record([
        (field_names::RECORD_NAME, FieldValue::from("master.tif")),
        (field_names::RELATED_SUB_ASSETS, FieldValue::AssetXRef(xref)),
    ])?;
    let identifier_field = catalog
        .layout()
        .by_name(field_names::RELATED_OBJECT_IDENTIFIER_VALUE_INTELLECTUAL_ENTITY)
        .unwrap()
        .id;
    let backend = Arc::new(MemoryBackend::new());
    backend.add_catalog(catalog);
    let server = connect(&backend, "Photos")?;

    let xml = render(&server, "Photos", "master.tif")?;
    let fields = parse_document(&xml);
    let related = fields
        .iter()
        .find(|field| field.name == field_names::RELATED_SUB_ASSETS)
        .expect("relation field should be exported");

    assert_eq!(related.data_type, "binary");
    assert_eq!(related.assets.len(), 2, "Unexpected document: {}", xml);
    let (name_a, uuid_a, order_a) = &related.assets[0];
    let (name_b, uuid_b, order_b) = &related.assets[1];
    assert_eq!((name_a.as_str(), order_a.as_str()), ("peerA", "0"));
    assert_eq!((name_b.as_str(), uuid_b.as_str(), order_b.as_str()), ("peerB", "N/A", "1"));
    assert!(Uuid::parse_str(uuid_a).is_ok());

    // The assigned identifier was persisted on the peer and is reused
    assert_eq!(peer_a.save_count(), 1);
    assert_eq!(&peer_a.string_value(&identifier_field)?, uuid_a);
    let again = parse_document(&render(&server, "Photos", "master.tif")?);
    let related_again = again
        .iter()
        .find(|field| field.name == field_names::RELATED_SUB_ASSETS)
        .unwrap();
    assert_eq!(&related_again.assets[0].1, uuid_a);
    assert_eq!(peer_a.save_count(), 1);
    Ok(())
}

/// A peer that already has an identifier keeps it
#[test]
fn test_end_to_end_existing_peer_identifier() -> Result<()> {
    let catalog = MemoryCatalog::new("Photos", relation_layout());
    let peer = catalog.add_record([
        (field_names::RECORD_NAME, FieldValue::from("peerA")),
        (
            field_names::RELATED_OBJECT_IDENTIFIER_VALUE_INTELLECTUAL_ENTITY,
            FieldValue::from("entity-0001"),
        ),
    ])?;
    let mut xref = AssetXRef::new();
    xref.add_reference(RelationType::Alternate, peer.id(), "peerA");
    catalog.add_record([
        (field_names::RECORD_NAME, FieldValue::from("master.tif")),
        (field_names::RELATED_SUB_ASSETS, FieldValue::AssetXRef(xref)),
    ])?;
    let backend = Arc::new(MemoryBackend::new());
    backend.add_catalog(catalog);
    let server = connect(&backend, "Photos")?;

    let fields = parse_document(&render(&server, "Photos", "master.tif")?);
    let related = fields
        .iter()
        .find(|field| field.name == field_names::RELATED_SUB_ASSETS)
        .unwrap();
    assert_eq!(
        related.assets,
        vec![("peerA".to_string(), "entity-0001".to_string(), "0".to_string())]
    );
    assert_eq!(peer.save_count(), 0);
    Ok(())
}

/// Relations created through records are exported on the next extraction
#[test]
fn test_end_to_end_created_relation_is_exported() -> Result<()> {
    let catalog = MemoryCatalog::new("Photos", relation_layout());
    catalog.add_record([(field_names::RECORD_NAME, FieldValue::from("master.tif"))])?;
    catalog.add_record([(field_names::RECORD_NAME, FieldValue::from("page1.tif"))])?;
    let backend = Arc::new(MemoryBackend::new());
    backend.add_catalog(catalog);
    let server = connect(&backend, "Photos")?;

    let master = server.find_by_name("Photos", "master.tif")?.unwrap();
    let page = server.find_by_name("Photos", "page1.tif")?.unwrap();
    master.add_sub_asset(&page)?;
    assert!(master.is_master_asset()?);

    let fields = parse_document(&render(&server, "Photos", "master.tif")?);
    let related = fields
        .iter()
        .find(|field| field.name == field_names::RELATED_SUB_ASSETS)
        .unwrap();
    assert_eq!(related.assets.len(), 1);
    assert_eq!(related.assets[0].0, "page1.tif");
    Ok(())
}

// =============================================================================
// Failures
// =============================================================================

/// A backend failure while reading a field aborts the export
#[test]
fn test_end_to_end_field_access_failure_propagates() -> Result<()> {
    let catalog = MemoryCatalog::new(
        "Photos",
        Layout::default()
            .with_field(FieldDefinition::new(field_names::RECORD_NAME, FieldType::String))
            .with_field(FieldDefinition::new("Caption", FieldType::String)),
    );
    let item = catalog.add_record([
        (field_names::RECORD_NAME, FieldValue::from("img001.tif")),
        ("Caption", FieldValue::from("Harbour")),
    ])?;
    item.fail_access_to(catalog.layout().by_name("Caption").unwrap().id);
    let backend = Arc::new(MemoryBackend::new());
    backend.add_catalog(catalog);
    let server = connect(&backend, "Photos")?;

    let record = server.find_by_name("Photos", "img001.tif")?.unwrap();
    let result = record.write_field_metadata(Vec::new());
    assert!(
        matches!(&result, Err(DamError::FieldAccess { field, .. }) if field == "Caption"),
        "Expected field access error, got {:?}",
        result
    );

    // Other fields stay readable
    assert_eq!(record.field(field_names::RECORD_NAME)?, "img001.tif");
    assert!(record.field("Caption").is_err());
    Ok(())
}
