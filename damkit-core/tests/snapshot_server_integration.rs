//! Integration tests for the server facade over JSON catalog snapshots.
//!
//! This test suite covers:
//! - Backend detection from snapshot locations
//! - Record lookups by name and by identifier
//! - Typed reads and writes on snapshot records
//! - Categories and field validation

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

use damkit_core::{
    DamError, DamServer, Result, ServerConfig, backend::create_backend,
    constants::field_names, security::Credentials,
};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

fn write_snapshot(dir: &Path) -> std::path::PathBuf {
    let snapshot = json!({
        "catalogs": [{
            "name": "Photos",
            "layout": [
                { "name": "Record Name", "field_type": "string" },
                { "name": "GUID", "field_type": "string" },
                { "name": "Registration State", "field_type": "string" },
                { "name": "Caption", "field_type": "string" },
                { "name": "Pages", "field_type": "integer" },
                { "name": "Published", "field_type": "boolean" },
                { "name": "Captured", "field_type": "date" },
                { "name": "Status", "field_type": "enumerator", "choices": ["draft", "final"] }
            ],
            "categories": [
                { "id": 7, "name": "$Categories:Harbours" }
            ],
            "records": [
                {
                    "fields": {
                        "Record Name": { "type": "string", "value": "img001.tif" },
                        "GUID": { "type": "string", "value": "uid:dam/images/70786480-0e45#1" },
                        "Registration State": { "type": "string", "value": "finished" },
                        "Caption": { "type": "string", "value": "Harbour at dawn" },
                        "Pages": { "type": "integer", "value": 3 }
                    },
                    "categories": [7]
                },
                {
                    "fields": {
                        "Record Name": { "type": "string", "value": "img002.tif" },
                        "GUID": { "type": "string", "value": "uid:dam/images/81897591-1f56" },
                        "Registration State": { "type": "string", "value": "pending" }
                    }
                }
            ]
        }]
    });
    let path = dir.join("photos.json");
    std::fs::write(&path, serde_json::to_string_pretty(&snapshot).unwrap()).unwrap();
    path
}

fn connect(path: &Path) -> Result<DamServer> {
    let location = path.to_str().unwrap().to_string();
    let backend = create_backend(&location)?;
    DamServer::connect(
        backend,
        ServerConfig::new(location).with_catalog("Photos".to_string()),
        Credentials::new("archivist".to_string(), None),
    )
}

// =============================================================================
// Lookups
// =============================================================================

#[test]
fn test_snapshot_lookup_by_name() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let server = connect(&write_snapshot(dir.path()))?;

    let record = server
        .find_by_name("Photos", "img001.tif")?
        .expect("record should exist");
    assert_eq!(record.field("Caption")?, "Harbour at dawn");
    assert_eq!(record.field(field_names::RECORD_NAME)?, "img001.tif");
    assert_eq!(record.identifier()?, "70786480-0e45");
    assert_eq!(record.int_field("Pages")?, 3);
    assert_eq!(record.long_field("Pages")?, 3);

    assert!(server.find_by_name("Photos", "img404.tif")?.is_none());
    Ok(())
}

#[test]
fn test_snapshot_lookup_by_identifier_requires_finished_registration() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let server = connect(&write_snapshot(dir.path()))?;

    let record = server
        .find_by_identifier("Photos", "70786480")?
        .expect("registered record should be found");
    assert_eq!(record.field(field_names::RECORD_NAME)?, "img001.tif");

    // The second record is still pending registration
    assert!(server.find_by_identifier("Photos", "81897591")?.is_none());
    Ok(())
}

#[test]
fn test_snapshot_file_url_location() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = write_snapshot(dir.path());
    let location = format!("file://{}", path.display());

    let backend = create_backend(&location)?;
    let server = DamServer::connect(
        backend,
        ServerConfig::new(location),
        Credentials::new("archivist".to_string(), None),
    )?;
    assert!(server.find_by_name("Photos", "img002.tif")?.is_some());
    Ok(())
}

#[test]
fn test_missing_snapshot_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let result = create_backend(dir.path().join("absent.json").to_str().unwrap());
    assert!(matches!(result, Err(DamError::Io { .. })));
}

#[test]
fn test_invalid_snapshot_is_a_serialization_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, r#"{ "catalogs": [ { "name": "Photos" "#).unwrap();

    let result = create_backend(path.to_str().unwrap());
    assert!(matches!(result, Err(DamError::Serialization { .. })));
}

// =============================================================================
// Reads and writes
// =============================================================================

#[test]
fn test_snapshot_typed_writes_are_visible_to_later_lookups() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let server = connect(&write_snapshot(dir.path()))?;

    let record = server.find_by_name("Photos", "img002.tif")?.unwrap();
    record.set_field("Caption", "Quay\nat night")?;
    record.set_bool_field("Published", true)?;
    record.set_enum_field("Status", "final")?;
    record.set_date_field(
        "Captured",
        chrono::DateTime::parse_from_rfc3339("1910-06-01T08:30:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc),
    )?;
    assert!(matches!(
        record.set_enum_field("Status", "archived"),
        Err(DamError::InvalidArgument { .. })
    ));

    let reloaded = server.find_by_name("Photos", "img002.tif")?.unwrap();
    assert_eq!(reloaded.field("Caption")?, "Quay\nat night");
    assert_eq!(reloaded.field("Published")?, "true");
    assert_eq!(reloaded.field("Status")?, "final");
    assert_eq!(reloaded.field("Captured")?, "1910-06-01T08:30:00Z");
    Ok(())
}

#[test]
fn test_snapshot_categories() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let server = connect(&write_snapshot(dir.path()))?;

    let record = server.find_by_name("Photos", "img001.tif")?.unwrap();
    assert_eq!(record.categories()?, vec![7]);

    let category = server.category("Photos", 7)?.expect("category should exist");
    assert_eq!(category.name, "$Categories:Harbours");
    assert!(server.category("Photos", 8)?.is_none());
    Ok(())
}

#[test]
fn test_snapshot_field_validation() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let server = connect(&write_snapshot(dir.path()))?;
    let record = server.find_by_name("Photos", "img002.tif")?.unwrap();

    record.validate_fields_exist(["Caption", "Pages"])?;
    record.validate_fields_have_value([field_names::RECORD_NAME, field_names::GUID])?;

    match record.validate_fields_exist(["Caption", "Creator", "Title"]) {
        Err(DamError::Validation { violations }) => assert_eq!(violations.len(), 2),
        other => panic!("Expected validation error, got {:?}", other),
    }
    match record.validate_fields_have_value(["Caption", field_names::RECORD_NAME]) {
        Err(DamError::Validation { violations }) => {
            assert_eq!(violations.len(), 1);
            assert!(violations[0].contains("Caption"));
        }
        other => panic!("Expected validation error, got {:?}", other),
    }
    Ok(())
}
