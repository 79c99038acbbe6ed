//! On-disk catalog source tests
//!
//! Plain and gzip-compressed files, restartable passes, and malformed input.

mod common;

use std::io::Write;
use std::path::{Path, PathBuf};

use common::printing;
use flate2::write::GzEncoder;
use flate2::Compression;
use manaql_ingest::catalog::{CatalogSource, FileCatalogSource, SourceError};
use manaql_ingest::coordinator::{IngestError, RunContext};
use manaql_ingest::models::RawCatalogEntry;
use manaql_ingest::store::MemoryCatalogStore;
use manaql_ingest::strategy::ExecutionStrategy;
use tempfile::TempDir;

fn catalog_json() -> String {
    let records = vec![
        printing("Forest", "lea", "294"),
        printing("Island", "lea", "288"),
        printing("Forest", "m21", "274"),
    ];
    serde_json::to_string_pretty(&records).unwrap()
}

fn write_plain(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn write_gzip(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}

fn read_all(path: &Path) -> Vec<Result<RawCatalogEntry, SourceError>> {
    FileCatalogSource::new(path).open().unwrap().collect()
}

fn names(results: Vec<Result<RawCatalogEntry, SourceError>>) -> Vec<String> {
    results
        .into_iter()
        .map(|r| r.unwrap()["name"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_reads_plain_file_in_order() {
    let dir = TempDir::new().unwrap();
    let path = write_plain(&dir, "catalog.json", &catalog_json());

    assert_eq!(names(read_all(&path)), vec!["Forest", "Island", "Forest"]);
}

#[test]
fn test_reads_gzip_file() {
    let dir = TempDir::new().unwrap();
    let path = write_gzip(&dir, "catalog.json.gz", &catalog_json());

    assert_eq!(names(read_all(&path)), vec!["Forest", "Island", "Forest"]);
}

#[test]
fn test_each_open_restarts_the_file() {
    let dir = TempDir::new().unwrap();
    let path = write_plain(&dir, "catalog.json", &catalog_json());
    let source = FileCatalogSource::new(&path);

    let first: Vec<_> = source.open().unwrap().collect();
    let second: Vec<_> = source.open().unwrap().collect();
    assert_eq!(names(first), names(second));
    assert_eq!(source.describe(), path.display().to_string());
}

#[test]
fn test_bom_and_empty_array() {
    let dir = TempDir::new().unwrap();
    let path = write_plain(&dir, "empty.json", "\u{feff}  [ \n ]  ");
    assert!(read_all(&path).is_empty());
}

#[test]
fn test_malformed_element_ends_stream() {
    let dir = TempDir::new().unwrap();
    let path = write_plain(
        &dir,
        "broken.json",
        r#"[{"name": "Forest"}, {"name": "Island",}, {"name": "Swamp"}]"#,
    );

    let results = read_all(&path);
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(SourceError::Element { index: 1, .. })));
}

#[test]
fn test_non_array_catalog_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_plain(&dir, "object.json", r#"{"data": []}"#);

    let results = read_all(&path);
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(SourceError::Format(_))));
}

#[test]
fn test_missing_file_fails_to_open() {
    let dir = TempDir::new().unwrap();
    let source = FileCatalogSource::new(dir.path().join("missing.json"));
    assert!(matches!(source.open(), Err(SourceError::Io(_))));
}

#[tokio::test]
async fn test_ingest_from_gzip_file() {
    let dir = TempDir::new().unwrap();
    let path = write_gzip(&dir, "catalog.json.gz", &catalog_json());
    let store = MemoryCatalogStore::new();

    let report = common::coordinator(&store, ExecutionStrategy::Parallel { workers: 2 }, 1)
        .run(&mut RunContext::new(), &FileCatalogSource::new(&path))
        .await
        .unwrap();

    assert_eq!(report.cards_created, 2);
    assert_eq!(report.printings_created, 3);
}

#[tokio::test]
async fn test_truncated_file_aborts_ingest() {
    let dir = TempDir::new().unwrap();
    let json = catalog_json();
    let cut = json.rfind("\"prices\"").unwrap();
    let path = write_plain(&dir, "truncated.json", &json[..cut]);
    let store = MemoryCatalogStore::new();

    let err = common::coordinator(&store, ExecutionStrategy::Sequential, 10)
        .run(&mut RunContext::new(), &FileCatalogSource::new(&path))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Source(_)));
}
