// graph_bulk_importer/tests/integration_tests.rs

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::Parser;
use graph_bulk_importer::cli::{Cli, Commands, ImportArgs};
use graph_bulk_importer::document::{capacity_units, from_document, reserved_property, to_document};
use graph_bulk_importer::driver::{ImportConfig, ImportDriver, ImportSummary, write_bad_documents};
use graph_bulk_importer::error::ImporterError;
use graph_bulk_importer::file::FileLoader;
use graph_bulk_importer::generator::{self, generate_edges, generate_vertices, store, store_mapping};
use graph_bulk_importer::loader::{
    BulkImportOptions, BulkImportResponse, BulkLoader, CancelToken, LoaderConfig, prepare_import,
};
use graph_bulk_importer::neo4j::{Neo4jLoader, row_value};
use graph_bulk_importer::retry::{execute_with_retry, is_retryable, wrap_error};
use graph_bulk_importer::{BAD_EDGES_FILE, BAD_VERTICES_FILE, Edge, GraphElement, ToVertex, Vertex};
use neo4rs::{BoltList, BoltType, Row};
use serde_json::json;
use tempfile::TempDir;

fn loader_config(root: &Path,) -> LoaderConfig {
    LoaderConfig {
        endpoint:        format!("file://{}", root.display()),
        auth_key:        None,
        database_name:   "testdb".to_string(),
        collection_name: "stores".to_string(),
    }
}

fn import_config(root: &Path, count: u64,) -> ImportConfig {
    ImportConfig {
        loader:                loader_config(root,),
        collection_throughput: 400,
        documents_to_import:   count,
        partition_key_field:   generator::DEFAULT_STORE_PARTITION_FIELD.to_string(),
        cleanup_on_start:      true,
        cleanup_on_finish:     false,
        options:               BulkImportOptions {
            enable_upsert: true,
            disable_automatic_id_generation: true,
            ..Default::default()
        },
        output_dir:            root.join("out",),
    }
}

async fn file_loader(root: &Path,) -> FileLoader {
    FileLoader::new(loader_config(root,),)
        .await
        .expect("Failed to create FileLoader",)
}

fn vertex(id: &str, pk: &str,) -> Vertex {
    json!({ "id": id, "partitionKey": pk, "name": format!("v{}", id) })
        .to_vertex()
        .unwrap()
}

#[tokio::test]
async fn test_file_import_run() {
    let dir = TempDir::new().expect("Failed to create temporary directory",);
    let loader = file_loader(dir.path(),).await;
    let driver = ImportDriver::new(loader, import_config(dir.path(), 10,),);

    let summary = driver
        .run(&CancelToken::new(),)
        .await
        .expect("Import run failed",);

    assert_eq!(summary.vertices.documents_imported, 10);
    assert_eq!(summary.edges.documents_imported, 10);
    assert_eq!(summary.element_count(), 20);
    assert!(summary.total_units() >= 20.0);
    assert!(!summary.has_bad_documents());
    assert!(!dir.path().join("out",).join(BAD_VERTICES_FILE,).exists());

    let docs = driver.loader().read_documents().await.unwrap();
    assert_eq!(docs.len(), 20);
    let meta = driver.loader().read_meta().await.unwrap();
    assert_eq!(meta.throughput, 400);
    assert_eq!(meta.partition_key_path, "/partitionKey");

    let first = from_document(&docs[0],).unwrap();
    assert_eq!(first.label(), "Store");
}

#[tokio::test]
async fn test_missing_collection_without_cleanup_fails() {
    let dir = TempDir::new().unwrap();
    let mut config = import_config(dir.path(), 3,);
    config.cleanup_on_start = false;
    let driver = ImportDriver::new(file_loader(dir.path(),).await, config,);

    let err = driver.run(&CancelToken::new(),).await.unwrap_err();
    assert!(matches!(err, ImporterError::ConfigurationError(_)));
}

#[tokio::test]
async fn test_cleanup_on_finish_drops_collection() {
    let dir = TempDir::new().unwrap();
    let mut config = import_config(dir.path(), 4,);
    config.cleanup_on_finish = true;
    let driver = ImportDriver::new(file_loader(dir.path(),).await, config,);

    driver.run(&CancelToken::new(),).await.unwrap();

    assert!(!driver.loader().collection_exists().await.unwrap());
    assert!(!driver.loader().collection_path().exists());
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let loader = file_loader(dir.path(),).await;
    loader.reset_collection(400,).await.unwrap();

    let options = BulkImportOptions {
        enable_upsert: true,
        ..Default::default()
    };
    let elements = || -> Vec<GraphElement,> {
        vec![vertex("1", "a",).into(), vertex("2", "b",).into()]
    };

    let first = loader.bulk_import(elements(), &options, &CancelToken::new(),).await.unwrap();
    let second = loader.bulk_import(elements(), &options, &CancelToken::new(),).await.unwrap();

    assert_eq!(first.documents_imported, 2);
    assert_eq!(second.documents_imported, 2);
    assert_eq!(loader.read_documents().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_insert_without_upsert_rejects_conflicts() {
    let dir = TempDir::new().unwrap();
    let loader = file_loader(dir.path(),).await;
    loader.reset_collection(400,).await.unwrap();

    let options = BulkImportOptions::default();
    loader
        .bulk_import(vec![vertex("1", "a",).into()], &options, &CancelToken::new(),)
        .await
        .unwrap();

    let response = loader
        .bulk_import(
            vec![vertex("1", "a",).into(), vertex("1", "b",).into()],
            &options,
            &CancelToken::new(),
        )
        .await
        .unwrap();

    // same id in another partition is a different document
    assert_eq!(response.documents_imported, 1);
    assert_eq!(response.bad_input_documents.len(), 1);
    assert_eq!(response.bad_input_documents[0]["partitionKey"], json!("a"));
    assert_eq!(loader.read_documents().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_bad_input_documents_are_reported_and_written() {
    let dir = TempDir::new().unwrap();
    let loader = file_loader(dir.path(),).await;
    let mut config = import_config(dir.path(), 0,);
    config.options.disable_automatic_id_generation = true;
    let driver = ImportDriver::new(loader, config,);
    driver.prepare_collection().await.unwrap();

    let good = vertex("1", "a",);
    let mut unlabeled = vertex("2", "a",);
    unlabeled.label = String::new();
    let no_id_edge = Edge::between("knows", &good, &good,);
    let dangling = Edge::between("knows", &good, &Vertex::new("", "Ghost",),).with_id("e2",);

    let summary = driver
        .import(vec![good.clone(), unlabeled], vec![no_id_edge, dangling], &CancelToken::new(),)
        .await
        .unwrap();

    assert_eq!(summary.vertices.documents_imported, 1);
    assert_eq!(summary.vertices.bad_input_documents.len(), 1);
    assert_eq!(summary.edges.documents_imported, 0);
    assert_eq!(summary.edges.bad_input_documents.len(), 2);

    let out = dir.path().join("out",);
    write_bad_documents(&out, &summary,).await.unwrap();
    write_bad_documents(&out, &summary,).await.unwrap();
    let bad_vertices = std::fs::read_to_string(out.join(BAD_VERTICES_FILE,),).unwrap();
    let bad_edges = std::fs::read_to_string(out.join(BAD_EDGES_FILE,),).unwrap();
    // sinks are append-only
    assert_eq!(bad_vertices.lines().count(), 2);
    assert_eq!(bad_edges.lines().count(), 4);
}

#[tokio::test]
async fn test_reserved_property_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    let loader = file_loader(dir.path(),).await;
    loader.reset_collection(400,).await.unwrap();

    let a = vertex("1", "a",);
    let b = vertex("2", "a",);
    let colored = json!({ "id": "3", "partitionKey": "a", "label": "red" })
        .to_vertex()
        .unwrap();
    let mut tagged = vertex("4", "a",);
    tagged.add_property("_collection", "elsewhere",);
    let mut twice = vertex("5", "a",);
    twice.add_property("partitionKey", "b",);

    let response = loader
        .bulk_import(
            vec![a.clone().into(), colored.into(), tagged.into(), twice.into()],
            &BulkImportOptions::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(response.documents_imported, 1);
    assert_eq!(response.bad_input_documents.len(), 3);

    let rerouted = Edge::between("knows", &a, &b,)
        .with_id("e1",)
        .with_property("_sink", "9",);
    let repartitioned = Edge::between("knows", &a, &b,)
        .with_id("e2",)
        .with_property("partitionKey", "z",);
    let response = loader
        .bulk_import(
            vec![rerouted.into(), repartitioned.into()],
            &BulkImportOptions::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(response.documents_imported, 0);
    assert_eq!(response.bad_input_documents.len(), 2);

    // everything stored still reads back
    let docs = loader.read_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["label"], json!("Object"));
    assert_eq!(from_document(&docs[0],).unwrap(), GraphElement::Vertex(a,));
}

#[test]
fn test_reserved_property_reports_first_collision() {
    let plain = vertex("1", "a",);
    assert_eq!(reserved_property(&plain.clone().into(),), None);

    let colored = json!({ "id": "3", "partitionKey": "a", "label": "red", "_rid": 1 })
        .to_vertex()
        .unwrap();
    assert_eq!(reserved_property(&colored.into(),), Some("label"));

    let weighted = Edge::between("knows", &plain, &plain,).with_property("weight", 1,);
    assert_eq!(reserved_property(&weighted.clone().into(),), None);
    let marked = weighted.with_property("_isEdge", false,);
    assert_eq!(reserved_property(&marked.into(),), Some("_isEdge"));
}

#[test]
fn test_retry_classification() {
    assert!(is_retryable(&ImporterError::ConnectionError("refused".to_string(),),));
    assert!(is_retryable(&ImporterError::IngestionError(
        "Neo4jError { code: \"Neo.TransientError.Transaction.DeadlockDetected\" }".to_string(),
    ),));
    assert!(!is_retryable(&ImporterError::IngestionError(
        "Neo4jError { code: \"Neo.ClientError.Statement.SyntaxError\" }".to_string(),
    ),));
    assert!(!is_retryable(&ImporterError::Cancelled,));

    assert!(matches!(
        wrap_error(ImporterError::DatabaseError("connection reset".to_string(),),),
        backoff::Error::Transient { .. }
    ));
    assert!(matches!(
        wrap_error(ImporterError::ConfigurationError("bad uri".to_string(),),),
        backoff::Error::Permanent(_,)
    ));
}

#[tokio::test]
async fn test_retry_replays_transient_failures_only() {
    let attempts = AtomicUsize::new(0,);
    let value = execute_with_retry(|| async {
        if attempts.fetch_add(1, Ordering::SeqCst,) == 0 {
            Err(wrap_error(ImporterError::ConnectionError("dropped".to_string(),),),)
        } else {
            Ok(7,)
        }
    },)
    .await
    .unwrap();
    assert_eq!(value, 7);
    assert_eq!(attempts.load(Ordering::SeqCst,), 2);

    let attempts = AtomicUsize::new(0,);
    let err = execute_with_retry(|| async {
        attempts.fetch_add(1, Ordering::SeqCst,);
        Err::<(), _,>(wrap_error(ImporterError::Cancelled,),)
    },)
    .await
    .unwrap_err();
    assert!(matches!(err, ImporterError::Cancelled));
    assert_eq!(attempts.load(Ordering::SeqCst,), 1);
}

#[test]
fn test_neo4j_row_values_reject_wrong_types() {
    let row = Row::new(
        BoltList::from(vec![BoltType::from("written",), BoltType::from("found",)],),
        BoltList::from(vec![
            BoltType::from(vec![BoltType::from("1",), BoltType::from("2",)],),
            BoltType::from("three",),
        ],),
    );

    let written: Vec<String,> = row_value(&row, "written",).unwrap();
    assert_eq!(written, ["1", "2"]);
    assert!(matches!(
        row_value::<i64,>(&row, "found",),
        Err(ImporterError::DatabaseError(_,),)
    ));
    assert!(matches!(
        row_value::<i64,>(&row, "missing",),
        Err(ImporterError::DatabaseError(_,),)
    ));
}

#[tokio::test]
async fn test_automatic_id_generation_assigns_edge_ids() {
    let dir = TempDir::new().unwrap();
    let loader = file_loader(dir.path(),).await;
    loader.reset_collection(400,).await.unwrap();

    let a = vertex("1", "a",);
    let b = vertex("2", "a",);
    let options = BulkImportOptions {
        disable_automatic_id_generation: false,
        ..Default::default()
    };
    let response = loader
        .bulk_import(vec![Edge::between("knows", &a, &b,).into()], &options, &CancelToken::new(),)
        .await
        .unwrap();

    assert_eq!(response.documents_imported, 1);
    let docs = loader.read_documents().await.unwrap();
    let id = docs[0]["id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id,).is_ok());
}

#[tokio::test]
async fn test_cancelled_import_stops() {
    let dir = TempDir::new().unwrap();
    let loader = file_loader(dir.path(),).await;
    loader.reset_collection(400,).await.unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = loader
        .bulk_import(vec![vertex("1", "a",).into()], &BulkImportOptions::default(), &cancel,)
        .await
        .unwrap_err();

    assert!(matches!(err, ImporterError::Cancelled));
    assert!(loader.read_documents().await.unwrap().is_empty());
}

#[test]
fn test_prepare_import_sorts_each_chunk_by_partition() {
    let elements: Vec<GraphElement,> = [("1", "c",), ("2", "a",), ("3", "b",), ("4", "a",), ("5", "c",),]
        .iter()
        .map(|(id, pk,)| vertex(id, pk,).into(),)
        .collect();
    let options = BulkImportOptions {
        max_in_memory_sorting_batch_size: Some(2,),
        ..Default::default()
    };

    let prepared = prepare_import(elements, &options,);
    let ids: Vec<Vec<&str,>,> = prepared
        .chunks
        .iter()
        .map(|chunk| chunk.iter().map(GraphElement::id,).collect(),)
        .collect();

    assert_eq!(ids, vec![vec!["2", "1"], vec!["4", "3"], vec!["5"]]);
    assert!(prepared.bad_input_documents.is_empty());
}

#[test]
fn test_vertex_document_round_trip() {
    let mut v = vertex("7", "p",);
    v.add_property("tag", "x",);
    v.add_property("tag", "y",);

    let doc = to_document(&GraphElement::Vertex(v.clone(),),);
    assert_eq!(doc["partitionKey"], json!("p"));
    assert_eq!(doc["tag"].as_array().unwrap().len(), 2);
    assert_eq!(doc["tag"][1]["_value"], json!("y"));
    assert_eq!(from_document(&doc,).unwrap(), GraphElement::Vertex(v,));
    assert_eq!(capacity_units(&doc,), 1.0);
}

#[test]
fn test_edge_document_carries_endpoints() {
    let a = vertex("1", "a",);
    let b = vertex("2", "b",);
    let edge = Edge::between("knows", &a, &b,).with_id("e1",).with_property("weight", 3,);

    let doc = to_document(&GraphElement::Edge(edge.clone(),),);
    assert_eq!(doc["_isEdge"], json!(true));
    assert_eq!(doc["_vertexId"], json!("1"));
    assert_eq!(doc["_sink"], json!("2"));
    assert_eq!(doc["_sinkPartition"], json!("b"));
    assert_eq!(doc["partitionKey"], json!("a"));
    assert_eq!(from_document(&doc,).unwrap(), GraphElement::Edge(edge,));
}

#[test]
fn test_generated_stores_are_deterministic() {
    assert_eq!(store(3,), store(3,));
    assert_eq!(store(3,).store_nbr, 4);

    let mapping = store_mapping("StateCode",).unwrap();
    let vertices = generate_vertices(5, &mapping,).unwrap();
    assert_eq!(vertices.len(), 5);
    assert_eq!(vertices[0].id, "1");
    assert_eq!(vertices[0].label, "Store");
    assert_eq!(vertices[0].partition_key(), Some(&json!("AR")));
    // every Store field but Id, plus partitionKey
    assert_eq!(vertices[0].properties.len(), 13);

    let edges = generate_edges(&vertices,);
    assert_eq!(edges.len(), 5);
    assert_eq!(edges[4].out_vertex_id, "5");
    assert_eq!(edges[4].in_vertex_id, "1");
    assert_eq!(edges[0].id, "1-next-2");
    assert_eq!(edges[0].label, generator::EDGE_LABEL);
    assert_eq!(edges[1].property("sequence"), Some(&json!(1)));
    let distance = edges[0].property("distanceKm",).and_then(|v| v.as_f64(),).unwrap();
    assert!(distance > 0.0);
    assert!(generate_edges(&vertices[..1],).is_empty());
}

#[test]
fn test_summary_totals_both_responses() {
    let summary = ImportSummary {
        vertices: BulkImportResponse {
            documents_imported:           30,
            total_time_taken:             Duration::from_secs(2,),
            total_request_units_consumed: 60.0,
            bad_input_documents:          Vec::new(),
        },
        edges:    BulkImportResponse {
            documents_imported:           10,
            total_time_taken:             Duration::from_secs(2,),
            total_request_units_consumed: 20.0,
            bad_input_documents:          vec![json!({ "id": "bad" })],
        },
    };

    assert_eq!(summary.element_count(), 40);
    assert_eq!(summary.total_time(), Duration::from_secs(4,));
    assert_eq!(summary.writes_per_sec(), 10.0);
    assert_eq!(summary.units_per_sec(), 20.0);
    assert_eq!(summary.average_units_per_insert(), 2.0);
    assert!(summary.has_bad_documents());
    assert!(summary.to_string().contains("40 graph elements (30 vertices, 10 edges)"));
}

#[test]
fn test_cli_builds_import_config() {
    let cli = Cli::try_parse_from([
        "graph-bulk-importer",
        "file",
        "--dir",
        "/tmp/graph",
        "-n",
        "25",
        "--collection-name",
        "people",
        "--cleanup-on-start",
        "--no-upsert",
        "--max-concurrency",
        "8",
    ],)
    .unwrap();

    let Commands::File(args,) = &cli.command else {
        panic!("expected file command");
    };
    let config = args.import_config();
    assert_eq!(config.documents_to_import, 25);
    assert_eq!(config.loader.collection_name, "people");
    assert_eq!(config.loader.endpoint, "/tmp/graph");
    assert!(config.cleanup_on_start);
    assert!(!config.options.enable_upsert);
    assert!(config.options.disable_automatic_id_generation);
    assert_eq!(config.options.concurrency(), 8);
}

#[tokio::test]
async fn test_neo4j_import() {
    // This test assumes a local Neo4j instance is running at the default bolt port (7687)
    // with user 'neo4j' and password 'password'.
    if std::env::var("RUN_NEO4J_TESTS",).is_err() {
        println!("Skipping Neo4j import test: RUN_NEO4J_TESTS environment variable not set.");
        return;
    }

    let config = LoaderConfig {
        endpoint:        "bolt://neo4j@localhost:7687".to_string(),
        auth_key:        Some("password".to_string(),),
        database_name:   "neo4j".to_string(),
        collection_name: "graph_bulk_importer_test".to_string(),
    };
    let loader = Neo4jLoader::new(config,)
        .await
        .expect("Failed to create Neo4jLoader",);
    loader.reset_collection(400,).await.unwrap();
    assert!(loader.collection_exists().await.unwrap());

    let mapping = store_mapping("StateCode",).unwrap();
    let vertices = generate_vertices(6, &mapping,).unwrap();
    let edges = generate_edges(&vertices,);
    let options = BulkImportOptions {
        enable_upsert: true,
        disable_automatic_id_generation: true,
        ..Default::default()
    };

    let cancel = CancelToken::new();
    let v = loader
        .bulk_import(vertices.into_iter().map(Into::into,).collect(), &options, &cancel,)
        .await
        .unwrap();
    let e = loader
        .bulk_import(edges.into_iter().map(Into::into,).collect(), &options, &cancel,)
        .await
        .unwrap();

    assert_eq!(v.documents_imported, 6);
    assert_eq!(e.documents_imported, 6);

    loader.drop_collection().await.unwrap();
    assert!(!loader.collection_exists().await.unwrap());
}
