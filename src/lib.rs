// graph_bulk_importer/src/lib.rs
// Public API: record-to-vertex mapping and the bulk import driver.

pub mod cli;
pub mod document;
pub mod driver;
pub mod element;
pub mod error;
pub mod file;
pub mod generator;
pub mod loader;
pub mod neo4j;
pub mod record;
pub mod retry;
pub mod vertex;

pub use element::{Edge, GraphElement, Property, Vertex};
pub use error::{ImporterError, Result};
pub use record::{DynamicRecord, Record, Typed};
pub use vertex::{ToVertex, VertexMapping};

/// Vertex property that always carries the partition key value.
pub const PARTITION_KEY_PROPERTY: &str = "partitionKey";
/// Default source field used as the vertex id.
pub const DEFAULT_ID_FIELD: &str = "id";
/// Default source field used as the partition key.
pub const DEFAULT_PARTITION_KEY_FIELD: &str = "partitionKey";
pub const DEFAULT_DATABASE_NAME: &str = "graphdb";
pub const DEFAULT_COLLECTION_NAME: &str = "graphcollection";
pub const DEFAULT_COLLECTION_THROUGHPUT: u32 = 100_000;
pub const DEFAULT_SORTING_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const BAD_VERTICES_FILE: &str = "BadVertices.txt";
pub const BAD_EDGES_FILE: &str = "BadEdges.txt";
