// graph_bulk_importer/src/driver.rs
// Runs a bulk import: prepare the collection, load vertices then edges,
// report and clean up.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::element::{Edge, GraphElement, Vertex};
use crate::error::{ImporterError, Result};
use crate::generator::{generate_edges, generate_vertices, store_mapping};
use crate::loader::{BulkImportOptions, BulkImportResponse, BulkLoader, CancelToken, LoaderConfig};
use crate::{BAD_EDGES_FILE, BAD_VERTICES_FILE};

/// Everything a run needs; built once at startup and passed in.
#[derive(Debug, Clone,)]
pub struct ImportConfig {
    pub loader:                LoaderConfig,
    pub collection_throughput: u32,
    pub documents_to_import:   u64,
    /// Store field used as the vertex partition key.
    pub partition_key_field:   String,
    pub cleanup_on_start:      bool,
    pub cleanup_on_finish:     bool,
    pub options:               BulkImportOptions,
    /// Directory receiving `BadVertices.txt` / `BadEdges.txt`.
    pub output_dir:            PathBuf,
}

/// Vertex and edge responses of one run.
#[derive(Debug, Clone, Default, PartialEq,)]
pub struct ImportSummary {
    pub vertices: BulkImportResponse,
    pub edges:    BulkImportResponse,
}

impl ImportSummary {
    pub fn element_count(&self,) -> u64 {
        self.vertices.documents_imported + self.edges.documents_imported
    }

    pub fn total_time(&self,) -> Duration {
        self.vertices.total_time_taken + self.edges.total_time_taken
    }

    pub fn total_units(&self,) -> f64 {
        self.vertices.total_request_units_consumed + self.edges.total_request_units_consumed
    }

    pub fn writes_per_sec(&self,) -> f64 {
        per_second(self.element_count() as f64, self.total_time(),)
    }

    pub fn units_per_sec(&self,) -> f64 {
        per_second(self.total_units(), self.total_time(),)
    }

    pub fn average_units_per_insert(&self,) -> f64 {
        match self.element_count() {
            0 => 0.0,
            n => self.total_units() / n as f64,
        }
    }

    pub fn has_bad_documents(&self,) -> bool {
        !self.vertices.bad_input_documents.is_empty() || !self.edges.bad_input_documents.is_empty()
    }
}

fn per_second(amount: f64, elapsed: Duration,) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { (amount / secs).round() } else { 0.0 }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result {
        let rule = "-".repeat(69,);
        writeln!(f, "Summary for batch")?;
        writeln!(f, "{}", rule)?;
        writeln!(
            f,
            "Inserted {} graph elements ({} vertices, {} edges) @ {} writes/s, {} RU/s in {:.3} sec",
            self.element_count(),
            self.vertices.documents_imported,
            self.edges.documents_imported,
            self.writes_per_sec(),
            self.units_per_sec(),
            self.total_time().as_secs_f64()
        )?;
        writeln!(f, "Average RU consumption per insert: {:.2}", self.average_units_per_insert())?;
        if self.has_bad_documents() {
            writeln!(
                f,
                "Rejected {} vertices, {} edges",
                self.vertices.bad_input_documents.len(),
                self.edges.bad_input_documents.len()
            )?;
        }
        write!(f, "{}", rule)
    }
}

pub struct ImportDriver<L: BulkLoader,> {
    loader: L,
    config: ImportConfig,
}

impl<L: BulkLoader,> ImportDriver<L,> {
    pub fn new(loader: L, config: ImportConfig,) -> Self {
        Self { loader, config, }
    }

    pub fn loader(&self,) -> &L {
        &self.loader
    }

    pub fn config(&self,) -> &ImportConfig {
        &self.config
    }

    /// Recreates the collection when `cleanup_on_start` is set, otherwise
    /// requires it to exist.
    pub async fn prepare_collection(&self,) -> Result<(),> {
        let target = format!(
            "{}.{}",
            self.config.loader.database_name, self.config.loader.collection_name
        );
        if self.config.cleanup_on_start {
            info!(
                "Recreating collection {} with {} RU/s",
                target, self.config.collection_throughput
            );
            return self
                .loader
                .reset_collection(self.config.collection_throughput,)
                .await;
        }

        if !self.loader.collection_exists().await? {
            return Err(ImporterError::ConfigurationError(format!(
                "The data collection does not exist: {}",
                target
            ),),);
        }
        Ok((),)
    }

    /// Imports vertices, then edges. A loader failure ends the run; nothing is
    /// retried here.
    pub async fn import(
        &self,
        vertices: Vec<Vertex,>,
        edges: Vec<Edge,>,
        cancel: &CancelToken,
    ) -> Result<ImportSummary,> {
        let options = &self.config.options;

        let vertex_elements: Vec<GraphElement,> = vertices.into_iter().map(GraphElement::from,).collect();
        info!("Importing {} vertices with the {} loader", vertex_elements.len(), self.loader.name());
        let vertex_response = self.loader.bulk_import(vertex_elements, options, cancel,).await?;

        let edge_elements: Vec<GraphElement,> = edges.into_iter().map(GraphElement::from,).collect();
        info!("Importing {} edges with the {} loader", edge_elements.len(), self.loader.name());
        let edge_response = self.loader.bulk_import(edge_elements, options, cancel,).await?;

        Ok(ImportSummary {
            vertices: vertex_response,
            edges:    edge_response,
        },)
    }

    /// Full run over generated store data.
    pub async fn run(&self, cancel: &CancelToken,) -> Result<ImportSummary,> {
        info!("Loader: {} ({})", self.loader.name(), self.config.loader.endpoint);
        info!(
            "Collection: {}.{}",
            self.config.loader.database_name, self.config.loader.collection_name
        );

        if let Err(e,) = self.prepare_collection().await {
            error!("Unable to initialize: {}", e);
            return Err(e,);
        }

        let mapping = store_mapping(&self.config.partition_key_field,)?;
        let vertices = generate_vertices(self.config.documents_to_import, &mapping,)?;
        let edges = generate_edges(&vertices,);

        let summary = match self.import(vertices, edges, cancel,).await {
            Ok(summary,) => summary,
            Err(e,) => {
                error!("Bulk import failed: {}", e);
                return Err(e,);
            },
        };

        info!(
            "Imported {} vertices and {} edges",
            summary.vertices.documents_imported, summary.edges.documents_imported
        );

        if summary.has_bad_documents() {
            warn!(
                "Loader rejected {} vertices and {} edges, writing them to '{}'",
                summary.vertices.bad_input_documents.len(),
                summary.edges.bad_input_documents.len(),
                self.config.output_dir.display()
            );
            write_bad_documents(&self.config.output_dir, &summary,).await?;
        }

        if self.config.cleanup_on_finish {
            info!("Deleting collection {}", self.config.loader.collection_name);
            self.loader.drop_collection().await?;
        }

        Ok(summary,)
    }
}

/// Appends rejected documents, one JSON document per line, to
/// `BadVertices.txt` and `BadEdges.txt` under `dir`.
pub async fn write_bad_documents(dir: &Path, summary: &ImportSummary,) -> Result<(),> {
    fs::create_dir_all(dir,).await?;
    append_lines(&dir.join(BAD_VERTICES_FILE,), &summary.vertices.bad_input_documents,).await?;
    append_lines(&dir.join(BAD_EDGES_FILE,), &summary.edges.bad_input_documents,).await?;
    Ok((),)
}

async fn append_lines(path: &Path, documents: &[Value],) -> Result<(),> {
    let mut buf = String::new();
    for doc in documents {
        buf.push_str(&doc.to_string(),);
        buf.push('\n',);
    }

    let mut file = fs::OpenOptions::new()
        .create(true,)
        .append(true,)
        .open(path,)
        .await?;
    file.write_all(buf.as_bytes(),).await?;
    file.flush().await?;
    Ok((),)
}
