// graph_bulk_importer/src/loader.rs
// Bulk loader trait and the behavior every loader shares.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::document::{reserved_property, to_document};
use crate::element::GraphElement;
use crate::error::{ImporterError, Result};
use crate::{DEFAULT_MAX_CONCURRENCY, DEFAULT_SORTING_BATCH_SIZE};

/// Connection settings shared by all loaders.
#[derive(Debug, Clone,)]
pub struct LoaderConfig {
    pub endpoint:        String,
    pub auth_key:        Option<String,>,
    pub database_name:   String,
    pub collection_name: String,
}

/// Options forwarded with every bulk import call.
#[derive(Debug, Clone, Default, PartialEq, Eq,)]
pub struct BulkImportOptions {
    /// Replace documents whose id already exists instead of rejecting them.
    pub enable_upsert:                           bool,
    /// Reject elements without an id instead of assigning a fresh UUID.
    pub disable_automatic_id_generation:         bool,
    pub max_concurrency_per_partition_key_range: Option<usize,>,
    pub max_in_memory_sorting_batch_size:        Option<usize,>,
}

impl BulkImportOptions {
    pub fn concurrency(&self,) -> usize {
        self.max_concurrency_per_partition_key_range
            .unwrap_or(DEFAULT_MAX_CONCURRENCY,)
            .max(1,)
    }

    pub fn sorting_batch_size(&self,) -> usize {
        self.max_in_memory_sorting_batch_size
            .unwrap_or(DEFAULT_SORTING_BATCH_SIZE,)
            .max(1,)
    }
}

/// Outcome of one bulk import call.
#[derive(Debug, Clone, Default, PartialEq,)]
pub struct BulkImportResponse {
    pub documents_imported:           u64,
    pub total_time_taken:             Duration,
    pub total_request_units_consumed: f64,
    /// Documents the loader refused, in graph-document form.
    pub bad_input_documents:          Vec<Value,>,
}

/// Cooperative cancellation flag shared between the driver and a loader.
#[derive(Debug, Clone, Default,)]
pub struct CancelToken(Arc<AtomicBool,>,);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self,) {
        self.0.store(true, Ordering::Relaxed,);
    }

    pub fn is_cancelled(&self,) -> bool {
        self.0.load(Ordering::Relaxed,)
    }

    /// `Err(Cancelled)` once the token has been tripped.
    pub fn check(&self,) -> Result<(),> {
        if self.is_cancelled() {
            return Err(ImporterError::Cancelled,);
        }
        Ok((),)
    }
}

/// A backend that writes graph elements in bulk.
///
/// Batching, ordering, retrying and parallelism are the loader's business;
/// callers only hand over the full element sequence.
#[async_trait]
pub trait BulkLoader: Send + Sync {
    /// Creates a loader for the configured database and collection.
    async fn new(config: LoaderConfig,) -> Result<Self,>
    where
        Self: Sized;

    fn name(&self,) -> &str;

    async fn collection_exists(&self,) -> Result<bool,>;

    /// Deletes the collection if present and creates it empty.
    async fn reset_collection(&self, throughput: u32,) -> Result<(),>;

    async fn drop_collection(&self,) -> Result<(),>;

    async fn bulk_import(
        &self,
        elements: Vec<GraphElement,>,
        options: &BulkImportOptions,
        cancel: &CancelToken,
    ) -> Result<BulkImportResponse,>;
}

/// Elements split into accepted, partition-sorted chunks and rejected documents.
#[derive(Debug, Default,)]
pub struct PreparedImport {
    pub chunks:              Vec<Vec<GraphElement,>,>,
    pub bad_input_documents: Vec<Value,>,
}

impl PreparedImport {
    pub fn accepted(&self,) -> usize {
        self.chunks.iter().map(Vec::len,).sum()
    }
}

/// Validates elements, assigns missing ids when allowed and groups the rest
/// into chunks of `max_in_memory_sorting_batch_size`, each sorted by
/// partition key. Sorting is stable, so later duplicates still win an upsert.
pub fn prepare_import(elements: Vec<GraphElement,>, options: &BulkImportOptions,) -> PreparedImport {
    let mut prepared = PreparedImport::default();
    let mut accepted = Vec::with_capacity(elements.len(),);

    for mut element in elements {
        match validate(&mut element, options,) {
            Ok((),) => accepted.push(element,),
            Err(reason,) => {
                warn!("Rejecting {} '{}': {}", kind(&element), element.id(), reason);
                prepared.bad_input_documents.push(to_document(&element,),);
            },
        }
    }

    let chunk_size = options.sorting_batch_size();
    let mut rest = accepted.into_iter().peekable();
    while rest.peek().is_some() {
        let mut chunk: Vec<GraphElement,> = rest.by_ref().take(chunk_size,).collect();
        chunk.sort_by_cached_key(partition_sort_key,);
        prepared.chunks.push(chunk,);
    }

    debug!(
        "Prepared {} elements in {} chunks, {} rejected",
        prepared.accepted(),
        prepared.chunks.len(),
        prepared.bad_input_documents.len()
    );
    prepared
}

fn validate(element: &mut GraphElement, options: &BulkImportOptions,) -> std::result::Result<(), String,> {
    let needs_id = element.id().trim().is_empty();
    if needs_id && options.disable_automatic_id_generation {
        return Err("missing id and automatic id generation is disabled".to_string(),);
    }
    if element.label().trim().is_empty() {
        return Err("missing label".to_string(),);
    }
    if element.partition_key().is_none() {
        return Err("missing partition key".to_string(),);
    }
    if let Some(name,) = reserved_property(element,) {
        return Err(format!("property '{}' collides with a reserved document key", name),);
    }
    if let GraphElement::Edge(edge,) = element {
        if edge.out_vertex_id.trim().is_empty() || edge.in_vertex_id.trim().is_empty() {
            return Err("edge endpoints must both have ids".to_string(),);
        }
    }

    if needs_id {
        let id = Uuid::new_v4().to_string();
        match element {
            GraphElement::Vertex(v,) => v.id = id,
            GraphElement::Edge(e,) => e.id = id,
        }
    }
    Ok((),)
}

fn partition_sort_key(element: &GraphElement,) -> String {
    match element.partition_key() {
        Some(Value::String(s,),) => s.clone(),
        Some(other,) => other.to_string(),
        None => String::new(),
    }
}

pub(crate) fn kind(element: &GraphElement,) -> &'static str {
    if element.is_edge() { "edge" } else { "vertex" }
}
