// graph_bulk_importer/src/neo4j/mod.rs
// Neo4j bulk loader.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use neo4rs::{BoltType, ConfigBuilder, Graph, Row, query};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::PARTITION_KEY_PROPERTY;
use crate::document::{capacity_units, to_document};
use crate::element::{Edge, GraphElement, Property, Vertex};
use crate::error::{ImporterError, Result};
use crate::loader::{
    BulkImportOptions, BulkImportResponse, BulkLoader, CancelToken, LoaderConfig, prepare_import,
};
use crate::retry::{execute_with_retry, permanent_error, wrap_error};

/// Label carried by every imported node, next to its own label.
const VERTEX_LABEL: &str = "GraphVertex";
/// Label of the node that marks a collection as created.
const COLLECTION_LABEL: &str = "GraphCollection";
/// Rows sent in one `UNWIND` statement.
const ROWS_PER_STATEMENT: usize = 500;
const DEFAULT_PORT: u16 = 7687;

/// Writes vertices as nodes and edges as relationships. A collection is the
/// set of nodes whose `_collection` property holds the collection name.
pub struct Neo4jLoader {
    config: LoaderConfig,
    graph:  Graph,
}

struct Batch {
    label:    String,
    is_edge:  bool,
    elements: Vec<GraphElement,>,
}

#[async_trait]
impl BulkLoader for Neo4jLoader {
    async fn new(config: LoaderConfig,) -> Result<Self,> {
        let parsed_uri = url::Url::parse(&config.endpoint,).map_err(|e| {
            ImporterError::ConfigurationError(format!("Invalid Neo4j URI: {}", e),)
        },)?;

        let host = parsed_uri.host_str().unwrap_or("localhost",).to_string();
        let port = parsed_uri.port().unwrap_or(DEFAULT_PORT,);
        let username = match parsed_uri.username() {
            "" => "neo4j",
            user => user,
        };
        let password = config
            .auth_key
            .clone()
            .or_else(|| parsed_uri.password().map(str::to_string,),)
            .unwrap_or_default();

        let host_port = format!("{}:{}", host, port);
        let graph = execute_with_retry(|| async {
            let neo4j_config = ConfigBuilder::default()
                .uri(host_port.as_str(),)
                .user(username,)
                .password(password.as_str(),)
                .db(config.database_name.as_str(),)
                .build()
                .map_err(|e| {
                    permanent_error(ImporterError::ConfigurationError(format!(
                        "Invalid Neo4j configuration: {:?}",
                        e
                    ),),)
                },)?;

            Graph::connect(neo4j_config,).await.map_err(|e| {
                wrap_error(ImporterError::ConnectionError(format!(
                    "Failed to connect to Neo4j: {:?}",
                    e
                ),),)
            },)
        },)
        .await?;

        info!("Connected to Neo4j at {}:{}", host, port);
        Ok(Neo4jLoader { config, graph, },)
    }

    fn name(&self,) -> &str {
        "neo4j"
    }

    async fn collection_exists(&self,) -> Result<bool,> {
        let statement = format!(
            "MATCH (c:{} {{name: $collection}}) RETURN count(c) AS found",
            COLLECTION_LABEL
        );
        let mut rows = self
            .graph
            .execute(query(&statement,).param("collection", self.collection(),),)
            .await
            .map_err(|e| ImporterError::DatabaseError(format!("{:?}", e),),)?;

        let found = match rows.next().await {
            Ok(Some(row,),) => row_value::<i64,>(&row, "found",)?,
            Ok(None,) => 0,
            Err(e,) => return Err(ImporterError::DatabaseError(format!("{:?}", e),),),
        };
        Ok(found > 0,)
    }

    async fn reset_collection(&self, throughput: u32,) -> Result<(),> {
        self.delete_collection_nodes().await?;

        let index = format!(
            "CREATE INDEX graph_vertex_id IF NOT EXISTS FOR (n:{}) ON (n._collection, n.id)",
            VERTEX_LABEL
        );
        self.run(&index,).await?;

        let marker = format!(
            "CREATE (c:{} {{name: $collection, throughput: $throughput}})",
            COLLECTION_LABEL
        );
        execute_with_retry(|| async {
            self.graph
                .run(
                    query(&marker,)
                        .param("collection", self.collection(),)
                        .param("throughput", throughput as i64,),
                )
                .await
                .map_err(|e| wrap_error(ImporterError::DatabaseError(format!("{:?}", e),),),)
        },)
        .await?;

        // Neo4j has no provisioned throughput; it is only recorded on the marker.
        info!(
            "Created collection {}.{} ({} RU/s recorded)",
            self.config.database_name, self.config.collection_name, throughput
        );
        Ok((),)
    }

    async fn drop_collection(&self,) -> Result<(),> {
        self.delete_collection_nodes().await?;
        info!(
            "Deleted collection {}.{}",
            self.config.database_name, self.config.collection_name
        );
        Ok((),)
    }

    async fn bulk_import(
        &self,
        elements: Vec<GraphElement,>,
        options: &BulkImportOptions,
        cancel: &CancelToken,
    ) -> Result<BulkImportResponse,> {
        let started = Instant::now();
        let prepared = prepare_import(elements, options,);
        let mut response = BulkImportResponse {
            bad_input_documents: prepared.bad_input_documents,
            ..Default::default()
        };

        for chunk in prepared.chunks {
            cancel.check()?;
            let batches = into_batches(chunk,);
            debug!("Dispatching {} batches", batches.len());

            let results: Vec<(Batch, Result<HashSet<String,>,>,),> = stream::iter(batches,)
                .map(|batch| async move {
                    let written = match cancel.check() {
                        Ok((),) => self.write_batch(&batch, options.enable_upsert,).await,
                        Err(e,) => Err(e,),
                    };
                    (batch, written,)
                },)
                .buffer_unordered(options.concurrency(),)
                .collect()
                .await;

            for (batch, written,) in results {
                let written = written?;
                for element in batch.elements {
                    let doc = to_document(&element,);
                    if written.contains(element.id(),) {
                        response.documents_imported += 1;
                        response.total_request_units_consumed += capacity_units(&doc,);
                    } else {
                        response.bad_input_documents.push(doc,);
                    }
                }
            }
        }

        response.total_time_taken = started.elapsed();
        info!(
            "Imported {} elements into Neo4j collection '{}'",
            response.documents_imported, self.config.collection_name
        );
        Ok(response,)
    }
}

impl Neo4jLoader {
    fn collection(&self,) -> String {
        self.config.collection_name.clone()
    }

    async fn run(&self, statement: &str,) -> Result<(),> {
        execute_with_retry(|| async {
            self.graph
                .run(query(statement,),)
                .await
                .map_err(|e| wrap_error(ImporterError::DatabaseError(format!("{:?}", e),),),)
        },)
        .await
    }

    async fn delete_collection_nodes(&self,) -> Result<(),> {
        let vertices = format!(
            "MATCH (n:{} {{_collection: $collection}}) DETACH DELETE n",
            VERTEX_LABEL
        );
        let marker = format!(
            "MATCH (c:{} {{name: $collection}}) DELETE c",
            COLLECTION_LABEL
        );
        for statement in [&vertices, &marker,] {
            execute_with_retry(|| async {
                self.graph
                    .run(query(statement,).param("collection", self.collection(),),)
                    .await
                    .map_err(|e| wrap_error(ImporterError::DatabaseError(format!("{:?}", e),),),)
            },)
            .await?;
        }
        Ok((),)
    }

    /// Writes one batch and returns the ids that made it into the graph.
    async fn write_batch(&self, batch: &Batch, upsert: bool,) -> Result<HashSet<String,>,> {
        let statement = if batch.is_edge {
            edge_statement(&batch.label, upsert,)
        } else {
            vertex_statement(&batch.label, upsert,)
        };
        let rows = BoltType::List(neo4rs::BoltList {
            value: batch.elements.iter().map(element_row,).collect(),
        },);

        let written: Vec<String,> = execute_with_retry(|| async {
            let mut stream = self
                .graph
                .execute(
                    query(&statement,)
                        .param("collection", self.collection(),)
                        .param("rows", rows.clone(),),
                )
                .await
                .map_err(|e| {
                    wrap_error(ImporterError::IngestionError(format!(
                        "Failed to write batch to Neo4j: {:?}",
                        e
                    ),),)
                },)?;

            match stream.next().await {
                Ok(Some(row,),) => row_value::<Vec<String,>,>(&row, "written",).map_err(permanent_error,),
                Ok(None,) => Ok(Vec::new(),),
                Err(e,) => Err(wrap_error(ImporterError::DatabaseError(format!("{:?}", e),),),),
            }
        },)
        .await?;

        Ok(written.into_iter().collect(),)
    }
}

/// Groups a sorted chunk by element kind and label, keeping first-seen order,
/// and cuts each group into statement-sized batches.
fn into_batches(chunk: Vec<GraphElement,>,) -> Vec<Batch,> {
    let mut order: Vec<(bool, String,),> = Vec::new();
    let mut groups: HashMap<(bool, String,), Vec<GraphElement,>,> = HashMap::new();
    for element in chunk {
        let key = (element.is_edge(), element.label().to_string(),);
        if !groups.contains_key(&key,) {
            order.push(key.clone(),);
        }
        groups.entry(key,).or_default().push(element,);
    }

    let mut batches = Vec::new();
    for key in order {
        let Some(elements,) = groups.remove(&key,) else {
            continue;
        };
        let mut rest = elements.into_iter().peekable();
        while rest.peek().is_some() {
            batches.push(Batch {
                label:    key.1.clone(),
                is_edge:  key.0,
                elements: rest.by_ref().take(ROWS_PER_STATEMENT,).collect(),
            },);
        }
    }
    batches
}

/// Reads `column` from a result row. A missing column or a value of the
/// wrong type is a database error.
pub fn row_value<T: DeserializeOwned,>(row: &Row, column: &str,) -> Result<T,> {
    row.get::<T>(column,).map_err(|e| {
        ImporterError::DatabaseError(format!("Unexpected value in column '{}': {:?}", column, e),)
    },)
}

fn quote_label(label: &str,) -> String {
    format!("`{}`", label.replace('`', "``",))
}

fn vertex_statement(label: &str, upsert: bool,) -> String {
    let labels = format!("{}:{}", VERTEX_LABEL, quote_label(label,));
    if upsert {
        format!(
            "UNWIND $rows AS row \
             MERGE (n:{labels} {{_collection: $collection, id: row.id}}) \
             SET n += row.props \
             RETURN collect(n.id) AS written"
        )
    } else {
        format!(
            "UNWIND $rows AS row \
             OPTIONAL MATCH (existing:{VERTEX_LABEL} {{_collection: $collection, id: row.id}}) \
             WITH row, existing WHERE existing IS NULL \
             CREATE (n:{labels} {{_collection: $collection, id: row.id}}) \
             SET n += row.props \
             RETURN collect(n.id) AS written"
        )
    }
}

fn edge_statement(label: &str, upsert: bool,) -> String {
    let rel = quote_label(label,);
    let endpoints = format!(
        "UNWIND $rows AS row \
         MATCH (a:{VERTEX_LABEL} {{_collection: $collection, id: row.outId}}) \
         MATCH (b:{VERTEX_LABEL} {{_collection: $collection, id: row.inId}}) "
    );
    if upsert {
        format!(
            "{endpoints}\
             MERGE (a)-[r:{rel} {{id: row.id}}]->(b) \
             SET r += row.props \
             RETURN collect(r.id) AS written"
        )
    } else {
        format!(
            "{endpoints}\
             OPTIONAL MATCH (a)-[existing:{rel} {{id: row.id}}]->() \
             WITH a, b, row, existing WHERE existing IS NULL \
             CREATE (a)-[r:{rel} {{id: row.id}}]->(b) \
             SET r += row.props \
             RETURN collect(r.id) AS written"
        )
    }
}

fn element_row(element: &GraphElement,) -> BoltType {
    let mut row = HashMap::new();
    let props = match element {
        GraphElement::Vertex(v,) => vertex_props(v,),
        GraphElement::Edge(e,) => {
            row.insert("outId", BoltType::from(e.out_vertex_id.clone(),),);
            row.insert("inId", BoltType::from(e.in_vertex_id.clone(),),);
            edge_props(e,)
        },
    };
    row.insert("id", BoltType::from(element.id().to_string(),),);
    row.insert("props", props,);

    BoltType::Map(neo4rs::BoltMap {
        value: row
            .into_iter()
            .map(|(k, v,)| (neo4rs::BoltString { value: k.to_string(), }, v,),)
            .collect(),
    },)
}

/// Node properties. Repeated names collapse into a list.
fn vertex_props(vertex: &Vertex,) -> BoltType {
    let mut grouped: HashMap<&str, Vec<&Value,>,> = HashMap::new();
    for Property { name, value, } in &vertex.properties {
        grouped.entry(name.as_str(),).or_default().push(value,);
    }
    let map = grouped
        .into_iter()
        .map(|(name, values,)| {
            let bolt = match values.as_slice() {
                [single,] => property_to_bolt(single,),
                many => BoltType::List(neo4rs::BoltList {
                    value: many.iter().map(|v| property_to_bolt(v,),).collect(),
                },),
            };
            (neo4rs::BoltString { value: name.to_string(), }, bolt,)
        },)
        .collect();
    BoltType::Map(neo4rs::BoltMap { value: map, },)
}

fn edge_props(edge: &Edge,) -> BoltType {
    let mut map: HashMap<neo4rs::BoltString, BoltType,> = edge
        .properties
        .iter()
        .map(|p| (neo4rs::BoltString { value: p.name.clone(), }, property_to_bolt(&p.value,),),)
        .collect();
    map.insert(
        neo4rs::BoltString { value: PARTITION_KEY_PROPERTY.to_string(), },
        property_to_bolt(&edge.out_partition_key,),
    );
    BoltType::Map(neo4rs::BoltMap { value: map, },)
}

/// Neo4j properties hold scalars or lists of scalars; anything nested is
/// stored as its JSON text.
fn property_to_bolt(val: &Value,) -> BoltType {
    match val {
        Value::Null => BoltType::Null(neo4rs::BoltNull {},),
        Value::Bool(b,) => BoltType::Boolean(neo4rs::BoltBoolean { value: *b, },),
        Value::Number(n,) => {
            if let Some(i,) = n.as_i64() {
                BoltType::Integer(neo4rs::BoltInteger { value: i, },)
            } else {
                BoltType::Float(neo4rs::BoltFloat {
                    value: n.as_f64().unwrap_or(0.0,),
                },)
            }
        },
        Value::String(s,) => BoltType::String(neo4rs::BoltString { value: s.clone(), },),
        Value::Array(arr,) if arr.iter().all(is_scalar,) => BoltType::List(neo4rs::BoltList {
            value: arr.iter().map(property_to_bolt,).collect(),
        },),
        nested => BoltType::String(neo4rs::BoltString {
            value: nested.to_string(),
        },),
    }
}

fn is_scalar(val: &Value,) -> bool {
    !matches!(val, Value::Array(_,) | Value::Object(_,) | Value::Null)
}
