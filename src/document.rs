// graph_bulk_importer/src/document.rs
// Graph-document wire form of vertices and edges.

use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::PARTITION_KEY_PROPERTY;
use crate::element::{Edge, GraphElement, Property, Vertex};
use crate::error::{ImporterError, Result};

const IS_EDGE: &str = "_isEdge";
const VERTEX_ID: &str = "_vertexId";
const VERTEX_LABEL: &str = "_vertexLabel";
const SINK: &str = "_sink";
const SINK_LABEL: &str = "_sinkLabel";
const SINK_PARTITION: &str = "_sinkPartition";
const VALUE: &str = "_value";

/// Bytes covered by one capacity unit.
const UNIT_BYTES: usize = 1024;

/// Serializes an element the way graph document stores keep it.
///
/// Vertex properties other than the partition key become arrays of
/// `{ "id": <uuid>, "_value": <value> }` so a property name can hold several
/// values. Edge properties stay flat.
pub fn to_document(element: &GraphElement,) -> Value {
    match element {
        GraphElement::Vertex(v,) => vertex_document(v,),
        GraphElement::Edge(e,) => edge_document(e,),
    }
}

fn vertex_document(vertex: &Vertex,) -> Value {
    let mut doc = Map::new();
    doc.insert("id".into(), Value::String(vertex.id.clone(),),);
    doc.insert("label".into(), Value::String(vertex.label.clone(),),);
    doc.insert(
        PARTITION_KEY_PROPERTY.into(),
        vertex.partition_key().cloned().unwrap_or(Value::Null,),
    );

    for prop in vertex.properties.iter().filter(|p| p.name != PARTITION_KEY_PROPERTY,) {
        let entry = json!({ "id": Uuid::new_v4().to_string(), VALUE: prop.value });
        match doc
            .entry(prop.name.clone(),)
            .or_insert_with(|| Value::Array(Vec::new(),),)
        {
            Value::Array(values,) => values.push(entry,),
            slot => *slot = Value::Array(vec![entry],),
        }
    }

    Value::Object(doc,)
}

fn edge_document(edge: &Edge,) -> Value {
    let mut doc = Map::new();
    doc.insert("id".into(), Value::String(edge.id.clone(),),);
    doc.insert("label".into(), Value::String(edge.label.clone(),),);
    doc.insert(IS_EDGE.into(), Value::Bool(true,),);
    doc.insert(VERTEX_ID.into(), Value::String(edge.out_vertex_id.clone(),),);
    doc.insert(VERTEX_LABEL.into(), Value::String(edge.out_vertex_label.clone(),),);
    doc.insert(SINK.into(), Value::String(edge.in_vertex_id.clone(),),);
    doc.insert(SINK_LABEL.into(), Value::String(edge.in_vertex_label.clone(),),);
    doc.insert(SINK_PARTITION.into(), edge.in_partition_key.clone(),);
    doc.insert(PARTITION_KEY_PROPERTY.into(), edge.out_partition_key.clone(),);
    for prop in &edge.properties {
        doc.insert(prop.name.clone(), prop.value.clone(),);
    }
    Value::Object(doc,)
}

/// Reads an element back from its document form. Property ids are dropped.
pub fn from_document(doc: &Value,) -> Result<GraphElement,> {
    let obj = doc.as_object().ok_or_else(|| {
        ImporterError::IngestionError("Graph document must be an object".to_string(),)
    },)?;

    let id = string_member(obj, "id",)?;
    let label = string_member(obj, "label",)?;
    let partition_key = obj.get(PARTITION_KEY_PROPERTY,).cloned().unwrap_or(Value::Null,);

    if obj.get(IS_EDGE,).and_then(Value::as_bool,).unwrap_or(false,) {
        let mut edge = Edge {
            id,
            label,
            out_vertex_id: string_member(obj, VERTEX_ID,)?,
            out_vertex_label: string_member(obj, VERTEX_LABEL,)?,
            out_partition_key: partition_key,
            in_vertex_id: string_member(obj, SINK,)?,
            in_vertex_label: string_member(obj, SINK_LABEL,)?,
            in_partition_key: obj.get(SINK_PARTITION,).cloned().unwrap_or(Value::Null,),
            properties: Vec::new(),
        };
        for (name, value,) in obj {
            if !is_edge_system_key(name,) {
                edge.properties.push(Property::new(name.clone(), value.clone(),),);
            }
        }
        return Ok(GraphElement::Edge(edge,),);
    }

    let mut vertex = Vertex::new(id, label,);
    vertex.add_property(PARTITION_KEY_PROPERTY, partition_key,);
    for (name, value,) in obj {
        if matches!(name.as_str(), "id" | "label" | PARTITION_KEY_PROPERTY) {
            continue;
        }
        match value {
            Value::Array(entries,) => {
                for entry in entries {
                    let v = entry.get(VALUE,).cloned().unwrap_or_else(|| entry.clone(),);
                    vertex.add_property(name.clone(), v,);
                }
            },
            other => vertex.add_property(name.clone(), other.clone(),),
        }
    }
    Ok(GraphElement::Vertex(vertex,),)
}

/// First property of `element` whose name would overwrite a key the document
/// form owns. Names starting with `_` are reserved for store bookkeeping.
/// A vertex may carry `partitionKey` once.
pub fn reserved_property(element: &GraphElement,) -> Option<&str,> {
    match element {
        GraphElement::Vertex(v,) => {
            let mut seen_partition_key = false;
            v.properties.iter().map(|p| p.name.as_str(),).find(|name| {
                if *name == PARTITION_KEY_PROPERTY {
                    let repeated = seen_partition_key;
                    seen_partition_key = true;
                    return repeated;
                }
                matches!(*name, "id" | "label") || name.starts_with('_',)
            },)
        },
        GraphElement::Edge(e,) => e
            .properties
            .iter()
            .map(|p| p.name.as_str(),)
            .find(|name| is_edge_system_key(name,) || name.starts_with('_',),),
    }
}

fn is_edge_system_key(name: &str,) -> bool {
    matches!(
        name,
        "id" | "label"
            | PARTITION_KEY_PROPERTY
            | IS_EDGE
            | VERTEX_ID
            | VERTEX_LABEL
            | SINK
            | SINK_LABEL
            | SINK_PARTITION
    )
}

fn string_member(obj: &Map<String, Value,>, key: &str,) -> Result<String,> {
    obj.get(key,)
        .and_then(Value::as_str,)
        .map(str::to_string,)
        .ok_or_else(|| {
            ImporterError::IngestionError(format!("Graph document is missing '{}'", key),)
        },)
}

/// Capacity units charged for writing `doc`: one per started KiB, at least one.
pub fn capacity_units(doc: &Value,) -> f64 {
    let bytes = doc.to_string().len();
    bytes.div_ceil(UNIT_BYTES,).max(1,) as f64
}
