// graph_bulk_importer/src/element.rs
// Graph elements handed to the bulk loaders.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::PARTITION_KEY_PROPERTY;

/// A named vertex or edge property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,)]
pub struct Property {
    pub name:  String,
    pub value: Value,
}

impl Property {
    pub fn new(name: impl Into<String,>, value: impl Into<Value,>,) -> Self {
        Self {
            name:  name.into(),
            value: value.into(),
        }
    }
}

/// A graph node: identifier, label and ordered property bag.
///
/// Vertices built by the mapper always carry `partitionKey` as their first
/// property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,)]
pub struct Vertex {
    pub id:         String,
    pub label:      String,
    pub properties: Vec<Property,>,
}

impl Vertex {
    pub fn new(id: impl Into<String,>, label: impl Into<String,>,) -> Self {
        Self {
            id:         id.into(),
            label:      label.into(),
            properties: Vec::new(),
        }
    }

    pub fn add_property(&mut self, name: impl Into<String,>, value: impl Into<Value,>,) {
        self.properties.push(Property::new(name, value,),);
    }

    /// All properties with the given name, in insertion order.
    pub fn properties_named<'a,>(&'a self, name: &'a str,) -> impl Iterator<Item = &'a Value,> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.name == name,)
            .map(|p| &p.value,)
    }

    /// First property with the given name.
    pub fn property(&self, name: &str,) -> Option<&Value,> {
        self.properties
            .iter()
            .find(|p| p.name == name,)
            .map(|p| &p.value,)
    }

    pub fn partition_key(&self,) -> Option<&Value,> {
        self.property(PARTITION_KEY_PROPERTY,)
    }
}

/// A directed relationship between two vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,)]
pub struct Edge {
    /// Empty when the loader is allowed to generate one.
    pub id:                String,
    pub label:             String,
    pub out_vertex_id:     String,
    pub out_vertex_label:  String,
    pub out_partition_key: Value,
    pub in_vertex_id:      String,
    pub in_vertex_label:   String,
    pub in_partition_key:  Value,
    pub properties:        Vec<Property,>,
}

impl Edge {
    /// Edge from `out` to `into`, taking endpoint ids, labels and partition
    /// keys from the vertices.
    pub fn between(label: impl Into<String,>, out: &Vertex, into: &Vertex,) -> Self {
        Self {
            id:                String::new(),
            label:             label.into(),
            out_vertex_id:     out.id.clone(),
            out_vertex_label:  out.label.clone(),
            out_partition_key: out.partition_key().cloned().unwrap_or(Value::Null,),
            in_vertex_id:      into.id.clone(),
            in_vertex_label:   into.label.clone(),
            in_partition_key:  into.partition_key().cloned().unwrap_or(Value::Null,),
            properties:        Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String,>,) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_property(mut self, name: impl Into<String,>, value: impl Into<Value,>,) -> Self {
        self.properties.push(Property::new(name, value,),);
        self
    }

    pub fn property(&self, name: &str,) -> Option<&Value,> {
        self.properties
            .iter()
            .find(|p| p.name == name,)
            .map(|p| &p.value,)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GraphElement {
    Vertex(Vertex,),
    Edge(Edge,),
}

impl GraphElement {
    pub fn id(&self,) -> &str {
        match self {
            GraphElement::Vertex(v,) => &v.id,
            GraphElement::Edge(e,) => &e.id,
        }
    }

    pub fn label(&self,) -> &str {
        match self {
            GraphElement::Vertex(v,) => &v.label,
            GraphElement::Edge(e,) => &e.label,
        }
    }

    /// Partition the element is stored in. Edges live with their out vertex.
    pub fn partition_key(&self,) -> Option<&Value,> {
        match self {
            GraphElement::Vertex(v,) => v.partition_key(),
            GraphElement::Edge(e,) => Some(&e.out_partition_key,).filter(|v| !v.is_null(),),
        }
    }

    pub fn is_edge(&self,) -> bool {
        matches!(self, GraphElement::Edge(_,))
    }
}

impl From<Vertex,> for GraphElement {
    fn from(v: Vertex,) -> Self {
        GraphElement::Vertex(v,)
    }
}

impl From<Edge,> for GraphElement {
    fn from(e: Edge,) -> Self {
        GraphElement::Edge(e,)
    }
}
