// graph_bulk_importer/src/vertex.rs
// Record-to-vertex mapping with case-insensitive field resolution.

use std::collections::HashMap;

use serde_json::Value;

use crate::element::Vertex;
use crate::error::{ImporterError, Result};
use crate::record::Record;
use crate::{DEFAULT_ID_FIELD, DEFAULT_PARTITION_KEY_FIELD, PARTITION_KEY_PROPERTY};

/// Which fields of a record become the vertex id and partition key, and which
/// label the vertex gets.
///
/// ```
/// use graph_bulk_importer::{DynamicRecord, VertexMapping};
///
/// let person = DynamicRecord::new("Person").with("Name", "person").with("Age", 10);
/// let vertex = VertexMapping::new("Name", "Age", "label").unwrap().map(&person).unwrap();
///
/// assert_eq!(vertex.id, "person");
/// assert_eq!(vertex.label, "label");
/// assert_eq!(vertex.partition_key(), Some(&serde_json::json!(10)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct VertexMapping {
    id_field:            String,
    partition_key_field: String,
    /// `None` takes the record's shape name.
    label:               Option<String,>,
}

impl Default for VertexMapping {
    fn default() -> Self {
        Self {
            id_field:            DEFAULT_ID_FIELD.to_string(),
            partition_key_field: DEFAULT_PARTITION_KEY_FIELD.to_string(),
            label:               None,
        }
    }
}

impl VertexMapping {
    /// Mapping with explicit id field, partition key field and label.
    pub fn new(id_field: &str, partition_key_field: &str, label: &str,) -> Result<Self,> {
        let mut mapping = Self::with_fields(id_field, partition_key_field,)?;
        mapping.label = Some(require_non_blank("label", label,)?,);
        Ok(mapping,)
    }

    /// Mapping with explicit id and partition key fields, labelled by shape.
    pub fn with_fields(id_field: &str, partition_key_field: &str,) -> Result<Self,> {
        Ok(Self {
            id_field:            require_non_blank("idField", id_field,)?,
            partition_key_field: require_non_blank("partitionKeyField", partition_key_field,)?,
            label:               None,
        },)
    }

    pub fn id_field(&self,) -> &str {
        &self.id_field
    }

    pub fn partition_key_field(&self,) -> &str {
        &self.partition_key_field
    }

    pub fn label(&self,) -> Option<&str,> {
        self.label.as_deref()
    }

    /// Builds the vertex for `record`.
    ///
    /// The partition key value is stored first under `partitionKey`. Every
    /// other field follows in enumeration order, except fields named like the
    /// reserved `id` / `partitionKey` vertex keys.
    pub fn map<R: Record + ?Sized,>(&self, record: &R,) -> Result<Vertex,> {
        let shape = record.shape_name();
        let fields = record.fields()?;
        let index = FieldIndex::new(&fields,);

        let id = index
            .get(&self.id_field,)
            .and_then(id_text,)
            .filter(|id| !id.trim().is_empty(),)
            .ok_or_else(|| ImporterError::missing_field(&shape, &self.id_field,),)?;

        let partition_key = index
            .get(&self.partition_key_field,)
            .filter(|v| !is_blank(v,),)
            .cloned()
            .ok_or_else(|| ImporterError::missing_field(&shape, &self.partition_key_field,),)?;

        let label = match &self.label {
            Some(label,) => label.clone(),
            None => require_non_blank("label", &shape,)?,
        };

        let mut vertex = Vertex::new(id, label,);
        vertex.add_property(PARTITION_KEY_PROPERTY, partition_key,);
        for (name, value,) in fields {
            if !is_reserved(&name,) {
                vertex.add_property(name, value,);
            }
        }

        Ok(vertex,)
    }
}

/// Conversion of any [`Record`] into a [`Vertex`].
pub trait ToVertex: Record {
    /// Uses the `id` and `partitionKey` fields (any casing) and labels the
    /// vertex with the record's shape name.
    fn to_vertex(&self,) -> Result<Vertex,> {
        VertexMapping::default().map(self,)
    }

    fn to_vertex_with(
        &self,
        id_field: &str,
        partition_key_field: &str,
        label: &str,
    ) -> Result<Vertex,> {
        VertexMapping::new(id_field, partition_key_field, label,)?.map(self,)
    }
}

impl<R: Record + ?Sized,> ToVertex for R {}

/// Case-folded lookup over one record's fields. The first field to fold to a
/// given key wins.
pub struct FieldIndex<'a,> {
    fields: &'a [(String, Value,)],
    folded: HashMap<String, usize,>,
}

impl<'a,> FieldIndex<'a,> {
    pub fn new(fields: &'a [(String, Value,)],) -> Self {
        let mut folded = HashMap::with_capacity(fields.len(),);
        for (i, (name, _,),) in fields.iter().enumerate() {
            folded.entry(fold(name,),).or_insert(i,);
        }
        Self { fields, folded, }
    }

    pub fn get(&self, name: &str,) -> Option<&'a Value,> {
        self.folded.get(&fold(name,),).map(|&i| &self.fields[i].1,)
    }

    pub fn contains(&self, name: &str,) -> bool {
        self.folded.contains_key(&fold(name,),)
    }
}

fn fold(name: &str,) -> String {
    name.to_lowercase()
}

fn is_reserved(name: &str,) -> bool {
    let folded = fold(name,);
    folded == fold(DEFAULT_ID_FIELD,) || folded == fold(PARTITION_KEY_PROPERTY,)
}

fn require_non_blank(name: &str, value: &str,) -> Result<String,> {
    if value.trim().is_empty() {
        return Err(ImporterError::invalid_argument(name, "a field name or label is required",),);
    }
    Ok(value.to_string(),)
}

fn is_blank(value: &Value,) -> bool {
    match value {
        Value::Null => true,
        Value::String(s,) => s.trim().is_empty(),
        _ => false,
    }
}

/// Textual form of an id value; `null` has none.
fn id_text(value: &Value,) -> Option<String,> {
    match value {
        Value::Null => None,
        Value::String(s,) => Some(s.clone(),),
        Value::Number(n,) => Some(n.to_string(),),
        Value::Bool(b,) => Some(b.to_string(),),
        other => Some(other.to_string(),),
    }
}
