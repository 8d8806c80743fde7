// graph_bulk_importer/src/record.rs
// Record shapes the vertex mapper can enumerate.

use std::borrow::Cow;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// Anything that can enumerate its `(name, value)` pairs.
///
/// Static records know their field set at compile time ([`Typed`]); dynamic
/// records only at the value level (`serde_json::Value`, `serde_json::Map`,
/// [`DynamicRecord`]). The mapper treats both the same way.
pub trait Record {
    /// Name of the record's shape, used as the default vertex label.
    fn shape_name(&self,) -> Cow<'_, str,>;

    /// Fields in natural enumeration order.
    fn fields(&self,) -> Result<Vec<(String, Value,),>,>;
}

impl<R: Record + ?Sized,> Record for &R {
    fn shape_name(&self,) -> Cow<'_, str,> {
        (**self).shape_name()
    }

    fn fields(&self,) -> Result<Vec<(String, Value,),>,> {
        (**self).fields()
    }
}

/// Static shape: a `Serialize` value whose fields are its serialized members,
/// in declaration order.
#[derive(Debug, Clone, Copy,)]
pub struct Typed<'a, T: ?Sized,>(pub &'a T,);

impl<'a, T: Serialize + ?Sized,> Typed<'a, T,> {
    pub fn new(value: &'a T,) -> Self {
        Typed(value,)
    }
}

impl<T: Serialize + ?Sized,> Record for Typed<'_, T,> {
    fn shape_name(&self,) -> Cow<'_, str,> {
        Cow::Borrowed(short_type_name::<T,>(),)
    }

    fn fields(&self,) -> Result<Vec<(String, Value,),>,> {
        match serde_json::to_value(self.0,)? {
            Value::Object(map,) => Ok(map.into_iter().collect(),),
            // unit structs, newtypes over scalars, sequences: nothing to enumerate
            _ => Ok(Vec::new(),),
        }
    }
}

/// Last path segment of a type name with generic arguments removed,
/// e.g. `my_app::models::Store<u8>` becomes `Store`.
pub fn short_type_name<T: ?Sized,>() -> &'static str {
    let full = std::any::type_name::<T,>();
    let base = full.split('<',).next().unwrap_or(full,);
    base.rsplit("::",).next().unwrap_or(base,)
}

impl Record for Map<String, Value,> {
    fn shape_name(&self,) -> Cow<'_, str,> {
        Cow::Borrowed("Object",)
    }

    fn fields(&self,) -> Result<Vec<(String, Value,),>,> {
        Ok(self.iter().map(|(k, v,)| (k.clone(), v.clone(),),).collect(),)
    }
}

impl Record for Value {
    fn shape_name(&self,) -> Cow<'_, str,> {
        Cow::Borrowed(match self {
            Value::Null => "Null",
            Value::Bool(_,) => "Boolean",
            Value::Number(_,) => "Number",
            Value::String(_,) => "String",
            Value::Array(_,) => "Array",
            Value::Object(_,) => "Object",
        },)
    }

    fn fields(&self,) -> Result<Vec<(String, Value,),>,> {
        match self {
            Value::Object(map,) => map.fields(),
            _ => Ok(Vec::new(),),
        }
    }
}

/// Insertion-ordered bag of members with an explicit shape name.
#[derive(Debug, Clone, PartialEq, Default,)]
pub struct DynamicRecord {
    shape:  String,
    fields: Vec<(String, Value,),>,
}

impl DynamicRecord {
    pub fn new(shape: impl Into<String,>,) -> Self {
        Self {
            shape:  shape.into(),
            fields: Vec::new(),
        }
    }

    /// Sets a member. An existing member with exactly the same name is
    /// replaced in place; names differing only by case are distinct members.
    pub fn insert(&mut self, name: impl Into<String,>, value: impl Into<Value,>,) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _,)| *n == name,) {
            Some(slot,) => slot.1 = value,
            None => self.fields.push((name, value,),),
        }
    }

    pub fn with(mut self, name: impl Into<String,>, value: impl Into<Value,>,) -> Self {
        self.insert(name, value,);
        self
    }

    pub fn get(&self, name: &str,) -> Option<&Value,> {
        self.fields.iter().find(|(n, _,)| n == name,).map(|(_, v,)| v,)
    }

    pub fn len(&self,) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self,) -> bool {
        self.fields.is_empty()
    }
}

impl Record for DynamicRecord {
    fn shape_name(&self,) -> Cow<'_, str,> {
        Cow::Borrowed(&self.shape,)
    }

    fn fields(&self,) -> Result<Vec<(String, Value,),>,> {
        Ok(self.fields.clone(),)
    }
}
