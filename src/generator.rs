// graph_bulk_importer/src/generator.rs
// Deterministic sample data: store vertices chained by "next" edges.

use serde::{Deserialize, Serialize};

use crate::element::{Edge, Vertex};
use crate::error::Result;
use crate::record::Typed;
use crate::vertex::VertexMapping;

pub const STORE_LABEL: &str = "Store";
pub const STORE_ID_FIELD: &str = "Id";
pub const DEFAULT_STORE_PARTITION_FIELD: &str = "StateCode";
pub const EDGE_LABEL: &str = "next";

const STATES: [(&str, &str, f64, f64,); 6] = [
    ("AR", "Arkansas", -92.33, 34.75,),
    ("TX", "Texas", -97.74, 30.27,),
    ("CA", "California", -121.49, 38.58,),
    ("NY", "New York", -73.76, 42.65,),
    ("WA", "Washington", -122.90, 47.04,),
    ("FL", "Florida", -84.28, 30.44,),
];
const CITIES: [&str; 5] = ["Springfield", "Riverside", "Fairview", "Franklin", "Georgetown",];
const STORE_TYPES: [&str; 3] = ["Supercenter", "Neighborhood Market", "Discount Store",];

/// GeoJSON point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,)]
pub struct Point {
    #[serde(rename = "type")]
    pub kind:        String,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

impl Point {
    pub fn new(longitude: f64, latitude: f64,) -> Self {
        Self {
            kind:        "Point".to_string(),
            coordinates: [longitude, latitude,],
        }
    }

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &Point,) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let [lon1, lat1,] = self.coordinates.map(f64::to_radians,);
        let [lon2, lat2,] = other.coordinates.map(f64::to_radians,);
        let a = ((lat2 - lat1) / 2.0).sin().powi(2,)
            + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2,);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,)]
#[serde(rename_all = "PascalCase")]
pub struct Store {
    pub id:           u64,
    #[serde(rename = "CBSName")]
    pub cbs_name:     String,
    pub city:         String,
    pub county:       String,
    pub county_type:  i16,
    pub is_active:    bool,
    pub state_code:   String,
    pub state:        String,
    pub location:     Point,
    pub name:         String,
    pub store_nbr:    u64,
    pub store_status: String,
    pub store_type:   String,
}

/// The store at `index`; the same index always yields the same store.
pub fn store(index: u64,) -> Store {
    let (state_code, state, lon, lat,) = STATES[(index % STATES.len() as u64) as usize];
    let city = CITIES[(index / STATES.len() as u64 % CITIES.len() as u64) as usize];
    let store_nbr = index + 1;
    // spread stores around the state capital, ~0.01 degree apart
    let offset = (index / STATES.len() as u64) as f64 * 0.01;

    Store {
        id: store_nbr,
        cbs_name: format!("{}, {}", city, state_code),
        city: city.to_string(),
        county: format!("{} County", city),
        county_type: (index % 3) as i16,
        is_active: index % 10 != 9,
        state_code: state_code.to_string(),
        state: state.to_string(),
        location: Point::new(lon + offset, lat - offset / 2.0,),
        name: format!("{} Store #{}", city, store_nbr),
        store_nbr,
        store_status: if index % 10 == 9 { "Closed" } else { "Open" }.to_string(),
        store_type: STORE_TYPES[(index % STORE_TYPES.len() as u64) as usize].to_string(),
    }
}

/// Mapping used for generated stores: `Id` as vertex id, `partition_field` as
/// partition key, labelled `Store`.
pub fn store_mapping(partition_field: &str,) -> Result<VertexMapping,> {
    VertexMapping::new(STORE_ID_FIELD, partition_field, STORE_LABEL,)
}

pub fn generate_vertices(count: u64, mapping: &VertexMapping,) -> Result<Vec<Vertex,>,> {
    (0..count).map(|i| mapping.map(&Typed(&store(i,),),),).collect()
}

/// Chains the vertices into a ring: vertex `i` points at vertex `i + 1`, the
/// last one back at the first. Fewer than two vertices give no edges.
pub fn generate_edges(vertices: &[Vertex],) -> Vec<Edge,> {
    let n = vertices.len();
    if n < 2 {
        return Vec::new();
    }

    (0..n)
        .map(|i| {
            let j = (i + 1) % n;
            let (out, into,) = (&vertices[i], &vertices[j],);
            let distance = store(i as u64,)
                .location
                .distance_km(&store(j as u64,).location,);
            Edge::between(EDGE_LABEL, out, into,)
                .with_id(format!("{}-{}-{}", out.id, EDGE_LABEL, into.id),)
                .with_property("sequence", i as u64,)
                .with_property("distanceKm", (distance * 1000.0).round() / 1000.0,)
        },)
        .collect()
}
