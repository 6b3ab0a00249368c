//! Zone annotation files.
//!
//! One file per slide, a JSON array of named GeoJSON geometries:
//!
//! ```json
//! [{"name": "zone 1", "geometry": {"type": "Polygon", "coordinates": [[[10, 10], [90, 10], [90, 90]]]}}]
//! ```
//!
//! A standard GeoJSON `FeatureCollection` with polygon features is accepted
//! as well.

use std::{fs, path::Path};

use geojson::{GeoJson, Geometry, Value};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{NucleiError, Result};

/// Polygon exterior ring in raster pixel coordinates
pub type Ring = Vec<[f64; 2]>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneAnnotation {
    #[serde(default)]
    pub name: String,
    pub geometry: Geometry,
}

impl ZoneAnnotation {
    pub fn polygon(name: &str, ring: &[[f64; 2]]) -> Self {
        let ring: Vec<Vec<f64>> = ring.iter().map(|&[x, y]| vec![x, y]).collect();
        Self {
            name: name.to_string(),
            geometry: Geometry::new(Value::Polygon(vec![ring])),
        }
    }

    /// Exterior rings of the geometry; holes are not carved out of zones
    pub fn exterior_rings(&self) -> Vec<Ring> {
        match &self.geometry.value {
            Value::Polygon(rings) => rings.first().map(|r| vec![to_ring(r)]).unwrap_or_default(),
            Value::MultiPolygon(polygons) => polygons
                .iter()
                .filter_map(|rings| rings.first().map(|r| to_ring(r)))
                .collect(),
            other => {
                warn!(
                    "Ignoring zone '{}' with unsupported geometry type {}",
                    self.name,
                    other.type_name()
                );
                Vec::new()
            }
        }
    }
}

fn to_ring(positions: &[Vec<f64>]) -> Ring {
    positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| [p[0], p[1]])
        .collect()
}

/// All zone annotations attached to one slide
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneAnnotations {
    pub zones: Vec<ZoneAnnotation>,
}

impl ZoneAnnotations {
    pub fn new(zones: Vec<ZoneAnnotation>) -> Self {
        Self { zones }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        match value {
            serde_json::Value::Array(_) => {
                let zones: Vec<ZoneAnnotation> = serde_json::from_value(value)?;
                Ok(Self { zones })
            }
            serde_json::Value::Object(_) => Self::from_geojson(GeoJson::from_json_value(value)?),
            _ => Err(NucleiError::InvalidAnnotation(
                "expected an array of zones or a GeoJSON object".to_string(),
            )),
        }
    }

    fn from_geojson(geojson: GeoJson) -> Result<Self> {
        let features = match geojson {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(geometry) => {
                return Ok(Self::new(vec![ZoneAnnotation {
                    name: String::new(),
                    geometry,
                }]));
            }
        };

        let zones = features
            .into_iter()
            .filter_map(|feature| {
                let name = feature
                    .property("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                feature.geometry.map(|geometry| ZoneAnnotation { name, geometry })
            })
            .collect();

        Ok(Self { zones })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.zones)?)
    }

    pub fn rings(&self) -> Vec<Ring> {
        self.zones.iter().flat_map(|zone| zone.exterior_rings()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
