//! Catalog records.

use std::collections::BTreeMap;

use coverage_common::{AttributeValue, BoundingBox};
use serde::{Deserialize, Serialize};

/// Pseudo-attribute addressing a granule's file location in filters and sorts.
pub const LOCATION_ATTRIBUTE: &str = "location";

/// Pseudo-attribute addressing a granule's image index in filters and sorts.
pub const IMAGE_INDEX_ATTRIBUTE: &str = "image_index";

/// One catalog record: a single 2D raster at fixed non-spatial coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Granule {
    /// Backing file location (path or object key).
    pub location: String,
    /// Index of the 2D image inside the backing file.
    pub image_index: usize,
    /// Footprint in the coverage's native CRS.
    pub bbox: BoundingBox,
    /// Per-dimension attribute values (time, elevation, custom axes, ...).
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Granule {
    pub fn new(location: impl Into<String>, image_index: usize, bbox: BoundingBox) -> Self {
        Self {
            location: location.into(),
            image_index,
            bbox,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up an attribute, including the location/image-index pseudo-attributes.
    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        match name {
            LOCATION_ATTRIBUTE => Some(AttributeValue::Text(self.location.clone())),
            IMAGE_INDEX_ATTRIBUTE => Some(AttributeValue::Number(self.image_index as f64)),
            _ => self.attributes.get(name).cloned(),
        }
    }
}
