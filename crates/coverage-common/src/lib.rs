//! Common types shared across the coverage workspace.
//!
//! Everything here is plain data: bounding boxes, CRS codes, closed
//! temporal/numeric ranges, catalog attribute values and the error taxonomy
//! used by the catalog and reader crates.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod range;
pub mod time;
pub mod value;

pub use bbox::BoundingBox;
pub use crs::Crs;
pub use error::{CoverageError, CoverageResult};
pub use range::NumberRange;
pub use time::DateRange;
pub use value::{AttributeValue, ValueKind};
