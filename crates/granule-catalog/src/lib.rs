//! Granule catalog access for multidimensional coverages.
//!
//! A catalog indexes every 2D slice ("granule") of a coverage by its
//! backing file location, image index, footprint and per-dimension
//! attribute values. The reader only ever talks to it through the
//! [`GranuleCatalog`] trait:
//!
//! - [`MemoryCatalog`] keeps granules in process (tests, small mosaics)
//! - [`PgGranuleCatalog`] stores them in PostgreSQL with a JSONB attribute column

pub mod catalog;
pub mod filter;
pub mod granule;
pub mod memory;
pub mod postgres;

pub use catalog::{Aggregate, GranuleCatalog, GranuleQuery, SortBy, SortOrder};
pub use filter::{CompareOp, Filter};
pub use granule::{Granule, IMAGE_INDEX_ATTRIBUTE, LOCATION_ATTRIBUTE};
pub use memory::MemoryCatalog;
pub use postgres::PgGranuleCatalog;
