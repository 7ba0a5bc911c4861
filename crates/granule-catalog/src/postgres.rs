//! Granule catalog using PostgreSQL.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coverage_common::{AttributeValue, BoundingBox, CoverageError, CoverageResult};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use uuid::Uuid;

use crate::catalog::{GranuleCatalog, GranuleQuery, SortOrder};
use crate::filter::Filter;
use crate::granule::{Granule, IMAGE_INDEX_ATTRIBUTE, LOCATION_ATTRIBUTE};

/// Database connection pool and granule index operations.
pub struct PgGranuleCatalog {
    pool: PgPool,
}

impl PgGranuleCatalog {
    /// Open a pooled connection to the granule database.
    pub async fn connect(database_url: &str) -> CoverageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| CoverageError::catalog(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the granule table and its indexes if missing.
    pub async fn migrate(&self) -> CoverageResult<()> {
        // sqlx runs one statement per query
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| CoverageError::catalog(format!("Migration failed: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Index a granule.
    pub async fn register_granule(&self, granule: &Granule) -> CoverageResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO granules (
                id, location, image_index,
                bbox_min_x, bbox_min_y, bbox_max_x, bbox_max_y,
                attributes, registered_at
            ) VALUES (
                $1, $2, $3,
                $4, $5, $6, $7,
                $8, $9
            )
            ON CONFLICT (location, image_index)
            DO UPDATE SET
                bbox_min_x = EXCLUDED.bbox_min_x,
                bbox_min_y = EXCLUDED.bbox_min_y,
                bbox_max_x = EXCLUDED.bbox_max_x,
                bbox_max_y = EXCLUDED.bbox_max_y,
                attributes = EXCLUDED.attributes,
                registered_at = EXCLUDED.registered_at
            "#,
        )
        .bind(id)
        .bind(&granule.location)
        .bind(granule.image_index as i32)
        .bind(granule.bbox.min_x)
        .bind(granule.bbox.min_y)
        .bind(granule.bbox.max_x)
        .bind(granule.bbox.max_y)
        .bind(Json(&granule.attributes))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| CoverageError::catalog(format!("Insert failed: {}", e)))?;

        Ok(id)
    }
}

#[async_trait]
impl GranuleCatalog for PgGranuleCatalog {
    async fn query(&self, query: &GranuleQuery) -> CoverageResult<Vec<Granule>> {
        let statement = build_select(query);

        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "Catalog query");

        let mut q = sqlx::query_as::<_, GranuleRow>(&statement.sql);
        for param in statement.params {
            q = match param {
                SqlParam::Number(v) => q.bind(v),
                SqlParam::Date(v) => q.bind(v),
                SqlParam::Text(v) => q.bind(v),
            };
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoverageError::catalog(format!("Query failed: {}", e)))?;

        rows.into_iter().map(Granule::try_from).collect()
    }
}

/// A bind parameter of a generated statement.
#[derive(Debug, Clone, PartialEq)]
enum SqlParam {
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
}

/// Generated SQL with its positional parameters.
#[derive(Debug)]
struct SqlStatement {
    sql: String,
    params: Vec<SqlParam>,
}

fn placeholder(params: &mut Vec<SqlParam>, param: SqlParam) -> String {
    params.push(param);
    format!("${}", params.len())
}

fn build_select(query: &GranuleQuery) -> SqlStatement {
    let mut params = Vec::new();
    let where_clause = translate_filter(&query.filter, &mut params);

    let mut sql = format!(
        "SELECT location, image_index, bbox_min_x, bbox_min_y, bbox_max_x, bbox_max_y, \
         attributes FROM granules WHERE {}",
        where_clause
    );

    if !query.sort_by.is_empty() {
        let keys: Vec<String> = query
            .sort_by
            .iter()
            .map(|key| {
                let column = match key.attribute.as_str() {
                    LOCATION_ATTRIBUTE => "location".to_string(),
                    IMAGE_INDEX_ATTRIBUTE => "image_index".to_string(),
                    other => format!(
                        "attributes->{}",
                        placeholder(&mut params, SqlParam::Text(other.to_string()))
                    ),
                };
                let direction = match key.order {
                    SortOrder::Ascending => "ASC",
                    SortOrder::Descending => "DESC",
                };
                format!("{} {}", column, direction)
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    SqlStatement { sql, params }
}

/// Translate a filter into a parenthesized SQL predicate.
fn translate_filter(filter: &Filter, params: &mut Vec<SqlParam>) -> String {
    match filter {
        Filter::Include => "TRUE".to_string(),
        Filter::Exclude => "FALSE".to_string(),
        Filter::And(terms) if terms.is_empty() => "TRUE".to_string(),
        Filter::Or(terms) if terms.is_empty() => "FALSE".to_string(),
        Filter::And(terms) => {
            let parts: Vec<String> = terms.iter().map(|t| translate_filter(t, params)).collect();
            format!("({})", parts.join(" AND "))
        }
        Filter::Or(terms) => {
            let parts: Vec<String> = terms.iter().map(|t| translate_filter(t, params)).collect();
            format!("({})", parts.join(" OR "))
        }
        Filter::Not(inner) => format!("NOT {}", translate_filter(inner, params)),
        Filter::Compare {
            attribute,
            op,
            value,
        } => {
            let column = match attribute.as_str() {
                LOCATION_ATTRIBUTE => "location".to_string(),
                IMAGE_INDEX_ATTRIBUTE => "image_index".to_string(),
                other => {
                    let key = placeholder(params, SqlParam::Text(other.to_string()));
                    match value {
                        AttributeValue::Number(_) => {
                            format!("(attributes->>{})::double precision", key)
                        }
                        AttributeValue::Date(_) => format!("(attributes->>{})::timestamptz", key),
                        AttributeValue::Text(_) => format!("(attributes->>{})", key),
                    }
                }
            };
            let bound = match value {
                AttributeValue::Number(v) => placeholder(params, SqlParam::Number(*v)),
                AttributeValue::Date(v) => placeholder(params, SqlParam::Date(*v)),
                AttributeValue::Text(v) => placeholder(params, SqlParam::Text(v.clone())),
            };
            format!("({} {} {})", column, op.symbol(), bound)
        }
        Filter::Intersects(bbox) => {
            let max_x = placeholder(params, SqlParam::Number(bbox.max_x));
            let min_x = placeholder(params, SqlParam::Number(bbox.min_x));
            let max_y = placeholder(params, SqlParam::Number(bbox.max_y));
            let min_y = placeholder(params, SqlParam::Number(bbox.min_y));
            format!(
                "(bbox_min_x < {} AND bbox_max_x > {} AND bbox_min_y < {} AND bbox_max_y > {})",
                max_x, min_x, max_y, min_y
            )
        }
    }
}

/// One `granules` row as stored.
#[derive(FromRow)]
struct GranuleRow {
    location: String,
    image_index: i32,
    bbox_min_x: f64,
    bbox_min_y: f64,
    bbox_max_x: f64,
    bbox_max_y: f64,
    attributes: Json<BTreeMap<String, AttributeValue>>,
}

impl TryFrom<GranuleRow> for Granule {
    type Error = CoverageError;

    fn try_from(row: GranuleRow) -> Result<Self, Self::Error> {
        let image_index = usize::try_from(row.image_index).map_err(|_| {
            CoverageError::catalog(format!(
                "negative image index {} for {}",
                row.image_index, row.location
            ))
        })?;

        Ok(Granule {
            location: row.location,
            image_index,
            bbox: BoundingBox::new(
                row.bbox_min_x,
                row.bbox_min_y,
                row.bbox_max_x,
                row.bbox_max_y,
            ),
            attributes: row.attributes.0,
        })
    }
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS granules (
    id UUID PRIMARY KEY,
    location TEXT NOT NULL,
    image_index INTEGER NOT NULL,
    bbox_min_x DOUBLE PRECISION NOT NULL,
    bbox_min_y DOUBLE PRECISION NOT NULL,
    bbox_max_x DOUBLE PRECISION NOT NULL,
    bbox_max_y DOUBLE PRECISION NOT NULL,
    attributes JSONB NOT NULL DEFAULT '{}'::jsonb,
    registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    UNIQUE(location, image_index)
);

CREATE INDEX IF NOT EXISTS idx_granules_location ON granules(location);
CREATE INDEX IF NOT EXISTS idx_granules_bbox ON granules(bbox_min_x, bbox_min_y, bbox_max_x, bbox_max_y);
CREATE INDEX IF NOT EXISTS idx_granules_attributes ON granules USING GIN (attributes)
"#;
