//! Postgres access: pool construction, schema bootstrap, and the
//! batched upsert executor.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, QueryBuilder,
};
use tracing::{info, instrument};

use crate::error::{BatchFailure, IngestError};
use crate::model::{ImageRow, ProductRow};

const DDL_PRODUCTS: &str = "
CREATE TABLE IF NOT EXISTS tiki_products (
    id           BIGINT PRIMARY KEY,
    name         TEXT,
    url_key      TEXT,
    price        NUMERIC,
    description  TEXT,
    images       JSONB,
    source_file  TEXT,
    ingested_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_tiki_products_price ON tiki_products(price);
CREATE INDEX IF NOT EXISTS idx_tiki_products_url_key ON tiki_products(url_key);
";

const DDL_IMAGES: &str = "
CREATE TABLE IF NOT EXISTS tiki_product_images (
    product_id   BIGINT NOT NULL REFERENCES tiki_products(id) ON DELETE CASCADE,
    position     INT NOT NULL,
    image_url    TEXT NOT NULL,
    PRIMARY KEY (product_id, position)
);
CREATE INDEX IF NOT EXISTS idx_tiki_product_images_url ON tiki_product_images(image_url);
";

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

/// Counts coming back from one committed batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchOutcome {
    pub products: u64,
    pub images: u64,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, IngestError> {
        let mut connect_options =
            PgConnectOptions::from_str(database_url).map_err(IngestError::Connection)?;

        if database_url.contains("sslmode=require") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        // PgBouncer txn mode safe
        connect_options = connect_options.statement_cache_capacity(0);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .map_err(IngestError::Connection)?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Create the target tables and indexes when absent. The image table
    /// exists only in normalization mode.
    pub async fn ensure_schema(&self, normalize_images: bool) -> Result<(), IngestError> {
        sqlx::raw_sql(DDL_PRODUCTS)
            .execute(&self.pool)
            .await
            .map_err(schema_error)?;
        if normalize_images {
            sqlx::raw_sql(DDL_IMAGES)
                .execute(&self.pool)
                .await
                .map_err(schema_error)?;
        }
        Ok(())
    }

    /// Apply one batch atomically: upsert every product row, then (in
    /// normalization mode) rebuild each product's child image rows by
    /// delete-then-reinsert. Either the whole batch commits or none of
    /// it does; a failure rolls back and aborts with [`BatchFailure`].
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn apply_batch(
        &self,
        rows: &[ProductRow],
        normalize_images: bool,
    ) -> Result<BatchOutcome, BatchFailure> {
        if rows.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let unique = dedup_keep_last(rows);
        let product_ids: Vec<i64> = unique.iter().map(|r| r.id).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| batch_failure(&product_ids, e))?;

        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO tiki_products (id, name, url_key, price, description, images, source_file, ingested_at) ",
        );
        qb.push_values(&unique, |mut b, r| {
            b.push_bind(r.id)
                .push_bind(r.name.as_ref())
                .push_bind(r.url_key.as_ref())
                .push_bind(r.price.as_ref())
                .push_bind(r.description.as_ref())
                .push_bind(&r.images_doc)
                .push_bind(&r.source_file)
                .push_bind(r.ingested_at);
        });
        qb.push(
            " ON CONFLICT (id) DO UPDATE SET \
               name = EXCLUDED.name, \
               url_key = EXCLUDED.url_key, \
               price = EXCLUDED.price, \
               description = EXCLUDED.description, \
               images = EXCLUDED.images, \
               source_file = EXCLUDED.source_file, \
               ingested_at = EXCLUDED.ingested_at",
        );
        qb.build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .map_err(|e| batch_failure(&product_ids, e))?;

        let mut images = 0u64;
        if normalize_images {
            // Reconcile: drop every existing child row for the batch's
            // products (a product whose new list is empty ends with
            // none), then reinsert the current lists.
            sqlx::query("DELETE FROM tiki_product_images WHERE product_id = ANY($1)")
                .bind(&product_ids)
                .persistent(false)
                .execute(&mut *tx)
                .await
                .map_err(|e| batch_failure(&product_ids, e))?;

            let image_rows = image_rows(&unique);
            if !image_rows.is_empty() {
                let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
                    "INSERT INTO tiki_product_images (product_id, position, image_url) ",
                );
                qb.push_values(&image_rows, |mut b, r| {
                    b.push_bind(r.product_id)
                        .push_bind(r.position)
                        .push_bind(&r.image_url);
                });
                qb.build()
                    .persistent(false)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| batch_failure(&product_ids, e))?;
                images = image_rows.len() as u64;
            }
        }

        tx.commit()
            .await
            .map_err(|e| batch_failure(&product_ids, e))?;

        Ok(BatchOutcome {
            products: rows.len() as u64,
            images,
        })
    }
}

fn batch_failure(product_ids: &[i64], source: sqlx::Error) -> BatchFailure {
    BatchFailure {
        product_ids: product_ids.to_vec(),
        source,
    }
}

fn schema_error(source: sqlx::Error) -> IngestError {
    let privilege = matches!(
        &source,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("42501")
    );
    let hint = privilege.then(|| {
        "user lacks CREATE/USAGE on the schema; run \
         GRANT USAGE, CREATE ON SCHEMA public TO <user>; \
         GRANT CONNECT ON DATABASE <db> TO <user>;"
            .to_string()
    });
    IngestError::Schema { hint, source }
}

/// Postgres rejects a multi-row `ON CONFLICT DO UPDATE` that touches the
/// same id twice, so keep only the last occurrence per id within one
/// statement. Later occurrences win, matching the run-level
/// last-write-in-traversal-order rule; ids are sorted so the generated
/// statement is deterministic.
fn dedup_keep_last(rows: &[ProductRow]) -> Vec<&ProductRow> {
    let mut latest: HashMap<i64, &ProductRow> = HashMap::new();
    for r in rows {
        latest.insert(r.id, r);
    }
    let mut unique: Vec<&ProductRow> = latest.into_values().collect();
    unique.sort_by_key(|r| r.id);
    unique
}

fn image_rows(rows: &[&ProductRow]) -> Vec<ImageRow> {
    let mut out = Vec::new();
    for r in rows {
        for (position, url) in r.image_urls.iter().enumerate() {
            out.push(ImageRow {
                product_id: r.id,
                position: position as i32,
                image_url: url.clone(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(id: i64, name: &str, image_urls: &[&str]) -> ProductRow {
        ProductRow {
            id,
            name: Some(name.to_string()),
            url_key: None,
            price: None,
            description: None,
            image_urls: image_urls.iter().map(|s| s.to_string()).collect(),
            images_doc: serde_json::Value::Array(Vec::new()),
            source_file: "products_1.json".into(),
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn dedup_keeps_the_last_occurrence_per_id() {
        let rows = vec![
            row(2, "first", &[]),
            row(1, "only", &[]),
            row(2, "second", &[]),
        ];
        let unique = dedup_keep_last(&rows);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, 1);
        assert_eq!(unique[1].id, 2);
        assert_eq!(unique[1].name.as_deref(), Some("second"));
    }

    #[test]
    fn image_rows_are_zero_indexed_per_product() {
        let a = row(1, "a", &["a.jpg", "b.jpg"]);
        let b = row(2, "b", &["c.jpg"]);
        let rows = image_rows(&[&a, &b]);
        let flat: Vec<(i64, i32, &str)> = rows
            .iter()
            .map(|r| (r.product_id, r.position, r.image_url.as_str()))
            .collect();
        assert_eq!(
            flat,
            vec![(1, 0, "a.jpg"), (1, 1, "b.jpg"), (2, 0, "c.jpg")]
        );
    }
}
